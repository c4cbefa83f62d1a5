// Keyvault — Top-level error types
//
// Aggregates errors from the crypto, signing and store modules, plus the
// policy and lifecycle refusals raised by the vault itself, into a single
// error enum for the application boundary.

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::ec::SigningError;
use crate::store::{RecordStatus, StoreError};

/// Top-level error type for all Keyvault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Usage limit exceeded: {used} of {max} signatures used")]
    UsageLimitExceeded { used: u64, max: u64 },

    #[error("Cooldown active: retry in {remaining_s:.1}s")]
    CooldownActive { remaining_s: f64 },

    #[error("Record {id} is {status} and cannot be used")]
    RecordNotAvailable { id: String, status: RecordStatus },

    #[error("Record {0} is due for rotation; run `keyvault rotate {0}`")]
    ManualRotationRequired(String),

    #[error("Invalid passphrase for this vault")]
    InvalidPassphrase,

    #[error("Vault is closed")]
    Closed,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    pub fn is_record_not_found(&self) -> bool {
        matches!(self, VaultError::Store(StoreError::RecordNotFound(_)))
    }

    /// Tag mismatch on a sealed key: tampering or a wrong master key.
    pub fn is_decryption_failure(&self) -> bool {
        matches!(self, VaultError::Crypto(CryptoError::DecryptionFailed))
    }

    /// Failures that may succeed if the same call is simply made again
    /// (after waiting out a cooldown, or drawing a fresh random nonce).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VaultError::CooldownActive { .. }
                | VaultError::Signing(SigningError::InvalidSignatureParameter(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        let missing: VaultError = StoreError::RecordNotFound("x".to_string()).into();
        assert!(missing.is_record_not_found());
        assert!(!missing.is_retryable());

        let tampered: VaultError = CryptoError::DecryptionFailed.into();
        assert!(tampered.is_decryption_failure());
        assert!(!tampered.is_record_not_found());

        assert!(VaultError::CooldownActive { remaining_s: 1.5 }.is_retryable());
        assert!(VaultError::from(SigningError::InvalidSignatureParameter("r")).is_retryable());
        assert!(!VaultError::UsageLimitExceeded { used: 1, max: 1 }.is_retryable());
    }

    #[test]
    fn test_messages_name_the_record() {
        let err = VaultError::RecordNotAvailable {
            id: "abc".to_string(),
            status: RecordStatus::Retired,
        };
        assert_eq!(err.to_string(), "Record abc is retired and cannot be used");

        let err = VaultError::UsageLimitExceeded { used: 2, max: 2 };
        assert!(err.to_string().contains("2 of 2"));
    }
}
