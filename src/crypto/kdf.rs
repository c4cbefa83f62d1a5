// Keyvault — Master Key Derivation
//
// Derives the 32-byte vault master key from the operator passphrase and the
// vault-wide salt using Argon2id. The salt is generated once, on first open,
// and persisted by the store; the derived key itself is never persisted.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::aead::KEY_LEN;
use super::CryptoError;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Length of the vault-wide salt in bytes.
pub const SALT_LEN: usize = 16;

// Argon2id parameters: m=65536 (64 MiB), t=3 (3 iterations), p=4 (4 lanes)
const ARGON2_M_COST: u32 = 65536;
const ARGON2_T_COST: u32 = 3;
const ARGON2_P_COST: u32 = 4;

// ─── Parameters ──────────────────────────────────────────────────────────────

/// Argon2id cost parameters. Persisted in the vault meta table when a vault is
/// created so the same file always reopens with the same derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Number of passes over memory.
    pub time_cost: u32,
    /// Memory size in KiB.
    pub memory_cost: u32,
    /// Degree of parallelism (lanes).
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            time_cost: ARGON2_T_COST,
            memory_cost: ARGON2_M_COST,
            parallelism: ARGON2_P_COST,
        }
    }
}

// ─── Operations ──────────────────────────────────────────────────────────────

/// Generate a fresh random salt from the OS-seeded CSPRNG.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}

/// Derive the vault master key with Argon2id.
///
/// Deterministic for identical inputs. The working copy of the passphrase
/// bytes lives in a zeroizing buffer and is wiped before this returns.
pub fn derive_key(
    passphrase: &str,
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let argon_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| CryptoError::Derivation(format!("invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let passphrase_bytes = Zeroizing::new(passphrase.as_bytes().to_vec());
    let mut derived_key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(&passphrase_bytes, salt, &mut derived_key[..])
        .map_err(|e| CryptoError::Derivation(format!("Argon2id hash failed: {}", e)))?;

    Ok(derived_key)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> KdfParams {
        KdfParams {
            time_cost: 1,
            memory_cost: 64,
            parallelism: 1,
        }
    }

    #[test]
    fn test_salt_has_expected_length_and_varies() {
        let a = generate_salt();
        let b = generate_salt();
        assert_eq!(a.len(), SALT_LEN);
        assert_ne!(a, b, "Two fresh salts must not collide");
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let salt = [7u8; SALT_LEN];
        let k1 = derive_key("correct horse", &salt, &fast_params()).unwrap();
        let k2 = derive_key("correct horse", &salt, &fast_params()).unwrap();
        assert_eq!(k1.as_slice(), k2.as_slice());
    }

    #[test]
    fn test_different_salt_or_passphrase_changes_key() {
        let base = derive_key("pass", &[1u8; SALT_LEN], &fast_params()).unwrap();
        let other_salt = derive_key("pass", &[2u8; SALT_LEN], &fast_params()).unwrap();
        let other_pass = derive_key("Pass", &[1u8; SALT_LEN], &fast_params()).unwrap();
        assert_ne!(base.as_slice(), other_salt.as_slice());
        assert_ne!(base.as_slice(), other_pass.as_slice());
    }

    #[test]
    fn test_invalid_params_are_rejected() {
        let params = KdfParams {
            time_cost: 0,
            memory_cost: 64,
            parallelism: 1,
        };
        let err = derive_key("pass", &[1u8; SALT_LEN], &params).unwrap_err();
        assert!(matches!(err, CryptoError::Derivation(_)));
    }

    #[test]
    fn test_default_params_match_constants() {
        let params = KdfParams::default();
        assert_eq!(params.memory_cost, ARGON2_M_COST);
        assert_eq!(params.time_cost, ARGON2_T_COST);
        assert_eq!(params.parallelism, ARGON2_P_COST);
    }
}
