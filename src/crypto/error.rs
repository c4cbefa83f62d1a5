// Keyvault — Crypto error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key derivation error: {0}")]
    Derivation(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    /// The authentication tag did not verify. Indicates corruption or tampering.
    #[error("Decryption failed — ciphertext or nonce has been corrupted or the key is wrong")]
    DecryptionFailed,
}
