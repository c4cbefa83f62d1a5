// Keyvault — Signing engine error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SigningError {
    /// Malformed hex or WIF text, bad checksum or unsupported version byte.
    #[error("Invalid key encoding: {0}")]
    InvalidKeyEncoding(String),

    #[error("Invalid secp256k1 private key: scalar must be in [1, n-1]")]
    InvalidPrivateKey,

    /// `r == 0` or `s == 0`. Retrying with a fresh random nonce is safe;
    /// with a deterministic nonce the same inputs will fail again.
    #[error("Invalid signature parameter: {0} is zero")]
    InvalidSignatureParameter(&'static str),

    #[error("Nonce produced the point at infinity")]
    PointAtInfinity,
}
