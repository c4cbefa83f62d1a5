// Keyvault — Authenticated Encryption
//
// XChaCha20-Poly1305 with 24-byte random nonces. The ciphertext carries the
// 16-byte Poly1305 tag; a tag that fails to verify is the only tamper signal
// for data at rest, so it always surfaces as `DecryptionFailed`.

use std::fmt;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use super::CryptoError;

/// Size of the master key in bytes (256-bit).
pub const KEY_LEN: usize = 32;
/// Size of an XChaCha20-Poly1305 nonce in bytes.
pub const NONCE_LEN: usize = 24;

/// AEAD output for one sealed value: ciphertext‖tag plus the nonce used.
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// Only lengths are shown; the bytes are opaque and of no use in logs.
impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("nonce_len", &self.nonce.len())
            .finish()
    }
}

/// Generate a fresh random nonce.
pub fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);
    nonce
}

/// Encrypt `plaintext` under `key`. A fresh nonce is drawn unless one is given.
pub fn encrypt(
    key: &[u8; KEY_LEN],
    plaintext: &[u8],
    nonce: Option<[u8; NONCE_LEN]>,
) -> Result<Envelope, CryptoError> {
    let nonce = nonce.unwrap_or_else(random_nonce);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(format!("XChaCha20-Poly1305 seal failed: {}", e)))?;

    Ok(Envelope {
        ciphertext,
        nonce: nonce.to_vec(),
    })
}

/// Decrypt and authenticate. Never returns unauthenticated bytes.
pub fn decrypt(
    key: &[u8; KEY_LEN],
    ciphertext: &[u8],
    nonce: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::DecryptionFailed);
    }
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Overwrite `buffer` with zeros in place.
///
/// Uses volatile writes so the compiler cannot elide them. This is
/// defense-in-depth: copies made earlier (by the allocator, swap, or a
/// caller) are out of reach.
pub fn zeroize(buffer: &mut [u8]) {
    buffer.zeroize();
}

// ─── Tests ───────────────────────────────────────────────────────────────────
