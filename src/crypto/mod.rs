// Keyvault — Crypto Primitives
//
// Passphrase-based key derivation (Argon2id), salt and nonce generation,
// XChaCha20-Poly1305 authenticated encryption, and in-place zeroization.
// Every buffer that holds secret bytes is wrapped in `Zeroizing` so it is
// wiped on drop, including on early-return error paths.

mod aead;
mod error;
mod kdf;

pub use aead::{decrypt, encrypt, random_nonce, zeroize, Envelope, KEY_LEN, NONCE_LEN};
pub use error::CryptoError;
pub use kdf::{derive_key, generate_salt, KdfParams, SALT_LEN};
