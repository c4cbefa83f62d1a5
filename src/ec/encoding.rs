// Keyvault — Private Key Encodings
//
// Decodes operator-supplied private keys into 32 raw bytes. The set of formats
// is closed: every `KeyFormat` variant is matched exhaustively in `decode`, so
// a new format cannot be added without its decoder.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::SigningError;

/// Length of a raw secp256k1 private key.
pub const PRIVATE_KEY_LEN: usize = 32;

const BASE58_ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const WIF_MAINNET: u8 = 0x80;
const WIF_TESTNET: u8 = 0xEF;
const WIF_COMPRESSED_FLAG: u8 = 0x01;
const CHECKSUM_LEN: usize = 4;

/// Text encodings accepted for private keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyFormat {
    /// 64 hex characters, optional `0x` prefix.
    Hex,
    /// Wallet Import Format (Base58Check).
    Wif,
}

impl KeyFormat {
    pub const ALL: [KeyFormat; 2] = [KeyFormat::Hex, KeyFormat::Wif];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyFormat::Hex => "hex",
            KeyFormat::Wif => "wif",
        }
    }

    /// Decode `text` in this format into raw key bytes.
    pub fn decode(&self, text: &str) -> Result<Zeroizing<[u8; PRIVATE_KEY_LEN]>, SigningError> {
        match self {
            KeyFormat::Hex => decode_hex(text),
            KeyFormat::Wif => decode_wif(text),
        }
    }
}

impl fmt::Display for KeyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyFormat {
    type Err = SigningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hex" => Ok(KeyFormat::Hex),
            "wif" => Ok(KeyFormat::Wif),
            other => Err(SigningError::InvalidKeyEncoding(format!(
                "unsupported key format '{}'",
                other
            ))),
        }
    }
}

/// Decode a private key given its format. Never truncates or pads.
pub fn decode_private_key(
    fmt: KeyFormat,
    text: &str,
) -> Result<Zeroizing<[u8; PRIVATE_KEY_LEN]>, SigningError> {
    fmt.decode(text)
}

fn decode_hex(text: &str) -> Result<Zeroizing<[u8; PRIVATE_KEY_LEN]>, SigningError> {
    let cleaned = text.trim();
    let cleaned = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
        .unwrap_or(cleaned);

    if cleaned.len() != PRIVATE_KEY_LEN * 2 {
        return Err(SigningError::InvalidKeyEncoding(format!(
            "hex keys must be {} characters, got {}",
            PRIVATE_KEY_LEN * 2,
            cleaned.len()
        )));
    }

    let mut key = Zeroizing::new([0u8; PRIVATE_KEY_LEN]);
    hex::decode_to_slice(cleaned, &mut key[..])
        .map_err(|_| SigningError::InvalidKeyEncoding("invalid hex key".to_string()))?;
    Ok(key)
}

fn decode_wif(text: &str) -> Result<Zeroizing<[u8; PRIVATE_KEY_LEN]>, SigningError> {
    let raw = base58_decode(text.trim())?;
    if raw.len() < CHECKSUM_LEN + 1 {
        return Err(SigningError::InvalidKeyEncoding(
            "wif payload too small".to_string(),
        ));
    }

    let (payload, checksum) = raw.split_at(raw.len() - CHECKSUM_LEN);
    let digest = Sha256::digest(Sha256::digest(payload));
    if checksum != &digest[..CHECKSUM_LEN] {
        return Err(SigningError::InvalidKeyEncoding(
            "wif checksum mismatch".to_string(),
        ));
    }

    if payload[0] != WIF_MAINNET && payload[0] != WIF_TESTNET {
        return Err(SigningError::InvalidKeyEncoding(format!(
            "unsupported wif version byte 0x{:02x}",
            payload[0]
        )));
    }

    let mut key_bytes = &payload[1..];
    if key_bytes.len() == PRIVATE_KEY_LEN + 1 && key_bytes[PRIVATE_KEY_LEN] == WIF_COMPRESSED_FLAG {
        key_bytes = &key_bytes[..PRIVATE_KEY_LEN];
    }
    if key_bytes.len() != PRIVATE_KEY_LEN {
        return Err(SigningError::InvalidKeyEncoding(format!(
            "wif must encode {} byte keys, got {}",
            PRIVATE_KEY_LEN,
            key_bytes.len()
        )));
    }

    let mut key = Zeroizing::new([0u8; PRIVATE_KEY_LEN]);
    key.copy_from_slice(key_bytes);
    Ok(key)
}

/// Base58 decode into big-endian bytes, preserving leading zero bytes
/// (encoded as leading '1' characters).
fn base58_decode(text: &str) -> Result<Zeroizing<Vec<u8>>, SigningError> {
    if text.is_empty() {
        return Err(SigningError::InvalidKeyEncoding(
            "empty base58 string".to_string(),
        ));
    }

    // Little-endian accumulator.
    let mut acc: Zeroizing<Vec<u8>> = Zeroizing::new(Vec::with_capacity(text.len()));
    for ch in text.bytes() {
        let digit = BASE58_ALPHABET
            .iter()
            .position(|c| *c == ch)
            .ok_or_else(|| {
                SigningError::InvalidKeyEncoding(format!("invalid base58 character '{}'", ch as char))
            })? as u32;

        let mut carry = digit;
        for byte in acc.iter_mut() {
            carry += (*byte as u32) * 58;
            *byte = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            acc.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    let leading_zeros = text.bytes().take_while(|c| *c == b'1').count();
    let mut out = Zeroizing::new(vec![0u8; leading_zeros]);
    out.extend(acc.iter().rev());
    Ok(out)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
