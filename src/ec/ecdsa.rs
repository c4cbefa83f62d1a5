// Keyvault — ECDSA over secp256k1
//
// Signing with either a CSPRNG nonce or a deterministic nonce derived from
// SHA-256(priv ‖ SHA-256(payload)), low-s normalization, public key
// derivation and verification. Private scalars, nonces and the products
// built from them live in `Zeroizing` and are wiped when signing returns.

use std::fmt;

use rand::RngCore;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::curve::{point_add, scalar_multiply, Point};
use super::uint::{Modulus, U256, N};
use super::SigningError;

/// Algorithm identifier reported alongside every signature.
pub const ALGORITHM: &str = "secp256k1+sha256";

/// Length of an `r ‖ s` signature.
pub const SIGNATURE_LEN: usize = 64;

/// A compact ECDSA signature: 32-byte big-endian `r` followed by `s`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn r(&self) -> U256 {
        let mut r = [0u8; 32];
        r.copy_from_slice(&self.0[..32]);
        U256::from_be_bytes(&r)
    }

    pub fn s(&self) -> U256 {
        let mut s = [0u8; 32];
        s.copy_from_slice(&self.0[32..]);
        U256::from_be_bytes(&s)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Check that a private key is 32 bytes and lies in `[1, n-1]`.
pub fn validate_private_key(priv_key: &[u8]) -> Result<(), SigningError> {
    private_scalar(priv_key).map(|_| ())
}

/// Public key `d·G` for a private key.
pub fn derive_public_key(priv_key: &[u8]) -> Result<Point, SigningError> {
    let d = private_scalar(priv_key)?;
    Ok(scalar_multiply(&d, &Point::generator()))
}

/// Sign `payload` (hashed with SHA-256) with `priv_key`.
pub fn sign_payload(
    priv_key: &[u8],
    payload: &[u8],
    rand_nonce: bool,
) -> Result<Signature, SigningError> {
    let d = private_scalar(priv_key)?;
    let order = Modulus::Order;

    let payload_hash = Sha256::digest(payload);
    let e = order.reduce(&U256::from_be_bytes(&payload_hash.into()));

    let k = if rand_nonce {
        random_scalar()
    } else {
        deterministic_scalar(priv_key, &payload_hash)
    };

    let r = match scalar_multiply(&k, &Point::generator()).x() {
        Some(x) => order.reduce(&x),
        None => return Err(SigningError::PointAtInfinity),
    };
    if r.is_zero() {
        return Err(SigningError::InvalidSignatureParameter("r"));
    }

    let k_inv = Zeroizing::new(
        order
            .inv(&k)
            .ok_or(SigningError::InvalidSignatureParameter("k"))?,
    );
    let rd = Zeroizing::new(order.mul(&r, &d));
    let e_plus_rd = Zeroizing::new(order.add(&e, &rd));
    let mut s = order.mul(&k_inv, &e_plus_rd);
    if s.is_zero() {
        return Err(SigningError::InvalidSignatureParameter("s"));
    }
    if s > N.shr1() {
        s = order.neg(&s);
    }

    let mut out = [0u8; SIGNATURE_LEN];
    out[..32].copy_from_slice(&r.to_be_bytes());
    out[32..].copy_from_slice(&s.to_be_bytes());
    Ok(Signature(out))
}

/// Standard ECDSA verification of `signature` over SHA-256(`payload`).
pub fn verify_signature(public_key: &Point, payload: &[u8], signature: &Signature) -> bool {
    if public_key.is_infinity() || !public_key.is_on_curve() {
        return false;
    }
    let order = Modulus::Order;
    let (r, s) = (signature.r(), signature.s());
    if r.is_zero() || r >= N || s.is_zero() || s >= N {
        return false;
    }

    let payload_hash = Sha256::digest(payload);
    let e = order.reduce(&U256::from_be_bytes(&payload_hash.into()));

    let w = match order.inv(&s) {
        Some(w) => w,
        None => return false,
    };
    let u1 = order.mul(&e, &w);
    let u2 = order.mul(&r, &w);

    let point = point_add(
        &scalar_multiply(&u1, &Point::generator()),
        &scalar_multiply(&u2, public_key),
    );
    match point.x() {
        Some(x) => order.reduce(&x) == r,
        None => false,
    }
}

/// Parse the scalar `d` of a private key, rejecting anything outside `[1, n-1]`.
fn private_scalar(priv_key: &[u8]) -> Result<Zeroizing<U256>, SigningError> {
    let bytes: Zeroizing<[u8; 32]> = Zeroizing::new(
        priv_key
            .try_into()
            .map_err(|_| SigningError::InvalidPrivateKey)?,
    );
    let d = Zeroizing::new(U256::from_be_bytes(&bytes));
    if d.is_zero() || *d >= N {
        return Err(SigningError::InvalidPrivateKey);
    }
    Ok(d)
}

/// Uniform scalar in `[1, n-1]` by rejection sampling.
fn random_scalar() -> Zeroizing<U256> {
    let mut rng = rand::rng();
    let mut buf = Zeroizing::new([0u8; 32]);
    loop {
        rng.fill_bytes(&mut buf[..]);
        let k = Zeroizing::new(U256::from_be_bytes(&buf));
        if !k.is_zero() && *k < N {
            return k;
        }
    }
}

/// `SHA-256(priv ‖ SHA-256(payload)) mod n`, with `k = 1` standing in for the
/// degenerate zero result.
fn deterministic_scalar(priv_key: &[u8], payload_hash: &[u8]) -> Zeroizing<U256> {
    // Exactly one SHA-256 block: it is compressed straight from `input`, so
    // the hasher's own buffer never holds key bytes.
    let mut input = Zeroizing::new([0u8; 64]);
    input[..32].copy_from_slice(priv_key);
    input[32..].copy_from_slice(payload_hash);
    let material: Zeroizing<[u8; 32]> = Zeroizing::new(Sha256::digest(&input[..]).into());

    let k = Zeroizing::new(Modulus::Order.reduce(&U256::from_be_bytes(&material)));
    if k.is_zero() {
        Zeroizing::new(U256::ONE)
    } else {
        k
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
