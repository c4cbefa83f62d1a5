// Keyvault — EC Signing Engine
//
// secp256k1 ECDSA implemented directly on a fixed-width 256-bit integer:
// field and scalar arithmetic, affine point arithmetic, double-and-add scalar
// multiplication, low-s signing, verification, and hex/WIF key decoding.
// Stateless apart from the CSPRNG used for random nonces.

mod curve;
mod ecdsa;
mod encoding;
mod error;
mod uint;

pub use curve::{point_add, scalar_multiply, Point};
pub use ecdsa::{
    derive_public_key, sign_payload, validate_private_key, verify_signature, Signature,
    ALGORITHM, SIGNATURE_LEN,
};
pub use encoding::{decode_private_key, KeyFormat, PRIVATE_KEY_LEN};
pub use error::SigningError;
pub use uint::{Modulus, U256, N, P};
