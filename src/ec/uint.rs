// Keyvault — 256-bit Unsigned Integers
//
// Fixed-width integer with four little-endian 64-bit limbs, plus the two
// moduli secp256k1 needs: the field prime `p` and the group order `n`.
// Reduction mod `p` uses the special form p = 2^256 - 0x1000003D1; reduction
// mod `n` uses bitwise long division, which is slower but only runs a few
// hundred times per signature.

use std::cmp::Ordering;
use std::fmt;

use zeroize::Zeroize;

/// 256-bit unsigned integer, limbs stored least-significant first.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct U256([u64; 4]);

impl U256 {
    pub const ZERO: U256 = U256([0, 0, 0, 0]);
    pub const ONE: U256 = U256([1, 0, 0, 0]);

    pub const fn from_limbs(limbs: [u64; 4]) -> Self {
        Self(limbs)
    }

    pub const fn from_u64(value: u64) -> Self {
        Self([value, 0, 0, 0])
    }

    pub fn from_be_bytes(bytes: &[u8; 32]) -> Self {
        let mut limbs = [0u64; 4];
        for (i, limb) in limbs.iter_mut().enumerate() {
            let start = 32 - (i + 1) * 8;
            let mut chunk = [0u8; 8];
            chunk.copy_from_slice(&bytes[start..start + 8]);
            *limb = u64::from_be_bytes(chunk);
        }
        Self(limbs)
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (i, limb) in self.0.iter().enumerate() {
            let start = 32 - (i + 1) * 8;
            out[start..start + 8].copy_from_slice(&limb.to_be_bytes());
        }
        out
    }

    /// Parse a big-endian hex string of up to 64 digits.
    #[cfg(test)]
    pub fn from_hex(hex_str: &str) -> Option<Self> {
        if hex_str.is_empty() || hex_str.len() > 64 {
            return None;
        }
        let padded = format!("{:0>64}", hex_str);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(padded, &mut bytes).ok()?;
        Some(Self::from_be_bytes(&bytes))
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|limb| *limb == 0)
    }

    /// Value of bit `index` (0 = least significant).
    pub fn bit(&self, index: usize) -> bool {
        if index >= 256 {
            return false;
        }
        (self.0[index / 64] >> (index % 64)) & 1 == 1
    }

    /// Number of significant bits.
    pub fn bits(&self) -> usize {
        for i in (0..4).rev() {
            if self.0[i] != 0 {
                return i * 64 + (64 - self.0[i].leading_zeros() as usize);
            }
        }
        0
    }

    pub fn overflowing_add(&self, other: &U256) -> (U256, bool) {
        let mut out = [0u64; 4];
        let mut carry = false;
        for (i, slot) in out.iter_mut().enumerate() {
            let (sum, c1) = self.0[i].overflowing_add(other.0[i]);
            let (sum, c2) = sum.overflowing_add(carry as u64);
            *slot = sum;
            carry = c1 || c2;
        }
        (U256(out), carry)
    }

    pub fn overflowing_sub(&self, other: &U256) -> (U256, bool) {
        let mut out = [0u64; 4];
        let mut borrow = false;
        for (i, slot) in out.iter_mut().enumerate() {
            let (diff, b1) = self.0[i].overflowing_sub(other.0[i]);
            let (diff, b2) = diff.overflowing_sub(borrow as u64);
            *slot = diff;
            borrow = b1 || b2;
        }
        (U256(out), borrow)
    }

    pub fn wrapping_add(&self, other: &U256) -> U256 {
        self.overflowing_add(other).0
    }

    pub fn wrapping_sub(&self, other: &U256) -> U256 {
        self.overflowing_sub(other).0
    }

    /// Shift left by one bit, returning the bit shifted out.
    fn shl1(&self) -> (U256, bool) {
        let mut out = [0u64; 4];
        let mut carry = 0u64;
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = (self.0[i] << 1) | carry;
            carry = self.0[i] >> 63;
        }
        (U256(out), carry == 1)
    }

    /// Shift right by one bit.
    pub fn shr1(&self) -> U256 {
        let mut out = [0u64; 4];
        for (i, slot) in out.iter_mut().enumerate() {
            let high = if i < 3 { self.0[i + 1] << 63 } else { 0 };
            *slot = (self.0[i] >> 1) | high;
        }
        U256(out)
    }

    /// Full 512-bit product, limbs least-significant first.
    pub fn mul_wide(&self, other: &U256) -> [u64; 8] {
        let mut out = [0u64; 8];
        for i in 0..4 {
            let mut carry: u128 = 0;
            for j in 0..4 {
                let cur = out[i + j] as u128 + (self.0[i] as u128) * (other.0[j] as u128) + carry;
                out[i + j] = cur as u64;
                carry = cur >> 64;
            }
            out[i + 4] = carry as u64;
        }
        out
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> Ordering {
        for i in (0..4).rev() {
            match self.0[i].cmp(&other.0[i]) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U256(0x{})", hex::encode(self.to_be_bytes()))
    }
}

/// Private keys and nonces are held as `Zeroizing<U256>`.
impl Zeroize for U256 {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

// ─── Moduli ──────────────────────────────────────────────────────────────────

/// secp256k1 field prime p = 2^256 - 2^32 - 977.
pub const P: U256 = U256::from_limbs([
    0xFFFF_FFFE_FFFF_FC2F,
    0xFFFF_FFFF_FFFF_FFFF,
    0xFFFF_FFFF_FFFF_FFFF,
    0xFFFF_FFFF_FFFF_FFFF,
]);

/// secp256k1 group order n.
pub const N: U256 = U256::from_limbs([
    0xBFD2_5E8C_D036_4141,
    0xBAAE_DCE6_AF48_A03B,
    0xFFFF_FFFF_FFFF_FFFE,
    0xFFFF_FFFF_FFFF_FFFF,
]);

/// 2^256 mod p.
const P_FOLD: u64 = 0x1_0000_03D1;

/// The two moduli used by ECDSA over secp256k1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modulus {
    /// Coordinates of curve points live mod p.
    Field,
    /// Scalars (private keys, nonces, r and s) live mod n.
    Order,
}

impl Modulus {
    pub fn value(&self) -> U256 {
        match self {
            Modulus::Field => P,
            Modulus::Order => N,
        }
    }

    /// Reduce an arbitrary 256-bit value.
    pub fn reduce(&self, a: &U256) -> U256 {
        let m = self.value();
        let mut r = *a;
        while r >= m {
            r = r.wrapping_sub(&m);
        }
        r
    }

    pub fn add(&self, a: &U256, b: &U256) -> U256 {
        let m = self.value();
        let (sum, carry) = a.overflowing_add(b);
        if carry || sum >= m {
            sum.wrapping_sub(&m)
        } else {
            sum
        }
    }

    pub fn sub(&self, a: &U256, b: &U256) -> U256 {
        let (diff, borrow) = a.overflowing_sub(b);
        if borrow {
            diff.wrapping_add(&self.value())
        } else {
            diff
        }
    }

    pub fn neg(&self, a: &U256) -> U256 {
        if a.is_zero() {
            U256::ZERO
        } else {
            self.value().wrapping_sub(a)
        }
    }

    pub fn mul(&self, a: &U256, b: &U256) -> U256 {
        let wide = a.mul_wide(b);
        match self {
            Modulus::Field => reduce_wide_field(&wide),
            Modulus::Order => reduce_wide_generic(&wide, &N),
        }
    }

    pub fn pow(&self, base: &U256, exponent: &U256) -> U256 {
        let mut result = U256::ONE;
        for i in (0..exponent.bits()).rev() {
            result = self.mul(&result, &result);
            if exponent.bit(i) {
                result = self.mul(&result, base);
            }
        }
        result
    }

    /// Multiplicative inverse via Fermat's little theorem (both moduli are
    /// prime). The inverse of zero is reported as `None`.
    pub fn inv(&self, a: &U256) -> Option<U256> {
        let a = self.reduce(a);
        if a.is_zero() {
            return None;
        }
        let exponent = self.value().wrapping_sub(&U256::from_u64(2));
        Some(self.pow(&a, &exponent))
    }
}

/// Fold the high half twice using 2^256 ≡ 0x1000003D1 (mod p).
fn reduce_wide_field(wide: &[u64; 8]) -> U256 {
    let mut folded = [0u64; 5];
    let mut carry: u128 = 0;
    for i in 0..4 {
        let cur = (wide[i + 4] as u128) * (P_FOLD as u128) + wide[i] as u128 + carry;
        folded[i] = cur as u64;
        carry = cur >> 64;
    }
    folded[4] = carry as u64;

    let mut out = [0u64; 4];
    let mut carry: u128 = (folded[4] as u128) * (P_FOLD as u128);
    for i in 0..4 {
        let cur = folded[i] as u128 + carry;
        out[i] = cur as u64;
        carry = cur >> 64;
    }

    let mut r = U256(out);
    if carry != 0 {
        // The wrapped value is tiny here, so this add cannot overflow again.
        r = r.wrapping_add(&U256::from_u64(P_FOLD));
    }
    while r >= P {
        r = r.wrapping_sub(&P);
    }
    r
}

/// Bitwise long division of a 512-bit value by a modulus with its top bit set.
fn reduce_wide_generic(wide: &[u64; 8], m: &U256) -> U256 {
    let mut r = U256::ZERO;
    for limb in (0..8).rev() {
        for bit in (0..64).rev() {
            let (mut shifted, overflow) = r.shl1();
            if (wide[limb] >> bit) & 1 == 1 {
                shifted.0[0] |= 1;
            }
            r = if overflow || shifted >= *m {
                shifted.wrapping_sub(m)
            } else {
                shifted
            };
        }
    }
    r
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn h(s: &str) -> U256 {
        U256::from_hex(s).unwrap()
    }

    #[test]
    fn test_byte_roundtrip_is_big_endian() {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        bytes[0] = 0x80;
        let v = U256::from_be_bytes(&bytes);
        assert!(v.bit(0));
        assert!(v.bit(255));
        assert_eq!(v.bits(), 256);
        assert_eq!(v.to_be_bytes(), bytes);
    }

    #[test]
    fn test_constants_match_curve_parameters() {
        assert_eq!(
            P,
            h("FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEFFFFFC2F")
        );
        assert_eq!(
            N,
            h("FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141")
        );
    }

    #[test]
    fn test_add_sub_with_carry() {
        let max = h("FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF");
        let (sum, carry) = max.overflowing_add(&U256::ONE);
        assert!(carry);
        assert!(sum.is_zero());

        let (diff, borrow) = U256::ZERO.overflowing_sub(&U256::ONE);
        assert!(borrow);
        assert_eq!(diff, max);
    }

    #[test]
    fn test_shr1_and_ordering() {
        let v = h("100000000000000000");
        assert_eq!(v.shr1(), h("80000000000000000"));
        assert!(U256::ONE < v);
        assert!(N < P);
    }

    #[test]
    fn test_field_mul_wraps_around_p() {
        // (p - 1)^2 ≡ 1 (mod p)
        let pm1 = P.wrapping_sub(&U256::ONE);
        assert_eq!(Modulus::Field.mul(&pm1, &pm1), U256::ONE);
        // (n - 1)^2 ≡ 1 (mod n)
        let nm1 = N.wrapping_sub(&U256::ONE);
        assert_eq!(Modulus::Order.mul(&nm1, &nm1), U256::ONE);
    }

    #[test]
    fn test_small_products_are_exact() {
        let a = U256::from_u64(0xFFFF_FFFF);
        let b = U256::from_u64(0x1_0000_0001);
        let expected = h("FFFFFFFFFFFFFFFF");
        assert_eq!(Modulus::Field.mul(&a, &b), expected);
        assert_eq!(Modulus::Order.mul(&a, &b), expected);
    }

    #[test]
    fn test_add_and_sub_mod() {
        let pm1 = P.wrapping_sub(&U256::ONE);
        assert_eq!(Modulus::Field.add(&pm1, &U256::from_u64(2)), U256::ONE);
        assert_eq!(Modulus::Field.sub(&U256::ONE, &U256::from_u64(2)), pm1);
        assert_eq!(Modulus::Order.neg(&U256::ONE), N.wrapping_sub(&U256::ONE));
        assert_eq!(Modulus::Order.neg(&U256::ZERO), U256::ZERO);
    }

    #[test]
    fn test_inverse_roundtrip() {
        for m in [Modulus::Field, Modulus::Order] {
            for v in [
                U256::from_u64(2),
                U256::from_u64(977),
                h("79BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798"),
            ] {
                let inv = m.inv(&v).unwrap();
                assert_eq!(m.mul(&v, &inv), U256::ONE, "v * v^-1 must be 1 for {:?}", m);
            }
        }
    }

    #[test]
    fn test_inverse_of_zero_is_none() {
        assert!(Modulus::Field.inv(&U256::ZERO).is_none());
        assert!(Modulus::Order.inv(&N).is_none());
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(U256::from_hex("").is_none());
        assert!(U256::from_hex("zz").is_none());
        assert!(U256::from_hex(&"1".repeat(65)).is_none());
        assert_eq!(U256::from_hex("0a"), Some(U256::from_u64(10)));
    }

    #[test]
    fn test_zeroize_clears_every_limb() {
        let mut v = N.wrapping_sub(&U256::ONE);
        v.zeroize();
        assert_eq!(v, U256::ZERO);

        let wrapped = zeroize::Zeroizing::new(P);
        assert_eq!(*wrapped, P, "Zeroizing must not alter the value while alive");
    }
}
