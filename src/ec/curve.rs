// Keyvault — secp256k1 Point Arithmetic
//
// Affine short-Weierstrass arithmetic on y^2 = x^3 + 7 over F_p. Pure
// functions over points; the point at infinity is an explicit variant and
// acts as the additive identity.

use super::uint::{Modulus, U256};

/// Base point G, x coordinate.
pub const GX: U256 = U256::from_limbs([
    0x59F2_815B_16F8_1798,
    0x029B_FCDB_2DCE_28D9,
    0x55A0_6295_CE87_0B07,
    0x79BE_667E_F9DC_BBAC,
]);

/// Base point G, y coordinate.
pub const GY: U256 = U256::from_limbs([
    0x9C47_D08F_FB10_D4B8,
    0xFD17_B448_A685_5419,
    0x5DA4_FBFC_0E11_08A8,
    0x483A_DA77_26A3_C465,
]);

/// The curve constant b in y^2 = x^3 + b.
const B: U256 = U256::from_u64(7);

/// A point on secp256k1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Point {
    Infinity,
    Affine { x: U256, y: U256 },
}

impl Point {
    /// The generator G.
    pub const fn generator() -> Self {
        Point::Affine { x: GX, y: GY }
    }

    pub fn is_infinity(&self) -> bool {
        matches!(self, Point::Infinity)
    }

    /// Affine x coordinate, if any.
    pub fn x(&self) -> Option<U256> {
        match self {
            Point::Infinity => None,
            Point::Affine { x, .. } => Some(*x),
        }
    }

    /// Check y^2 == x^3 + 7 (mod p). Infinity counts as on the curve.
    pub fn is_on_curve(&self) -> bool {
        match self {
            Point::Infinity => true,
            Point::Affine { x, y } => {
                let f = Modulus::Field;
                let lhs = f.mul(y, y);
                let rhs = f.add(&f.mul(&f.mul(x, x), x), &B);
                lhs == rhs
            }
        }
    }

    /// SEC1 uncompressed encoding (`0x04 ‖ x ‖ y`); infinity encodes as `0x00`.
    #[cfg(test)]
    pub fn to_uncompressed(&self) -> Vec<u8> {
        match self {
            Point::Infinity => vec![0x00],
            Point::Affine { x, y } => {
                let mut out = Vec::with_capacity(65);
                out.push(0x04);
                out.extend_from_slice(&x.to_be_bytes());
                out.extend_from_slice(&y.to_be_bytes());
                out
            }
        }
    }
}

/// Add two points, covering identity, inverse points and doubling.
pub fn point_add(a: &Point, b: &Point) -> Point {
    let (x1, y1, x2, y2) = match (a, b) {
        (Point::Infinity, _) => return *b,
        (_, Point::Infinity) => return *a,
        (Point::Affine { x: x1, y: y1 }, Point::Affine { x: x2, y: y2 }) => (x1, y1, x2, y2),
    };

    let f = Modulus::Field;

    // P + (-P) = O; also catches doubling a point with y = 0.
    if x1 == x2 && f.add(y1, y2).is_zero() {
        return Point::Infinity;
    }

    let slope = if x1 == x2 && y1 == y2 {
        // 3x^2 / 2y
        let numerator = f.mul(&U256::from_u64(3), &f.mul(x1, x1));
        let denominator = f.add(y1, y1);
        match f.inv(&denominator) {
            Some(inv) => f.mul(&numerator, &inv),
            None => return Point::Infinity,
        }
    } else {
        let numerator = f.sub(y2, y1);
        let denominator = f.sub(x2, x1);
        match f.inv(&denominator) {
            Some(inv) => f.mul(&numerator, &inv),
            None => return Point::Infinity,
        }
    };

    let x3 = f.sub(&f.sub(&f.mul(&slope, &slope), x1), x2);
    let y3 = f.sub(&f.mul(&slope, &f.sub(x1, &x3)), y1);
    Point::Affine { x: x3, y: y3 }
}

/// Double-and-add scalar multiplication `k·P`, scanning bits from the least
/// significant end. `0·P` and `k·O` are the point at infinity.
pub fn scalar_multiply(k: &U256, point: &Point) -> Point {
    let mut result = Point::Infinity;
    let mut addend = *point;
    for i in 0..k.bits() {
        if k.bit(i) {
            result = point_add(&result, &addend);
        }
        addend = point_add(&addend, &addend);
    }
    result
}

// ─── Tests ───────────────────────────────────────────────────────────────────
