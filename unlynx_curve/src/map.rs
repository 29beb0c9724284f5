//! Mapping integers to/from the elliptic curve

use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_TABLE,
    ristretto::{RistrettoBasepointTable, RistrettoPoint},
    scalar::Scalar,
};

/// Largest absolute value that decryption can recover
pub const MAX_HOMOMORPHIC_INT: i64 = 100_000;

const BABY_STEPS: i64 = 2048;

const G: &RistrettoBasepointTable = &RISTRETTO_BASEPOINT_TABLE;

/// Maps an integer to the curve
pub fn to_curve(x: i64) -> RistrettoPoint {
    let p = G * &Scalar::from(x.unsigned_abs());
    if x < 0 {
        -p
    } else {
        p
    }
}

/// Maps a curve point back to an integer in [-MAX_HOMOMORPHIC_INT,
/// MAX_HOMOMORPHIC_INT]
///
/// Uses baby-step giant-step over a table generated at build time. Returns
/// `None` when the point is outside the range.
pub fn from_curve(point: &RistrettoPoint) -> Option<i64> {
    non_negative_log(point).or_else(|| non_negative_log(&-point).map(|m| -m))
}

fn non_negative_log(point: &RistrettoPoint) -> Option<i64> {
    let giant = G * &Scalar::from(BABY_STEPS as u64);
    let mut p = *point;
    let mut base = 0;
    while base <= MAX_HOMOMORPHIC_INT {
        if let Some(&j) = BABY_STEP_TABLE.get(&p.compress().0) {
            let m = base + j as i64;
            return if m <= MAX_HOMOMORPHIC_INT { Some(m) } else { None };
        }
        p -= giant;
        base += BABY_STEPS;
    }
    None
}

static BABY_STEP_TABLE: phf::Map<[u8; 32], u64> =
    include!(concat!(env!("OUT_DIR"), "/baby_steps.rs"));
