//! ElGamal ciphertexts and their homomorphic algebra

use crate::{
    keys::{PrivateKey, PublicKey},
    map::{from_curve, to_curve},
    Error, Result,
};
use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_TABLE,
    ristretto::{RistrettoBasepointTable, RistrettoPoint},
    scalar::Scalar,
    traits::{Identity, IsIdentity},
};
use rand::thread_rng;
use std::{
    borrow::Borrow,
    iter::{self, Sum},
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};
use unlynx_serde::derive_base64_conversions;

const G: &RistrettoBasepointTable = &RISTRETTO_BASEPOINT_TABLE;

/// An ElGamal encryption (K, C) of a point M: K = r·G, C = M + r·H
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherText {
    /// Ephemeral key
    pub k: RistrettoPoint,
    /// Blinded message
    pub c: RistrettoPoint,
}

/// An ordered sequence of ciphertexts; positions carry attribute identity
pub type CipherVector = Vec<CipherText>;

derive_base64_conversions!(CipherText, Error);

impl CipherText {
    /// Creates a ciphertext from its two components
    pub fn new(k: RistrettoPoint, c: RistrettoPoint) -> Self {
        Self { k, c }
    }

    /// Encrypts a point with a given blinding factor
    pub fn encrypt_by(h: &RistrettoPoint, m: &RistrettoPoint, r: &Scalar) -> Self {
        Self {
            k: G * r,
            c: h * r + m,
        }
    }

    /// Creates a trivial encryption (K = identity) of a point
    pub fn open(m: RistrettoPoint) -> Self {
        Self {
            k: RistrettoPoint::identity(),
            c: m,
        }
    }

    /// Checks whether this is a trivial encryption
    pub fn is_open(&self) -> bool {
        self.k.is_identity()
    }

    /// Adds a fresh encryption of zero under `h` with blinding factor `r`
    pub fn rerandomize(&self, h: &RistrettoPoint, r: &Scalar) -> Self {
        Self {
            k: self.k + G * r,
            c: self.c + h * r,
        }
    }

    /// Recovers the encrypted point
    pub fn decrypt_point(&self, sk: &PrivateKey) -> RistrettoPoint {
        self.c - self.k * sk.exponent()
    }
}

impl Identity for CipherText {
    fn identity() -> Self {
        Self::open(RistrettoPoint::identity())
    }
}

impl<'a, 'b> Add<&'b CipherText> for &'a CipherText {
    type Output = CipherText;

    fn add(self, rhs: &'b CipherText) -> CipherText {
        CipherText::new(self.k + rhs.k, self.c + rhs.c)
    }
}

impl<'a, 'b> Sub<&'b CipherText> for &'a CipherText {
    type Output = CipherText;

    fn sub(self, rhs: &'b CipherText) -> CipherText {
        CipherText::new(self.k - rhs.k, self.c - rhs.c)
    }
}

impl<'a, 'b> Mul<&'b Scalar> for &'a CipherText {
    type Output = CipherText;

    fn mul(self, rhs: &'b Scalar) -> CipherText {
        CipherText::new(self.k * rhs, self.c * rhs)
    }
}

impl<'a, 'b> Mul<&'b CipherText> for &'a Scalar {
    type Output = CipherText;

    fn mul(self, rhs: &'b CipherText) -> CipherText {
        rhs * self
    }
}

macro_rules! forward_binop {
    ($imp:ident, $method:ident, $op:tt, $lhs:ty, $rhs:ty) => {
        impl<'b> $imp<&'b $rhs> for $lhs {
            type Output = CipherText;

            #[allow(clippy::op_ref)]
            fn $method(self, rhs: &'b $rhs) -> CipherText {
                &self $op rhs
            }
        }

        impl<'a> $imp<$rhs> for &'a $lhs {
            type Output = CipherText;

            #[allow(clippy::op_ref)]
            fn $method(self, rhs: $rhs) -> CipherText {
                self $op &rhs
            }
        }

        impl $imp<$rhs> for $lhs {
            type Output = CipherText;

            #[allow(clippy::op_ref)]
            fn $method(self, rhs: $rhs) -> CipherText {
                &self $op &rhs
            }
        }
    };
}

forward_binop!(Add, add, +, CipherText, CipherText);
forward_binop!(Sub, sub, -, CipherText, CipherText);
forward_binop!(Mul, mul, *, CipherText, Scalar);
forward_binop!(Mul, mul, *, Scalar, CipherText);

impl<T: Borrow<CipherText>> AddAssign<T> for CipherText {
    fn add_assign(&mut self, rhs: T) {
        let rhs = rhs.borrow();
        self.k += rhs.k;
        self.c += rhs.c;
    }
}

impl<T: Borrow<CipherText>> SubAssign<T> for CipherText {
    fn sub_assign(&mut self, rhs: T) {
        let rhs = rhs.borrow();
        self.k -= rhs.k;
        self.c -= rhs.c;
    }
}

impl<'a> Neg for &'a CipherText {
    type Output = CipherText;

    fn neg(self) -> CipherText {
        CipherText::new(-self.k, -self.c)
    }
}

impl Neg for CipherText {
    type Output = CipherText;

    fn neg(self) -> CipherText {
        -&self
    }
}

impl<T: Borrow<CipherText>> Sum<T> for CipherText {
    fn sum<I>(iter: I) -> Self
    where
        I: Iterator<Item = T>,
    {
        iter.fold(CipherText::identity(), |mut acc, x| {
            acc += x;
            acc
        })
    }
}

/// Encrypts a point under a public key
pub fn encrypt_point(pk: &PublicKey, m: &RistrettoPoint) -> CipherText {
    let r = Scalar::random(&mut thread_rng());
    CipherText::encrypt_by(pk.point(), m, &r)
}

/// Encrypts an integer under a public key
pub fn encrypt_int(pk: &PublicKey, x: i64) -> CipherText {
    encrypt_int_get_r(pk, x).0
}

/// Encrypts an integer and returns the blinding factor used
pub fn encrypt_int_get_r(pk: &PublicKey, x: i64) -> (CipherText, Scalar) {
    let r = Scalar::random(&mut thread_rng());
    (CipherText::encrypt_by(pk.point(), &to_curve(x), &r), r)
}

/// Encrypts every integer of a slice
pub fn encrypt_int_vector(pk: &PublicKey, xs: &[i64]) -> CipherVector {
    xs.iter().map(|&x| encrypt_int(pk, x)).collect()
}

/// Decrypts an integer
pub fn decrypt_int(sk: &PrivateKey, ct: &CipherText) -> Result<i64> {
    from_curve(&ct.decrypt_point(sk)).ok_or(Error::PlaintextOutOfRange)
}

/// Decrypts every ciphertext of a vector
pub fn decrypt_int_vector(sk: &PrivateKey, cv: &[CipherText]) -> Result<Vec<i64>> {
    cv.iter().map(|ct| decrypt_int(sk, ct)).collect()
}

/// Decrypts only far enough to tell zero apart: 0 when the plaintext is 0, 1
/// otherwise
pub fn decrypt_check_zero(sk: &PrivateKey, ct: &CipherText) -> i64 {
    if ct.decrypt_point(sk).is_identity() {
        0
    } else {
        1
    }
}

/// Trivially encrypts an integer (no blinding)
pub fn int_to_cipher_text(x: i64) -> CipherText {
    CipherText::open(to_curve(x))
}

/// Trivially encrypts every integer of a slice
pub fn int_array_to_cipher_vector(xs: &[i64]) -> CipherVector {
    xs.iter().map(|&x| int_to_cipher_text(x)).collect()
}

/// A vector of `n` encryptions of zero with identity components
pub fn null_cipher_vector(n: usize) -> CipherVector {
    iter::repeat(CipherText::identity()).take(n).collect()
}

/// Adds two vectors element-wise
pub fn add_vectors(a: &[CipherText], b: &[CipherText]) -> Result<CipherVector> {
    if a.len() != b.len() {
        return Err(Error::LengthMismatch(a.len(), b.len()));
    }
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x + y).collect())
}

/// Adds a vector element-wise into another one
pub fn add_assign_vector(a: &mut [CipherText], b: &[CipherText]) -> Result<()> {
    if a.len() != b.len() {
        return Err(Error::LengthMismatch(a.len(), b.len()));
    }
    for (x, y) in a.iter_mut().zip(b.iter()) {
        *x += y;
    }
    Ok(())
}
