//! ElGamal key pairs

use crate::Error;
use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_TABLE,
    ristretto::{RistrettoBasepointTable, RistrettoPoint},
    scalar::Scalar,
    traits::Identity,
};
use rand::{CryptoRng, Rng};
use std::iter;
use unlynx_serde::derive_base64_conversions;

/// A private key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateKey {
    x: Scalar,
}

/// A public key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    h: RistrettoPoint,
}

const G: &RistrettoBasepointTable = &RISTRETTO_BASEPOINT_TABLE;

impl PrivateKey {
    /// Wraps a secret exponent
    pub fn from_exponent(x: Scalar) -> Self {
        Self { x }
    }

    /// Gets this key's secret value
    pub fn exponent(&self) -> &Scalar {
        &self.x
    }

    /// Generates a random Ristretto secret key
    pub fn random<R: Rng + CryptoRng>(rng: &mut R) -> Self {
        let x = Scalar::random(rng);
        Self { x }
    }

    /// Gets a public key that corresponds with this key
    pub fn public_key(&self) -> PublicKey {
        PublicKey { h: G * &self.x }
    }
}

impl PublicKey {
    /// Wraps a public point
    pub fn from_point(h: RistrettoPoint) -> Self {
        Self { h }
    }

    /// Gets this key's public value
    pub fn point(&self) -> &RistrettoPoint {
        &self.h
    }

    /// Combines this public key with another one to form a shared key
    pub fn combine(&mut self, pk: &PublicKey) {
        self.h += &pk.h;
    }

    /// Sums a set of public keys into the collective key
    pub fn collective<'a, I>(keys: I) -> Self
    where
        I: IntoIterator<Item = &'a PublicKey>,
    {
        let mut k = PublicKey {
            h: RistrettoPoint::identity(),
        };
        for pk in keys {
            k.combine(pk);
        }
        k
    }
}

/// Generates `n` key pairs and their collective public key
pub fn generate_keys<R: Rng + CryptoRng>(
    n: usize,
    rng: &mut R,
) -> (PublicKey, Vec<PrivateKey>, Vec<PublicKey>) {
    let private: Vec<_> = iter::repeat_with(|| PrivateKey::random(rng))
        .take(n)
        .collect();
    let public: Vec<_> = private.iter().map(PrivateKey::public_key).collect();
    (PublicKey::collective(&public), private, public)
}

derive_base64_conversions!(PrivateKey, Error);
derive_base64_conversions!(PublicKey, Error);
