//! Pedersen vector commitments

use crate::{Error, Result};
use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar, traits::MultiscalarMul};
use rand::{CryptoRng, Rng};
use std::iter;

/// The Pedersen commitment scheme over a vector of generators
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pedersen {
    h: RistrettoPoint,
    g: Vec<RistrettoPoint>,
}

impl Pedersen {
    /// Creates a new commitment scheme with given generators, if they are
    /// pairwise distinct
    pub fn new(h: RistrettoPoint, g: Vec<RistrettoPoint>) -> Option<Self> {
        let distinct = g
            .iter()
            .enumerate()
            .all(|(i, gi)| g[..i].iter().all(|gj| gj != gi));
        if distinct {
            Some(Self { h, g })
        } else {
            None
        }
    }

    /// Creates a new commitment scheme with random generators
    pub fn random<R: Rng + CryptoRng>(n: usize, rng: &mut R) -> Self {
        loop {
            let h = RistrettoPoint::random(rng);
            let g = iter::repeat_with(|| RistrettoPoint::random(rng))
                .take(n)
                .collect();
            if let Some(scheme) = Self::new(h, g) {
                return scheme;
            }
        }
    }

    /// Gets the blinding generator
    pub fn shared_point(&self) -> &RistrettoPoint {
        &self.h
    }

    /// Gets the message generators
    pub fn points(&self) -> &[RistrettoPoint] {
        &self.g
    }

    /// Commits to a sequence of scalars with a fresh blinding factor
    pub fn commit_to<R: Rng + CryptoRng>(
        &self,
        m: &[Scalar],
        rng: &mut R,
    ) -> (RistrettoPoint, Scalar) {
        let r = Scalar::random(rng);
        let c = self.commit_by(m, &r);
        (c, r)
    }

    /// Commits to a sequence of scalars with a given blinding factor
    pub fn commit_by(&self, m: &[Scalar], r: &Scalar) -> RistrettoPoint {
        debug_assert_eq!(m.len(), self.g.len());
        RistrettoPoint::multiscalar_mul(m.iter(), self.g.iter()) + self.h * r
    }

    /// Checks an opening of a commitment
    pub fn open(&self, c: &RistrettoPoint, m: &[Scalar], r: &Scalar) -> Result<()> {
        if m.len() == self.g.len() && *c == self.commit_by(m, r) {
            Ok(())
        } else {
            Err(Error::BadProof)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Pedersen;
    use crate::Error;
    use curve25519_dalek::scalar::Scalar;
    use rand::thread_rng;

    #[test]
    fn pedersen_scheme_commitments_agree_with_validation() {
        let mut rng = thread_rng();
        let com = Pedersen::random(3, &mut rng);
        let m = [
            Scalar::random(&mut rng),
            Scalar::random(&mut rng),
            Scalar::random(&mut rng),
        ];
        let (c, r) = com.commit_to(&m, &mut rng);
        assert!(com.open(&c, &m, &r).is_ok());
        let fake = [m[1], m[2], Scalar::random(&mut rng)];
        let (c1, r1) = com.commit_to(&fake, &mut rng);
        assert!(matches!(com.open(&c1, &m, &r1), Err(Error::BadProof)));
        assert!(matches!(com.open(&c, &m[..2], &r), Err(Error::BadProof)));
    }

    #[test]
    fn repeated_generators_are_rejected() {
        let mut rng = thread_rng();
        let com = Pedersen::random(2, &mut rng);
        let g = com.points()[0];
        assert!(Pedersen::new(*com.shared_point(), vec![g, g]).is_none());
    }
}
