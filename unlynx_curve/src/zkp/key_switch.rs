//! Proof that a key-switching contribution is well formed
//!
//! A node with private key `k` and fresh blinding `v` switching a ciphertext
//! with ephemeral key `R` to the target key `Q` publishes `viB = v·B` and
//! `ks2 = -k·R + v·Q`. The proof shows knowledge of `v` and `k` with
//! `viB = v·B`, `K = k·B` and `ks2 = k·rbNeg + v·Q`, where `rbNeg = -R`.

use super::representation::{self, Relation, Statement};
use crate::{parallel::Parallelism, Error, Result};
use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_POINT, ristretto::RistrettoPoint, scalar::Scalar,
};
use merlin::Transcript;

const DOMAIN: &[u8] = b"key_switch";

/// Non-interactive proof
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof(representation::Proof);

/// Public parameters
#[derive(Copy, Clone)]
pub struct Publics<'a> {
    /// Public key of the switching node
    pub k: &'a RistrettoPoint,
    /// Blinding commitment
    pub vi_b: &'a RistrettoPoint,
    /// Switched component
    pub ks2: &'a RistrettoPoint,
    /// Negated original ephemeral key
    pub rb_neg: &'a RistrettoPoint,
    /// Target public key
    pub q: &'a RistrettoPoint,
}

/// Secret parameters
#[derive(Copy, Clone)]
pub struct Secrets<'a> {
    /// Private key of the switching node
    pub k: &'a Scalar,
    /// Fresh blinding factor
    pub v: &'a Scalar,
}

fn statement<'a>(b: &'a RistrettoPoint, publics: &Publics<'a>) -> Statement<'a> {
    Statement {
        secrets: 2,
        relations: vec![
            Relation {
                lhs: publics.vi_b,
                terms: vec![(0, b)],
            },
            Relation {
                lhs: publics.k,
                terms: vec![(1, b)],
            },
            Relation {
                lhs: publics.ks2,
                terms: vec![(1, publics.rb_neg), (0, publics.q)],
            },
        ],
    }
}

impl Proof {
    /// Generates a non-interactive zero-knowledge proof of a key-switching
    /// contribution
    pub fn create(transcript: &mut Transcript, publics: Publics, secrets: Secrets) -> Self {
        let b = RISTRETTO_BASEPOINT_POINT;
        let st = statement(&b, &publics);
        Self(representation::Proof::create(
            transcript,
            DOMAIN,
            &st,
            &[*secrets.v, *secrets.k],
        ))
    }

    /// Verifies a non-interactive zero-knowledge proof of a key-switching
    /// contribution
    pub fn verify(&self, transcript: &mut Transcript, publics: Publics) -> Result<()> {
        let b = RISTRETTO_BASEPOINT_POINT;
        let st = statement(&b, &publics);
        self.0.verify(transcript, DOMAIN, &st)
    }
}

/// A key-switching proof together with its public values
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedKSProof {
    /// The proof transcript
    pub proof: Proof,
    /// Public key of the switching node
    pub k: RistrettoPoint,
    /// Blinding commitment
    pub vi_b: RistrettoPoint,
    /// Switched component
    pub ks2: RistrettoPoint,
    /// Negated original ephemeral key
    pub rb_neg: RistrettoPoint,
    /// Target public key
    pub q: RistrettoPoint,
}

/// Key-switching proofs for a whole vector
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedKSListProof {
    /// One proof per switched ciphertext
    pub list: Vec<PublishedKSProof>,
}

impl PublishedKSProof {
    fn publics(&self) -> Publics {
        Publics {
            k: &self.k,
            vi_b: &self.vi_b,
            ks2: &self.ks2,
            rb_neg: &self.rb_neg,
            q: &self.q,
        }
    }

    /// Proves one key-switching contribution
    pub fn create(
        k: &RistrettoPoint,
        q: &RistrettoPoint,
        sk: &Scalar,
        vi_b: &RistrettoPoint,
        ks2: &RistrettoPoint,
        rb_neg: &RistrettoPoint,
        v: &Scalar,
    ) -> Self {
        let publics = Publics {
            k,
            vi_b,
            ks2,
            rb_neg,
            q,
        };
        let proof = Proof::create(&mut Transcript::new(b"unlynx"), publics, Secrets { k: sk, v });
        Self {
            proof,
            k: *k,
            vi_b: *vi_b,
            ks2: *ks2,
            rb_neg: *rb_neg,
            q: *q,
        }
    }

    /// Checks the proof
    pub fn verify(&self) -> bool {
        self.proof
            .verify(&mut Transcript::new(b"unlynx"), self.publics())
            .is_ok()
    }
}

impl PublishedKSListProof {
    /// Proves a batch of contributions made with the same node key
    ///
    /// `ks2s`, `rb_negs` and `vis` must have the same length.
    pub fn create(
        k: &RistrettoPoint,
        q: &RistrettoPoint,
        sk: &Scalar,
        ks2s: &[RistrettoPoint],
        rb_negs: &[RistrettoPoint],
        vis: &[Scalar],
        par: &Parallelism,
    ) -> Result<Self> {
        if ks2s.len() != vis.len() {
            return Err(Error::LengthMismatch(ks2s.len(), vis.len()));
        }
        if rb_negs.len() != vis.len() {
            return Err(Error::LengthMismatch(rb_negs.len(), vis.len()));
        }
        let b = RISTRETTO_BASEPOINT_POINT;
        let list = par.map_indexed(vis, |i, v| {
            PublishedKSProof::create(k, q, sk, &(b * v), &ks2s[i], &rb_negs[i], v)
        });
        Ok(Self { list })
    }

    /// Verifies a sample of `percent` of the proofs
    pub fn verify(&self, percent: f64, par: &Parallelism) -> bool {
        super::verify_list(&self.list, percent, par, PublishedKSProof::verify)
    }
}

#[cfg(test)]
mod tests {
    use super::{Proof, PublishedKSListProof, PublishedKSProof, Publics, Secrets};
    use crate::{parallel::Parallelism, Error};
    use curve25519_dalek::{
        constants::RISTRETTO_BASEPOINT_POINT, ristretto::RistrettoPoint, scalar::Scalar,
    };
    use merlin::Transcript;
    use rand::thread_rng;

    #[test]
    fn prove_and_verify_agree() {
        let mut rng = thread_rng();
        let b = RISTRETTO_BASEPOINT_POINT;
        let sk = Scalar::random(&mut rng);
        let v = Scalar::random(&mut rng);
        let k = b * sk;
        let q = RistrettoPoint::random(&mut rng);
        let rb_neg = -RistrettoPoint::random(&mut rng);
        let vi_b = b * v;
        let ks2 = rb_neg * sk + q * v;

        let publics = Publics {
            k: &k,
            vi_b: &vi_b,
            ks2: &ks2,
            rb_neg: &rb_neg,
            q: &q,
        };
        let secrets = Secrets { k: &sk, v: &v };

        let proof = Proof::create(&mut Transcript::new(b"test"), publics, secrets);
        let verified = proof.verify(&mut Transcript::new(b"test"), publics);
        assert!(verified.is_ok());

        // break the proof
        let other = b * Scalar::random(&mut rng);
        let broken = Publics { q: &other, ..publics };
        let verified = proof.verify(&mut Transcript::new(b"test"), broken);
        assert!(matches!(verified, Err(Error::BadProof)));
    }

    #[test]
    fn tampering_with_any_public_value_is_detected() {
        let mut rng = thread_rng();
        let b = RISTRETTO_BASEPOINT_POINT;
        let sk = Scalar::random(&mut rng);
        let q = RistrettoPoint::random(&mut rng);
        let vis: Vec<_> = (0..4).map(|_| Scalar::random(&mut rng)).collect();
        let rb_negs: Vec<_> = (0..4).map(|_| -RistrettoPoint::random(&mut rng)).collect();
        let ks2s: Vec<_> = vis
            .iter()
            .zip(rb_negs.iter())
            .map(|(v, r)| r * sk + q * v)
            .collect();
        let par = Parallelism::default();
        let proofs =
            PublishedKSListProof::create(&(b * sk), &q, &sk, &ks2s, &rb_negs, &vis, &par).unwrap();
        assert!(proofs.verify(1.0, &par));

        let junk = RistrettoPoint::random(&mut rng);
        let tampers: [fn(&mut PublishedKSProof, RistrettoPoint); 5] = [
            |p, x| p.k = x,
            |p, x| p.vi_b = x,
            |p, x| p.ks2 = x,
            |p, x| p.rb_neg = x,
            |p, x| p.q = x,
        ];
        for tamper in tampers.iter() {
            let mut broken = proofs.clone();
            tamper(&mut broken.list[0], junk);
            assert!(!broken.verify(1.0, &par));
        }
    }

    #[test]
    fn list_inputs_must_have_the_same_length() {
        let mut rng = thread_rng();
        let b = RISTRETTO_BASEPOINT_POINT;
        let sk = Scalar::random(&mut rng);
        let q = RistrettoPoint::random(&mut rng);
        let vis: Vec<_> = (0..3).map(|_| Scalar::random(&mut rng)).collect();
        let points: Vec<_> = (0..3).map(|_| RistrettoPoint::random(&mut rng)).collect();
        let par = Parallelism::sequential();

        let r = PublishedKSListProof::create(&(b * sk), &q, &sk, &points[..2], &points, &vis, &par);
        assert!(matches!(r, Err(Error::LengthMismatch(2, 3))));
        let r = PublishedKSListProof::create(&(b * sk), &q, &sk, &points, &points[..1], &vis, &par);
        assert!(matches!(r, Err(Error::LengthMismatch(1, 3))));
        let r = PublishedKSListProof::create(&(b * sk), &q, &sk, &points, &points, &vis[..2], &par);
        assert!(matches!(r, Err(Error::LengthMismatch(3, 2))));
    }
}
