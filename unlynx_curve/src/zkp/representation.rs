//! Proofs of knowledge of discrete-log representations
//!
//! A statement is a conjunction of relations `Y = x_a·P_a + x_b·P_b + ...`
//! over a shared set of secret exponents.

use super::{random_scalars, TranscriptProtocol, TranscriptRngProtocol};
use crate::{Error, Result};
use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar, traits::Identity};
use merlin::Transcript;
use rand::thread_rng;

/// One linear relation of a statement
pub(crate) struct Relation<'a> {
    pub lhs: &'a RistrettoPoint,
    pub terms: Vec<(usize, &'a RistrettoPoint)>,
}

/// A conjunction of relations over `secrets` exponents
pub(crate) struct Statement<'a> {
    pub secrets: usize,
    pub relations: Vec<Relation<'a>>,
}

/// Non-interactive proof
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    c: Scalar,
    r: Vec<Scalar>,
}

impl<'a> Statement<'a> {
    fn commit_to(&self, transcript: &mut Transcript) {
        for rel in self.relations.iter() {
            transcript.commit_point(b"Y", rel.lhs);
            for (j, p) in rel.terms.iter() {
                transcript.commit_scalar(b"j", &Scalar::from(*j as u64));
                transcript.commit_point(b"P", p);
            }
        }
    }

    fn evaluate(&self, rel: &Relation, x: &[Scalar]) -> RistrettoPoint {
        rel.terms
            .iter()
            .fold(RistrettoPoint::identity(), |acc, (j, p)| acc + *p * x[*j])
    }
}

impl Proof {
    /// Proves knowledge of `secrets` satisfying the statement
    pub(crate) fn create(
        transcript: &mut Transcript,
        domain: &'static [u8],
        statement: &Statement,
        secrets: &[Scalar],
    ) -> Self {
        debug_assert_eq!(secrets.len(), statement.secrets);
        transcript.domain_sep(domain);
        statement.commit_to(transcript);

        let mut rng = transcript
            .build_rng()
            .commit_scalars(b"x", secrets)
            .finalize(&mut thread_rng());

        let w = random_scalars(statement.secrets, &mut rng);
        for rel in statement.relations.iter() {
            transcript.commit_point(b"t", &statement.evaluate(rel, &w));
        }

        let c = transcript.challenge_scalar(b"c");
        let r = w.iter().zip(secrets.iter()).map(|(w, x)| w - c * x).collect();

        Self { c, r }
    }

    /// Verifies the proof against the statement
    pub(crate) fn verify(
        &self,
        transcript: &mut Transcript,
        domain: &'static [u8],
        statement: &Statement,
    ) -> Result<()> {
        if self.r.len() != statement.secrets {
            return Err(Error::BadProof);
        }
        transcript.domain_sep(domain);
        statement.commit_to(transcript);

        for rel in statement.relations.iter() {
            let t = rel.lhs * self.c + statement.evaluate(rel, &self.r);
            transcript.commit_point(b"t", &t);
        }

        let c = transcript.challenge_scalar(b"c");
        if self.c == c {
            Ok(())
        } else {
            Err(Error::BadProof)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Proof, Relation, Statement};
    use crate::Error;
    use curve25519_dalek::{
        constants::RISTRETTO_BASEPOINT_POINT, ristretto::RistrettoPoint, scalar::Scalar,
    };
    use merlin::Transcript;
    use rand::thread_rng;

    #[test]
    fn prove_and_verify_agree() {
        let mut rng = thread_rng();
        let g = RISTRETTO_BASEPOINT_POINT;
        let h = RistrettoPoint::random(&mut rng);
        let x = Scalar::random(&mut rng);
        let y = Scalar::random(&mut rng);
        let a = g * x;
        let b = h * x + g * y;
        let statement = Statement {
            secrets: 2,
            relations: vec![
                Relation {
                    lhs: &a,
                    terms: vec![(0, &g)],
                },
                Relation {
                    lhs: &b,
                    terms: vec![(0, &h), (1, &g)],
                },
            ],
        };

        let mut proof = Proof::create(&mut Transcript::new(b"test"), b"rep", &statement, &[x, y]);
        let verified = proof.verify(&mut Transcript::new(b"test"), b"rep", &statement);
        assert!(verified.is_ok());

        let wrong = Proof::create(&mut Transcript::new(b"test"), b"rep", &statement, &[x, x]);
        let verified = wrong.verify(&mut Transcript::new(b"test"), b"rep", &statement);
        assert!(matches!(verified, Err(Error::BadProof)));

        // break the proof
        proof.r[1] += Scalar::one();
        let verified = proof.verify(&mut Transcript::new(b"test"), b"rep", &statement);
        assert!(matches!(verified, Err(Error::BadProof)));
    }
}
