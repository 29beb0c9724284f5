//! Proofs for the two rounds of deterministic tagging

use super::representation::{self, Relation, Statement};
use crate::{cipher::CipherText, parallel::Parallelism, Error, Result};
use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_POINT, ristretto::RistrettoPoint, scalar::Scalar,
};
use merlin::Transcript;

/// Proof that a node stripped its key share and exponentiated by its secret
///
/// For `(K', C') = (s·K, s·C + k·(-s·K))` it shows knowledge of `s` and `k`
/// with `K' = s·K`, `Pub = k·B`, `S = s·B` and `C' = s·C + k·(-s·K)`.
pub mod creation {
    use super::*;

    const DOMAIN: &[u8] = b"det_tag_creation";

    /// Non-interactive proof
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Proof(representation::Proof);

    /// Public parameters
    #[derive(Copy, Clone)]
    pub struct Publics<'a> {
        /// Ciphertext before tagging
        pub before: &'a CipherText,
        /// Ciphertext after tagging
        pub after: &'a CipherText,
        /// `-s·K` of the ciphertext before tagging
        pub neg_sk: &'a RistrettoPoint,
        /// Public key of the tagging node
        pub k: &'a RistrettoPoint,
        /// Secret commitment `s·B`
        pub sb: &'a RistrettoPoint,
    }

    /// Secret parameters
    #[derive(Copy, Clone)]
    pub struct Secrets<'a> {
        /// Tagging secret
        pub s: &'a Scalar,
        /// Private key of the tagging node
        pub k: &'a Scalar,
    }

    fn statement<'a>(b: &'a RistrettoPoint, p: &Publics<'a>) -> Statement<'a> {
        Statement {
            secrets: 2,
            relations: vec![
                Relation {
                    lhs: &p.after.k,
                    terms: vec![(0, &p.before.k)],
                },
                Relation {
                    lhs: p.k,
                    terms: vec![(1, b)],
                },
                Relation {
                    lhs: p.sb,
                    terms: vec![(0, b)],
                },
                Relation {
                    lhs: &p.after.c,
                    terms: vec![(0, &p.before.c), (1, p.neg_sk)],
                },
            ],
        }
    }

    impl Proof {
        /// Generates a non-interactive zero-knowledge proof of a tagging step
        pub fn create(transcript: &mut Transcript, publics: Publics, secrets: Secrets) -> Self {
            let b = RISTRETTO_BASEPOINT_POINT;
            Self(representation::Proof::create(
                transcript,
                DOMAIN,
                &statement(&b, &publics),
                &[*secrets.s, *secrets.k],
            ))
        }

        /// Verifies a non-interactive zero-knowledge proof of a tagging step
        pub fn verify(&self, transcript: &mut Transcript, publics: Publics) -> Result<()> {
            if *publics.neg_sk != -publics.after.k {
                return Err(Error::BadProof);
            }
            let b = RISTRETTO_BASEPOINT_POINT;
            self.0.verify(transcript, DOMAIN, &statement(&b, &publics))
        }
    }
}

/// Proof that a node added `s·B` to a ciphertext's message part
pub mod addition {
    use super::*;

    const DOMAIN: &[u8] = b"det_tag_addition";

    /// Non-interactive proof
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Proof(representation::Proof);

    /// Public parameters
    #[derive(Copy, Clone)]
    pub struct Publics<'a> {
        /// Point before the addition
        pub c1: &'a RistrettoPoint,
        /// Added point `s·B`
        pub c2: &'a RistrettoPoint,
        /// Point after the addition
        pub r: &'a RistrettoPoint,
    }

    /// Secret parameters
    #[derive(Copy, Clone)]
    pub struct Secrets<'a> {
        /// Tagging secret
        pub s: &'a Scalar,
    }

    fn statement<'a>(b: &'a RistrettoPoint, p: &Publics<'a>) -> Statement<'a> {
        Statement {
            secrets: 1,
            relations: vec![Relation {
                lhs: p.c2,
                terms: vec![(0, b)],
            }],
        }
    }

    impl Proof {
        /// Generates a non-interactive zero-knowledge proof of an addition
        pub fn create(transcript: &mut Transcript, publics: Publics, secrets: Secrets) -> Self {
            let b = RISTRETTO_BASEPOINT_POINT;
            transcript.append_message(b"c1", publics.c1.compress().as_bytes());
            Self(representation::Proof::create(
                transcript,
                DOMAIN,
                &statement(&b, &publics),
                &[*secrets.s],
            ))
        }

        /// Verifies a non-interactive zero-knowledge proof of an addition
        pub fn verify(&self, transcript: &mut Transcript, publics: Publics) -> Result<()> {
            if *publics.r != publics.c1 + publics.c2 {
                return Err(Error::BadProof);
            }
            let b = RISTRETTO_BASEPOINT_POINT;
            transcript.append_message(b"c1", publics.c1.compress().as_bytes());
            self.0.verify(transcript, DOMAIN, &statement(&b, &publics))
        }
    }
}

/// A tagging-step proof for one ciphertext
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedDetTagCreationProof {
    /// The proof transcript
    pub proof: creation::Proof,
    /// `-s·K` of the ciphertext before tagging
    pub neg_sk: RistrettoPoint,
    /// Ciphertext before tagging
    pub before: CipherText,
    /// Ciphertext after tagging
    pub after: CipherText,
}

/// Tagging-step proofs of one node for a whole vector
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedDetTagCreationListProof {
    /// One proof per tagged ciphertext
    pub list: Vec<PublishedDetTagCreationProof>,
    /// Public key of the tagging node
    pub k: RistrettoPoint,
    /// Secret commitment `s·B`
    pub sb: RistrettoPoint,
}

/// An addition-step proof for one point
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedDetTagAdditionProof {
    /// The proof transcript
    pub proof: addition::Proof,
    /// Point before the addition
    pub c1: RistrettoPoint,
    /// Added point `s·B`
    pub c2: RistrettoPoint,
    /// Point after the addition
    pub r: RistrettoPoint,
}

/// Addition-step proofs of one node for a whole vector
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedDetTagAdditionListProof {
    /// One proof per modified point
    pub list: Vec<PublishedDetTagAdditionProof>,
}

impl PublishedDetTagCreationListProof {
    /// Proves a tagging step `before -> after` made with secret `s` and
    /// private key `k`
    pub fn create(
        before: &[CipherText],
        after: &[CipherText],
        k: &Scalar,
        s: &Scalar,
        par: &Parallelism,
    ) -> Result<Self> {
        if before.len() != after.len() {
            return Err(Error::LengthMismatch(before.len(), after.len()));
        }
        let b = RISTRETTO_BASEPOINT_POINT;
        let pk = b * k;
        let sb = b * s;
        let list = par.map_indexed(before, |i, bef| {
            let aft = &after[i];
            let neg_sk = -(bef.k * s);
            let publics = creation::Publics {
                before: bef,
                after: aft,
                neg_sk: &neg_sk,
                k: &pk,
                sb: &sb,
            };
            let proof = creation::Proof::create(
                &mut Transcript::new(b"unlynx"),
                publics,
                creation::Secrets { s, k },
            );
            PublishedDetTagCreationProof {
                proof,
                neg_sk,
                before: *bef,
                after: *aft,
            }
        });
        Ok(Self { list, k: pk, sb })
    }

    /// Verifies a sample of `percent` of the proofs
    pub fn verify(&self, percent: f64, par: &Parallelism) -> bool {
        super::verify_list(&self.list, percent, par, |p| {
            let publics = creation::Publics {
                before: &p.before,
                after: &p.after,
                neg_sk: &p.neg_sk,
                k: &self.k,
                sb: &self.sb,
            };
            p.proof
                .verify(&mut Transcript::new(b"unlynx"), publics)
                .is_ok()
        })
    }
}

impl PublishedDetTagAdditionProof {
    /// Proves `r = c1 + s·B`
    pub fn create(c1: &RistrettoPoint, s: &Scalar) -> Self {
        let c2 = RISTRETTO_BASEPOINT_POINT * s;
        let r = c1 + c2;
        let publics = addition::Publics {
            c1,
            c2: &c2,
            r: &r,
        };
        let proof = addition::Proof::create(
            &mut Transcript::new(b"unlynx"),
            publics,
            addition::Secrets { s },
        );
        Self {
            proof,
            c1: *c1,
            c2,
            r,
        }
    }

    /// Checks the proof
    pub fn verify(&self) -> bool {
        let publics = addition::Publics {
            c1: &self.c1,
            c2: &self.c2,
            r: &self.r,
        };
        self.proof
            .verify(&mut Transcript::new(b"unlynx"), publics)
            .is_ok()
    }
}

impl PublishedDetTagAdditionListProof {
    /// Proves the addition of `s·B` to every point
    pub fn create(c1s: &[RistrettoPoint], s: &Scalar, par: &Parallelism) -> Self {
        let list = par.map(c1s, |c1| PublishedDetTagAdditionProof::create(c1, s));
        Self { list }
    }

    /// Verifies a sample of `percent` of the proofs
    pub fn verify(&self, percent: f64, par: &Parallelism) -> bool {
        super::verify_list(&self.list, percent, par, PublishedDetTagAdditionProof::verify)
    }
}
