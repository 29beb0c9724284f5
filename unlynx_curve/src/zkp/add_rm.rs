//! Proof that a server's key share was added to or removed from a ciphertext
//!
//! For `(K, C) -> (K, C ± k·K)` the proof shows knowledge of `k` with
//! `Krm = k·B` and `±(C' - C) = k·K`.

use super::representation::{self, Relation, Statement};
use crate::{cipher::CipherText, parallel::Parallelism, Error, Result};
use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_POINT, ristretto::RistrettoPoint, scalar::Scalar,
};
use merlin::Transcript;

const DOMAIN: &[u8] = b"add_rm_server";

/// Non-interactive proof
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof(representation::Proof);

/// Public parameters
#[derive(Copy, Clone)]
pub struct Publics<'a> {
    /// Ciphertext before the change
    pub before: &'a CipherText,
    /// Ciphertext after the change
    pub after: &'a CipherText,
    /// Public key of the server joining or leaving
    pub krm: &'a RistrettoPoint,
    /// Whether the share was added
    pub to_add: bool,
}

/// Secret parameters
#[derive(Copy, Clone)]
pub struct Secrets<'a> {
    /// Private key of the server joining or leaving
    pub k: &'a Scalar,
}

fn difference(p: &Publics) -> RistrettoPoint {
    if p.to_add {
        p.after.c - p.before.c
    } else {
        p.before.c - p.after.c
    }
}

fn statement<'a>(b: &'a RistrettoPoint, c2: &'a RistrettoPoint, p: &Publics<'a>) -> Statement<'a> {
    Statement {
        secrets: 1,
        relations: vec![
            Relation {
                lhs: p.krm,
                terms: vec![(0, b)],
            },
            Relation {
                lhs: c2,
                terms: vec![(0, &p.before.k)],
            },
        ],
    }
}

fn commit_direction(transcript: &mut Transcript, to_add: bool) {
    transcript.append_message(b"to_add", &[to_add as u8]);
}

impl Proof {
    /// Generates a non-interactive zero-knowledge proof of a key share change
    pub fn create(transcript: &mut Transcript, publics: Publics, secrets: Secrets) -> Self {
        let b = RISTRETTO_BASEPOINT_POINT;
        let c2 = difference(&publics);
        commit_direction(transcript, publics.to_add);
        Self(representation::Proof::create(
            transcript,
            DOMAIN,
            &statement(&b, &c2, &publics),
            &[*secrets.k],
        ))
    }

    /// Verifies a non-interactive zero-knowledge proof of a key share change
    pub fn verify(&self, transcript: &mut Transcript, publics: Publics) -> Result<()> {
        if publics.before.k != publics.after.k {
            return Err(Error::BadProof);
        }
        let b = RISTRETTO_BASEPOINT_POINT;
        let c2 = difference(&publics);
        commit_direction(transcript, publics.to_add);
        self.0.verify(transcript, DOMAIN, &statement(&b, &c2, &publics))
    }
}

/// A key share change proof for one ciphertext
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedAddRmProof {
    /// The proof transcript
    pub proof: Proof,
    /// Ciphertext before the change
    pub before: CipherText,
    /// Ciphertext after the change
    pub after: CipherText,
}

/// Key share change proofs for a whole vector, made with one key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedAddRmListProof {
    /// One proof per changed ciphertext
    pub list: Vec<PublishedAddRmProof>,
    /// Public key of the server joining or leaving
    pub krm: RistrettoPoint,
    /// Whether the share was added
    pub to_add: bool,
}

impl PublishedAddRmListProof {
    /// Proves a change `before -> after` made with private key `k`
    pub fn create(
        before: &[CipherText],
        after: &[CipherText],
        k: &Scalar,
        to_add: bool,
        par: &Parallelism,
    ) -> Result<Self> {
        if before.len() != after.len() {
            return Err(Error::LengthMismatch(before.len(), after.len()));
        }
        let krm = RISTRETTO_BASEPOINT_POINT * k;
        let list = par.map_indexed(before, |i, bef| {
            let aft = &after[i];
            let publics = Publics {
                before: bef,
                after: aft,
                krm: &krm,
                to_add,
            };
            PublishedAddRmProof {
                proof: Proof::create(&mut Transcript::new(b"unlynx"), publics, Secrets { k }),
                before: *bef,
                after: *aft,
            }
        });
        Ok(Self { list, krm, to_add })
    }

    /// Verifies a sample of `percent` of the proofs
    pub fn verify(&self, percent: f64, par: &Parallelism) -> bool {
        super::verify_list(&self.list, percent, par, |p| {
            let publics = Publics {
                before: &p.before,
                after: &p.after,
                krm: &self.krm,
                to_add: self.to_add,
            };
            p.proof
                .verify(&mut Transcript::new(b"unlynx"), publics)
                .is_ok()
        })
    }
}
