//! Shuffle proofs over batches of ciphertext vectors
//!
//! Every row is compressed into a single ciphertext with public weights so the
//! secret shuffle argument can run over one ciphertext per row.

use super::secret_shuffle;
use crate::{
    cipher::{CipherText, CipherVector},
    hash::Xof,
    parallel::Parallelism,
    perm::Permutation,
    Error, Result,
};
use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_POINT, ristretto::RistrettoPoint, scalar::Scalar,
};
use digest::{ExtendableOutput, Input, XofReader};
use merlin::Transcript;

/// Computes one public weight per column from a seed point and a row
pub fn compute_weights(seed: &RistrettoPoint, row: &[CipherText]) -> Vec<Scalar> {
    let seed = seed.compress();
    row.iter()
        .map(|ct| {
            let mut xof = Xof::default();
            xof.input(seed.as_bytes());
            xof.input(ct.c.compress().as_bytes());
            xof.input(ct.k.compress().as_bytes());
            let mut buf = [0u8; 64];
            xof.xof_result().read(&mut buf);
            Scalar::from_bytes_mod_order_wide(&buf)
        })
        .collect()
}

/// Compresses a row into a single ciphertext `sum(e[j]·row[j])`
pub fn compress_row(row: &[CipherText], e: &[Scalar]) -> Result<CipherText> {
    if row.len() != e.len() {
        return Err(Error::LengthMismatch(row.len(), e.len()));
    }
    Ok(row.iter().zip(e.iter()).map(|(ct, e)| ct * e).sum())
}

/// Compresses every row of a batch
pub fn compress_rows(
    rows: &[CipherVector],
    e: &[Scalar],
    par: &Parallelism,
) -> Result<Vec<CipherText>> {
    par.map(rows, |row| compress_row(row, e)).into_iter().collect()
}

/// A shuffle proof together with the batches it binds
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedShufflingProof {
    /// Batch before the shuffle
    pub original: Vec<CipherVector>,
    /// Batch after the shuffle
    pub shuffled: Vec<CipherVector>,
    /// Generator
    pub g: RistrettoPoint,
    /// Public key the batch is encrypted under
    pub h: RistrettoPoint,
    /// The proof transcript
    pub proof: secret_shuffle::Proof,
}

/// A list of shuffle proofs
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedShufflingListProof {
    /// One proof per shuffle
    pub list: Vec<PublishedShufflingProof>,
}

impl PublishedShufflingProof {
    /// Proves that `shuffled[i]` is `original[pi[i]]` re-randomized by
    /// `beta[pi[i]]`
    pub fn create(
        original: Vec<CipherVector>,
        shuffled: Vec<CipherVector>,
        h: &RistrettoPoint,
        beta: &[Vec<Scalar>],
        pi: &Permutation,
        par: &Parallelism,
    ) -> Result<Self> {
        let first = original.first().ok_or(Error::Empty)?;
        let e = compute_weights(h, first);

        let x = compress_rows(&original, &e, par)?;
        let y = compress_rows(&shuffled, &e, par)?;

        let r = pi
            .iter()
            .map(|&p| {
                let b = beta.get(p).ok_or(Error::LengthMismatch(beta.len(), pi.len()))?;
                if b.len() != e.len() {
                    return Err(Error::LengthMismatch(b.len(), e.len()));
                }
                Ok(b.iter().zip(e.iter()).map(|(b, e)| b * e).sum())
            })
            .collect::<Result<Vec<Scalar>>>()?;

        let proof = secret_shuffle::Proof::create(
            &mut Transcript::new(b"unlynx"),
            secret_shuffle::Publics {
                h,
                e0: &x,
                e1: &y,
            },
            secret_shuffle::Secrets { pi, r: &r },
        )?;

        Ok(Self {
            original,
            shuffled,
            g: RISTRETTO_BASEPOINT_POINT,
            h: *h,
            proof,
        })
    }

    /// Checks the proof
    pub fn verify(&self, par: &Parallelism) -> bool {
        self.check(par).is_ok()
    }

    fn check(&self, par: &Parallelism) -> Result<()> {
        if self.g != RISTRETTO_BASEPOINT_POINT || self.original.len() != self.shuffled.len() {
            return Err(Error::BadProof);
        }
        let first = self.original.first().ok_or(Error::BadProof)?;
        let e = compute_weights(&self.h, first);
        let x = compress_rows(&self.original, &e, par)?;
        let y = compress_rows(&self.shuffled, &e, par)?;
        self.proof.verify(
            &mut Transcript::new(b"unlynx"),
            secret_shuffle::Publics {
                h: &self.h,
                e0: &x,
                e1: &y,
            },
        )
    }
}

impl PublishedShufflingListProof {
    /// Verifies a sample of `percent` of the proofs
    pub fn verify(&self, percent: f64, par: &Parallelism) -> bool {
        super::verify_list(&self.list, percent, par, |p| p.verify(par))
    }
}
