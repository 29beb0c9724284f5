//! Zero-knowledge proofs

#![allow(clippy::many_single_char_names)]

pub mod add_rm;
pub mod aggregation;
pub mod det_tag;
pub mod key_switch;
mod known_shuffle;
mod representation;
pub mod secret_shuffle;
pub mod shuffle;

use crate::{cipher::CipherText, commit::Pedersen, parallel::Parallelism, perm::Permutation};
use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use merlin::{Transcript, TranscriptRngBuilder};
use rand::{seq::index, thread_rng, CryptoRng, Rng};
use std::iter;
use tracing::debug;

trait TranscriptProtocol {
    fn domain_sep(&mut self, domain: &'static [u8]);
    fn commit_point(&mut self, label: &'static [u8], point: &RistrettoPoint);
    fn commit_points(&mut self, label: &'static [u8], points: &[RistrettoPoint]);
    fn commit_scalar(&mut self, label: &'static [u8], scalar: &Scalar);
    fn commit_scalars(&mut self, label: &'static [u8], scalars: &[Scalar]);
    fn commit_cipher(&mut self, label: &'static [u8], ct: &CipherText);
    fn commit_ciphers(&mut self, label: &'static [u8], cts: &[CipherText]);
    fn commit_pedersen(&mut self, label: &'static [u8], com: &Pedersen);
    fn challenge_scalar(&mut self, label: &'static [u8]) -> Scalar;
    fn challenge_scalars(&mut self, label: &'static [u8], n: usize) -> Vec<Scalar>;
    fn challenge_point(&mut self, label: &'static [u8]) -> RistrettoPoint;
    fn challenge_pedersen(&mut self, label: &'static [u8], h: RistrettoPoint, n: usize)
        -> Pedersen;
}

impl TranscriptProtocol for Transcript {
    fn domain_sep(&mut self, domain: &'static [u8]) {
        self.append_message(b"$domain", domain);
    }

    fn commit_point(&mut self, label: &'static [u8], point: &RistrettoPoint) {
        self.append_message(label, point.compress().as_bytes());
    }

    fn commit_points(&mut self, label: &'static [u8], points: &[RistrettoPoint]) {
        self.append_message(b"$vec", &(points.len() as u64).to_le_bytes());
        for p in points.iter() {
            self.commit_point(label, p);
        }
    }

    fn commit_scalar(&mut self, label: &'static [u8], scalar: &Scalar) {
        self.append_message(label, scalar.as_bytes());
    }

    fn commit_scalars(&mut self, label: &'static [u8], scalars: &[Scalar]) {
        self.append_message(b"$vec", &(scalars.len() as u64).to_le_bytes());
        for s in scalars.iter() {
            self.commit_scalar(label, s);
        }
    }

    fn commit_cipher(&mut self, label: &'static [u8], ct: &CipherText) {
        self.append_message(b"$cipher", label);
        self.commit_point(label, &ct.k);
        self.commit_point(label, &ct.c);
    }

    fn commit_ciphers(&mut self, label: &'static [u8], cts: &[CipherText]) {
        self.append_message(b"$vec", &(cts.len() as u64).to_le_bytes());
        for ct in cts.iter() {
            self.commit_cipher(label, ct);
        }
    }

    fn commit_pedersen(&mut self, label: &'static [u8], com: &Pedersen) {
        self.append_message(b"$pedersen", label);
        self.commit_point(label, com.shared_point());
        self.commit_points(label, com.points());
    }

    fn challenge_scalar(&mut self, label: &'static [u8]) -> Scalar {
        let mut buf = [0; 64];
        self.challenge_bytes(label, &mut buf);
        Scalar::from_bytes_mod_order_wide(&buf)
    }

    fn challenge_scalars(&mut self, label: &'static [u8], n: usize) -> Vec<Scalar> {
        iter::repeat_with(|| self.challenge_scalar(label))
            .take(n)
            .collect()
    }

    fn challenge_point(&mut self, label: &'static [u8]) -> RistrettoPoint {
        let mut buf = [0; 64];
        self.challenge_bytes(label, &mut buf);
        RistrettoPoint::from_uniform_bytes(&buf)
    }

    fn challenge_pedersen(
        &mut self,
        label: &'static [u8],
        h: RistrettoPoint,
        n: usize,
    ) -> Pedersen {
        loop {
            let g = iter::repeat_with(|| self.challenge_point(label))
                .take(n)
                .collect();
            if let Some(com) = Pedersen::new(h, g) {
                return com;
            }
        }
    }
}

trait TranscriptRngProtocol {
    fn commit_index(self, label: &'static [u8], index: usize) -> Self;
    fn commit_scalar(self, label: &'static [u8], scalar: &Scalar) -> Self;
    fn commit_scalars(self, label: &'static [u8], scalars: &[Scalar]) -> Self;
    fn commit_permutation(self, label: &'static [u8], perm: &Permutation) -> Self;
}

impl TranscriptRngProtocol for TranscriptRngBuilder {
    fn commit_index(self, label: &'static [u8], index: usize) -> Self {
        self.rekey_with_witness_bytes(label, &(index as u64).to_be_bytes())
    }

    fn commit_scalar(self, label: &'static [u8], scalar: &Scalar) -> Self {
        self.rekey_with_witness_bytes(label, scalar.as_bytes())
    }

    fn commit_scalars(self, label: &'static [u8], scalars: &[Scalar]) -> Self {
        let mut builder =
            self.rekey_with_witness_bytes(b"$vec", &(scalars.len() as u64).to_le_bytes());
        for s in scalars.iter() {
            builder = builder.commit_scalar(label, s);
        }
        builder
    }

    fn commit_permutation(self, label: &'static [u8], perm: &Permutation) -> Self {
        let mut builder =
            self.rekey_with_witness_bytes(b"$perm", &(perm.len() as u64).to_le_bytes());
        for p in perm.iter() {
            builder = builder.commit_index(label, *p);
        }
        builder
    }
}

fn random_scalars<R: Rng + CryptoRng>(n: usize, rng: &mut R) -> Vec<Scalar> {
    iter::repeat_with(|| Scalar::random(rng)).take(n).collect()
}

/// Number of proofs checked out of `len` for a verification percentage
pub fn sample_size(len: usize, percent: f64) -> usize {
    let n = (percent.max(0.0) * len as f64).ceil() as usize;
    n.min(len)
}

/// Verifies a random sample of `ceil(percent * len)` proofs and ANDs the
/// results
///
/// Sampled proofs are checked in parallel; failing indices are logged.
pub fn verify_list<T, F>(proofs: &[T], percent: f64, par: &Parallelism, verify: F) -> bool
where
    T: Sync,
    F: Fn(&T) -> bool + Sync + Send,
{
    let n = sample_size(proofs.len(), percent);
    let mut picked = index::sample(&mut thread_rng(), proofs.len(), n).into_vec();
    picked.sort_unstable();
    let results = par.map(&picked, |&i| (i, verify(&proofs[i])));
    let mut ok = true;
    for (i, r) in results {
        if !r {
            debug!(index = i, "proof failed verification");
            ok = false;
        }
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::{sample_size, verify_list};
    use crate::parallel::Parallelism;

    #[test]
    fn sampling_rounds_up() {
        assert_eq!(sample_size(10, 0.0), 0);
        assert_eq!(sample_size(10, 0.01), 1);
        assert_eq!(sample_size(10, 0.5), 5);
        assert_eq!(sample_size(10, 1.0), 10);
        assert_eq!(sample_size(10, 3.0), 10);
    }

    #[test]
    fn full_verification_finds_a_single_failure() {
        let mut v = vec![true; 300];
        v[211] = false;
        let par = Parallelism {
            enabled: true,
            chunk: 16,
        };
        assert!(!verify_list(&v, 1.0, &par, |&b| b));
        assert!(verify_list(&v, 0.0, &par, |&b| b));
        v[211] = true;
        assert!(verify_list(&v, 1.0, &Parallelism::sequential(), |&b| b));
    }
}
