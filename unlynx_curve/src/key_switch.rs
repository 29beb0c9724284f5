//! Collective key switching
//!
//! Every node holding a share `k` of the collective key contributes
//! `(v·G, -k·K + v·Q)` for each ciphertext `(K, C)`, where `Q` is the target
//! key and `v` a fresh blinding factor. Once all contributions are summed and
//! `(0, C)` is added back, the result encrypts the same plaintext under `Q`.

use crate::{
    cipher::{CipherText, CipherVector},
    keys::PrivateKey,
    parallel::Parallelism,
    zkp::key_switch::PublishedKSListProof,
    Error, Result,
};
use curve25519_dalek::{
    constants::{RISTRETTO_BASEPOINT_POINT, RISTRETTO_BASEPOINT_TABLE},
    ristretto::{RistrettoBasepointTable, RistrettoPoint},
    scalar::Scalar,
};
use rand::{CryptoRng, Rng};
use std::iter;

const G: &RistrettoBasepointTable = &RISTRETTO_BASEPOINT_TABLE;

/// Computes one node's contribution for every ephemeral key in `rbs`
///
/// Returns the contributions and, if requested, the proofs binding them to
/// the node's public key.
pub fn key_switch_sequence<R: Rng + CryptoRng>(
    target: &RistrettoPoint,
    rbs: &[RistrettoPoint],
    sk: &PrivateKey,
    proofs: bool,
    rng: &mut R,
    par: &Parallelism,
) -> Result<(CipherVector, Option<PublishedKSListProof>)> {
    let vis: Vec<Scalar> = iter::repeat_with(|| Scalar::random(rng))
        .take(rbs.len())
        .collect();
    let x = sk.exponent();
    let contributions = par.map_indexed(rbs, |i, rb| {
        CipherText::new(G * &vis[i], target * vis[i] - rb * x)
    });

    let proof = if proofs {
        let rb_negs: Vec<_> = rbs.iter().map(|rb| -rb).collect();
        let ks2s: Vec<_> = contributions.iter().map(|ct| ct.c).collect();
        let pk = RISTRETTO_BASEPOINT_POINT * x;
        Some(PublishedKSListProof::create(
            &pk, target, x, &ks2s, &rb_negs, &vis, par,
        )?)
    } else {
        None
    };
    Ok((contributions, proof))
}

/// Computes one node's contribution for every ciphertext
pub fn contribution<R: Rng + CryptoRng>(
    target: &RistrettoPoint,
    cv: &[CipherText],
    sk: &PrivateKey,
    proofs: bool,
    rng: &mut R,
    par: &Parallelism,
) -> Result<(CipherVector, Option<PublishedKSListProof>)> {
    let rbs: Vec<_> = cv.iter().map(|ct| ct.k).collect();
    key_switch_sequence(target, &rbs, sk, proofs, rng, par)
}

/// Adds the message parts of the original ciphertexts to the summed
/// contributions
pub fn finalize(contributions: &[CipherText], originals: &[CipherText]) -> Result<CipherVector> {
    if contributions.len() != originals.len() {
        return Err(Error::LengthMismatch(contributions.len(), originals.len()));
    }
    Ok(contributions
        .iter()
        .zip(originals.iter())
        .map(|(ks, o)| CipherText::new(ks.k, ks.c + o.c))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cipher::{add_assign_vector, decrypt_int_vector, encrypt_int_vector, null_cipher_vector},
        keys::generate_keys,
    };
    use rand::thread_rng;

    #[test]
    fn switched_ciphertexts_decrypt_under_the_target_key() {
        let mut rng = thread_rng();
        let par = Parallelism::default();
        let (pk, sks, _) = generate_keys(3, &mut rng);
        let target = PrivateKey::random(&mut rng);
        let values = [0, 1, -12, 4500, 99_999];
        let cv = encrypt_int_vector(&pk, &values);

        let mut sum = null_cipher_vector(cv.len());
        for sk in sks.iter() {
            let (contrib, proof) =
                contribution(target.public_key().point(), &cv, sk, true, &mut rng, &par).unwrap();
            assert!(proof.unwrap().verify(1.0, &par));
            add_assign_vector(&mut sum, &contrib).unwrap();
        }
        let switched = finalize(&sum, &cv).unwrap();
        assert_eq!(decrypt_int_vector(&target, &switched).unwrap(), values);
    }

    #[test]
    fn missing_contributions_leave_garbage() {
        let mut rng = thread_rng();
        let par = Parallelism::sequential();
        let (pk, sks, _) = generate_keys(2, &mut rng);
        let target = PrivateKey::random(&mut rng);
        let cv = encrypt_int_vector(&pk, &[42]);

        let (contrib, proof) =
            contribution(target.public_key().point(), &cv, &sks[0], false, &mut rng, &par).unwrap();
        assert!(proof.is_none());
        let switched = finalize(&contrib, &cv).unwrap();
        assert!(decrypt_int_vector(&target, &switched).map_or(true, |v| v != [42]));
        assert!(finalize(&contrib, &[]).is_err());
    }
}
