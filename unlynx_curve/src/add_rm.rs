//! Changing the collective key of encrypted data
//!
//! A server joining the cothority adds `k·K` to the message part of every
//! ciphertext `(K, C)`, and a server leaving it subtracts `k·K`. Either way
//! the result encrypts the same plaintext under the new collective key.

use crate::{
    cipher::{CipherText, CipherVector},
    keys::PrivateKey,
    parallel::Parallelism,
    zkp::add_rm::PublishedAddRmListProof,
    Result,
};
use curve25519_dalek::scalar::Scalar;

/// Adds or removes the share `k` of one ciphertext's key
pub fn change_encryption_key(ct: &CipherText, k: &Scalar, to_add: bool) -> CipherText {
    let share = ct.k * k;
    let c = if to_add { ct.c + share } else { ct.c - share };
    CipherText::new(ct.k, c)
}

/// Adds or removes the share `k` of every ciphertext's key
pub fn change_encryption_key_sequence(
    cv: &[CipherText],
    k: &Scalar,
    to_add: bool,
    par: &Parallelism,
) -> CipherVector {
    par.map(cv, |ct| change_encryption_key(ct, k, to_add))
}

/// Changes every ciphertext, along with the proofs if requested
pub fn change_encryption_key_with_proofs(
    cv: &[CipherText],
    sk: &PrivateKey,
    to_add: bool,
    proofs: bool,
    par: &Parallelism,
) -> Result<(CipherVector, Option<PublishedAddRmListProof>)> {
    let after = change_encryption_key_sequence(cv, sk.exponent(), to_add, par);
    let proof = if proofs {
        Some(PublishedAddRmListProof::create(
            cv,
            &after,
            sk.exponent(),
            to_add,
            par,
        )?)
    } else {
        None
    };
    Ok((after, proof))
}
