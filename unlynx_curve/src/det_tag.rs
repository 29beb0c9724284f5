//! Deterministic tagging of ciphertexts
//!
//! Tagging runs in two rounds over every node. In the first round each node
//! adds `s·G` to the message part of every ciphertext. In the second round
//! each node strips its share `k` of the collective key and exponentiates by
//! its secret: `(K, C) -> (s·K, s·(C - k·K))`. Once every node has done both,
//! the message part is `(Πs)·(M + Σs·G)`, which only depends on the plaintext.

use crate::{
    cipher::{CipherText, CipherVector},
    hash::Hash,
    keys::PrivateKey,
    parallel::Parallelism,
    zkp::det_tag::{PublishedDetTagAdditionListProof, PublishedDetTagCreationListProof},
    Result,
};
use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_TABLE,
    ristretto::{RistrettoBasepointTable, RistrettoPoint},
    scalar::Scalar,
};
use digest::Digest;

const G: &RistrettoBasepointTable = &RISTRETTO_BASEPOINT_TABLE;

/// An opaque key grouping responses with equal tagged attributes
pub type GroupingKey = String;

/// Applies one node's tagging step to a ciphertext
pub fn tag(ct: &CipherText, sk: &PrivateKey, s: &Scalar) -> CipherText {
    let contrib = ct.k * sk.exponent();
    CipherText::new(ct.k * s, (ct.c - contrib) * s)
}

/// Applies one node's tagging step to every ciphertext
pub fn tag_sequence(
    cv: &[CipherText],
    sk: &PrivateKey,
    s: &Scalar,
    par: &Parallelism,
) -> CipherVector {
    par.map(cv, |ct| tag(ct, sk, s))
}

/// Adds `s·G` to the message part of every ciphertext
pub fn addition_sequence(cv: &[CipherText], s: &Scalar, par: &Parallelism) -> CipherVector {
    let sg = G * s;
    par.map(cv, |ct| CipherText::new(ct.k, ct.c + sg))
}

/// Adds `s·G` to every ciphertext, along with the proofs if requested
pub fn addition_sequence_with_proofs(
    cv: &[CipherText],
    s: &Scalar,
    proofs: bool,
    par: &Parallelism,
) -> (CipherVector, Option<PublishedDetTagAdditionListProof>) {
    let after = addition_sequence(cv, s, par);
    let proof = if proofs {
        let c1s: Vec<_> = cv.iter().map(|ct| ct.c).collect();
        Some(PublishedDetTagAdditionListProof::create(&c1s, s, par))
    } else {
        None
    };
    (after, proof)
}

/// Tags every ciphertext, along with the proofs if requested
pub fn tag_sequence_with_proofs(
    cv: &[CipherText],
    sk: &PrivateKey,
    s: &Scalar,
    proofs: bool,
    par: &Parallelism,
) -> Result<(CipherVector, Option<PublishedDetTagCreationListProof>)> {
    let after = tag_sequence(cv, sk, s, par);
    let proof = if proofs {
        Some(PublishedDetTagCreationListProof::create(
            cv,
            &after,
            sk.exponent(),
            s,
            par,
        )?)
    } else {
        None
    };
    Ok((after, proof))
}

/// Derives the grouping key of a sequence of tags
///
/// The empty sequence has the empty key.
pub fn grouping_key(tags: &[RistrettoPoint]) -> GroupingKey {
    if tags.is_empty() {
        return GroupingKey::new();
    }
    let digest = tags
        .iter()
        .fold(Hash::new(), |h, t| h.chain(t.compress().as_bytes()))
        .result();
    unlynx_serde::to_base64(&digest)
}

/// Derives the grouping key of fully tagged ciphertexts
pub fn tags_to_grouping_key(cv: &[CipherText]) -> GroupingKey {
    let tags: Vec<_> = cv.iter().map(|ct| ct.c).collect();
    grouping_key(&tags)
}

/// Applies the last tagging step and derives the grouping key
pub fn cipher_vector_to_deterministic_tag(
    cv: &[CipherText],
    sk: &PrivateKey,
    s: &Scalar,
    proofs: bool,
    par: &Parallelism,
) -> Result<(GroupingKey, Option<PublishedDetTagCreationListProof>)> {
    let (after, proof) = tag_sequence_with_proofs(cv, sk, s, proofs, par)?;
    Ok((tags_to_grouping_key(&after), proof))
}
