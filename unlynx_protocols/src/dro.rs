//! Distributed results obfuscation
//!
//! A table of differential privacy noise values is encrypted by the root and
//! shuffled around the circuit, so no node knows which value ends up first.
//! That value is the noise added to the results.

use crate::{
    shuffling::{ShufflingMessage, ShufflingProtocol},
    transport::TreeNodeInstance,
    Result,
};
use tracing::instrument;
use unlynx_curve::{
    cipher::{encrypt_int, CipherText, CipherVector},
    keys::PublicKey,
    zkp::shuffle::PublishedShufflingProof,
};

/// One node's part of a noise shuffling run
#[derive(Clone, Debug)]
pub struct DroProtocol {
    /// Key the noise is encrypted under
    pub collective_key: PublicKey,
    /// Whether shuffles are proven and checked
    pub proofs: bool,
    /// The noise table, at the root
    pub noise: Option<Vec<i64>>,
}

/// What a node gets out of a noise shuffling run
#[derive(Clone, Debug, Default)]
pub struct DroOutput {
    /// The noise to add, at the root
    pub noise: Option<CipherText>,
    /// Proof of this node's shuffle
    pub proof: Option<PublishedShufflingProof>,
}

/// Encrypts a noise table as one-element rows
pub fn noise_rows(noise: &[i64], pk: &PublicKey) -> Vec<CipherVector> {
    noise.iter().map(|&v| vec![encrypt_int(pk, v)]).collect()
}

impl DroProtocol {
    /// Runs this node's part of the protocol
    #[instrument(skip_all, fields(node = node.index()))]
    pub fn dispatch(self, node: &mut TreeNodeInstance<ShufflingMessage>) -> Result<DroOutput> {
        let target = self
            .noise
            .as_ref()
            .map(|n| noise_rows(n, &self.collective_key));
        let out = ShufflingProtocol {
            collective_key: self.collective_key,
            precomputed: None,
            proofs: self.proofs,
            target,
        }
        .dispatch(node)?;
        Ok(DroOutput {
            noise: out
                .result
                .and_then(|rows| rows.into_iter().next())
                .and_then(|row| row.into_iter().next()),
            proof: out.proof,
        })
    }
}
