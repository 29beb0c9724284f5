//! Key switching protocol
//!
//! The root sends the ephemeral keys of the ciphertexts and the target key
//! down the tree. Every node computes its contribution; contributions are
//! summed on the way back up and the root adds the original message parts.
//! When proofs are on, each node forwards the proofs of its whole subtree so
//! its parent can check every contribution that went into the sum.

use crate::{transport::TreeNodeInstance, tree::Roster, Error, Result};
use curve25519_dalek::ristretto::RistrettoPoint;
use rand::thread_rng;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use unlynx_curve::{
    cipher::{add_assign_vector, null_cipher_vector, CipherText, CipherVector},
    key_switch::{finalize, key_switch_sequence},
    keys::{PrivateKey, PublicKey},
    parallel::Parallelism,
    zkp::key_switch::PublishedKSListProof,
};

/// Messages of a key switching run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum KeySwitchingMessage {
    /// Sent down the tree to start the run
    Down {
        /// Key to switch to
        target: PublicKey,
        /// Ephemeral keys of the ciphertexts
        rbs: Vec<RistrettoPoint>,
    },
    /// Sent up the tree with the contributions of a subtree
    Up {
        /// Sum of the subtree's contributions
        contribution: CipherVector,
        /// Proofs of every node of the subtree
        proofs: Vec<(usize, PublishedKSListProof)>,
    },
}

/// One node's part of a key switching run
#[derive(Clone, Debug)]
pub struct KeySwitchingProtocol {
    /// This node's share of the collective key
    pub private_key: PrivateKey,
    /// Whether contributions are proven and checked
    pub proofs: bool,
    /// The servers, in tree order
    pub roster: Arc<Roster>,
    /// The ciphertexts and the key to switch them to, at the root
    pub target: Option<(CipherVector, PublicKey)>,
}

/// What a node gets out of a key switching run
#[derive(Clone, Debug, Default)]
pub struct KeySwitchingOutput {
    /// The switched ciphertexts, at the root
    pub result: Option<CipherVector>,
    /// Proof of this node's contribution
    pub proof: Option<PublishedKSListProof>,
}

struct Subtree<'a> {
    roster: &'a Roster,
    target: &'a PublicKey,
    rbs: &'a [RistrettoPoint],
}

impl<'a> Subtree<'a> {
    fn check(
        &self,
        from: usize,
        contribution: &[CipherText],
        proofs: &[(usize, PublishedKSListProof)],
        percent: f64,
        par: &Parallelism,
    ) -> Result<()> {
        let bad = || Error::BadProof("key switching", from);
        if contribution.len() != self.rbs.len() {
            return Err(bad());
        }
        let mut sum = null_cipher_vector(self.rbs.len());
        for (node, proof) in proofs.iter() {
            let key = self.roster.list.get(*node).ok_or_else(bad)?.public.point();
            if proof.list.len() != self.rbs.len() {
                return Err(bad());
            }
            for ((p, rb), s) in proof.list.iter().zip(self.rbs.iter()).zip(sum.iter_mut()) {
                if p.k != *key || p.q != *self.target.point() || p.rb_neg != -rb {
                    return Err(bad());
                }
                s.k += p.vi_b;
                s.c += p.ks2;
            }
            if !proof.verify(percent, par) {
                return Err(bad());
            }
        }
        if sum != contribution {
            return Err(bad());
        }
        Ok(())
    }
}

impl KeySwitchingProtocol {
    /// Runs this node's part of the protocol
    #[instrument(skip_all, fields(node = node.index()))]
    pub fn dispatch(
        self,
        node: &mut TreeNodeInstance<KeySwitchingMessage>,
    ) -> Result<KeySwitchingOutput> {
        let config = *node.config();
        let par = config.parallelism;

        let parent = node.parent();
        let (originals, target, rbs) = match parent {
            None => {
                let (cv, target) = self
                    .target
                    .ok_or(Error::MissingInput("key switching target"))?;
                info!(len = cv.len(), "starting key switching");
                let rbs = cv.iter().map(|ct| ct.k).collect::<Vec<_>>();
                (Some(cv), target, rbs)
            }
            Some(parent) => match node.receive_from(parent)? {
                KeySwitchingMessage::Down { target, rbs } => (None, target, rbs),
                _ => return Err(Error::UnexpectedMessage(parent)),
            },
        };
        node.send_to_children(&KeySwitchingMessage::Down {
            target,
            rbs: rbs.clone(),
        })?;

        let (mut contribution, proof) = key_switch_sequence(
            target.point(),
            &rbs,
            &self.private_key,
            self.proofs,
            &mut thread_rng(),
            &par,
        )?;
        let mut subtree_proofs: Vec<_> = proof
            .iter()
            .map(|p| (node.index(), p.clone()))
            .collect();

        let checker = Subtree {
            roster: &self.roster,
            target: &target,
            rbs: &rbs,
        };
        for (child, msg) in node.receive_from_children()? {
            match msg {
                KeySwitchingMessage::Up {
                    contribution: c,
                    proofs,
                } => {
                    debug!(child, "adding child contribution");
                    if self.proofs {
                        checker.check(child, &c, &proofs, config.verification_percent, &par)?;
                    }
                    add_assign_vector(&mut contribution, &c)?;
                    subtree_proofs.extend(proofs);
                }
                _ => return Err(Error::UnexpectedMessage(child)),
            }
        }

        match originals {
            Some(cv) => {
                let result = finalize(&contribution, &cv)?;
                info!(len = result.len(), "key switching done");
                Ok(KeySwitchingOutput {
                    result: Some(result),
                    proof,
                })
            }
            None => {
                node.send_to_parent(&KeySwitchingMessage::Up {
                    contribution,
                    proofs: subtree_proofs,
                })?;
                Ok(KeySwitchingOutput {
                    result: None,
                    proof,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ProtocolConfig,
        transport::{launch, CancellationToken},
        tree::{ServerIdentity, Tree},
    };
    use unlynx_curve::{
        cipher::{decrypt_int_vector, encrypt_int_vector},
        keys::generate_keys,
    };

    fn switch(
        n: usize,
        proofs: bool,
        corrupt: Option<usize>,
        target_everywhere: bool,
    ) -> Result<(Vec<i64>, Vec<KeySwitchingOutput>, PrivateKey)> {
        let mut rng = thread_rng();
        let (pk, mut sks, pks) = generate_keys(n, &mut rng);
        let roster = Arc::new(Roster::new(
            pks.into_iter()
                .enumerate()
                .map(|(i, public)| ServerIdentity {
                    name: format!("node{}", i),
                    public,
                })
                .collect(),
        ));
        if let Some(i) = corrupt {
            sks[i] = PrivateKey::random(&mut rng);
        }
        let querier = PrivateKey::random(&mut rng);
        let values = vec![3, -8, 0, 77_777];
        let cv = encrypt_int_vector(&pk, &values);

        let tree = Tree::binary(&roster).unwrap();
        let out = launch(&tree, &ProtocolConfig::default(), &CancellationToken::new(), |node| {
            KeySwitchingProtocol {
                private_key: sks[node.index()].clone(),
                proofs,
                roster: roster.clone(),
                target: if node.is_root() || target_everywhere {
                    Some((cv.clone(), querier.public_key()))
                } else {
                    None
                },
            }
            .dispatch(node)
        })?;
        Ok((values, out, querier))
    }

    #[test]
    fn results_decrypt_under_the_querier_key() {
        let (values, out, querier) = switch(5, false, None, false).unwrap();
        let result = out[0].result.as_ref().unwrap();
        assert_eq!(decrypt_int_vector(&querier, result).unwrap(), values);
        assert!(out.iter().all(|o| o.proof.is_none()));
    }

    #[test]
    fn contributions_are_proven() {
        let (values, out, querier) = switch(4, true, None, false).unwrap();
        let result = out[0].result.as_ref().unwrap();
        assert_eq!(decrypt_int_vector(&querier, result).unwrap(), values);
        let par = Parallelism::default();
        assert!(out.iter().all(|o| o.proof.as_ref().unwrap().verify(1.0, &par)));
    }

    #[test]
    fn a_node_with_the_wrong_key_is_caught() {
        let r = switch(3, true, Some(2), false);
        assert!(matches!(r, Err(Error::BadProof("key switching", 2))));
    }

    #[test]
    fn only_the_tree_root_finishes() {
        let (values, out, querier) = switch(4, true, None, true).unwrap();
        let result = out[0].result.as_ref().unwrap();
        assert_eq!(decrypt_int_vector(&querier, result).unwrap(), values);
        assert!(out[1..].iter().all(|o| o.result.is_none()));
    }
}
