//! Collective aggregation protocol
//!
//! The root announces the run down the tree. Leaves report their groups to
//! their parent; every inner node waits for all its children, merges their
//! groups with its own and reports the sum upwards. The root ends with the
//! groups of the whole cothority.

use crate::{transport::TreeNodeInstance, Error, Result};
use tracing::{debug, info, instrument};
use unlynx_curve::{
    aggregation::{merge_groups, merge_proofs, proof_covers, GroupedResponses},
    cipher::{add_vectors, CipherVector},
    zkp::aggregation::PublishedAggregationListProof,
};

/// Messages of a collective aggregation run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CollectiveAggregationMessage {
    /// Sent down the tree to start the run
    Announcement,
    /// Sent up the tree with the sums of a subtree
    ChildData {
        /// Groups of the subtree
        groups: GroupedResponses,
        /// Sum of the subtree's plain vectors
        simple: Option<CipherVector>,
        /// Proof of the merge done by the sender
        proof: Option<PublishedAggregationListProof>,
    },
}

/// One node's part of a collective aggregation run
#[derive(Clone, Debug, Default)]
pub struct CollectiveAggregationProtocol {
    /// This node's locally aggregated groups
    pub groups: GroupedResponses,
    /// A plain vector to sum instead of, or along with, groups
    pub simple: Option<CipherVector>,
    /// Whether merges are proven and checked
    pub proofs: bool,
}

/// What a node gets out of a collective aggregation run
#[derive(Clone, Debug, Default)]
pub struct CollectiveAggregationOutput {
    /// Groups of the whole cothority, at the root
    pub result: Option<GroupedResponses>,
    /// Sum of all plain vectors, at the root
    pub simple_result: Option<CipherVector>,
    /// Proof of this node's merge
    pub proof: Option<PublishedAggregationListProof>,
}

fn add_simple(a: Option<CipherVector>, b: Option<CipherVector>) -> Result<Option<CipherVector>> {
    Ok(match (a, b) {
        (Some(a), Some(b)) => Some(add_vectors(&a, &b)?),
        (a, None) => a,
        (None, b) => b,
    })
}

impl CollectiveAggregationProtocol {
    /// Runs this node's part of the protocol
    #[instrument(skip_all, fields(node = node.index()))]
    pub fn dispatch(
        self,
        node: &mut TreeNodeInstance<CollectiveAggregationMessage>,
    ) -> Result<CollectiveAggregationOutput> {
        let config = *node.config();

        if let Some(parent) = node.parent() {
            match node.receive_from(parent)? {
                CollectiveAggregationMessage::Announcement => {}
                _ => return Err(Error::UnexpectedMessage(parent)),
            }
        } else {
            info!(groups = self.groups.len(), "starting collective aggregation");
        }
        node.send_to_children(&CollectiveAggregationMessage::Announcement)?;

        let mut parts = vec![self.groups.clone()];
        let mut merged = self.groups;
        let mut simple = self.simple;
        for (child, msg) in node.receive_from_children()? {
            match msg {
                CollectiveAggregationMessage::ChildData {
                    groups,
                    simple: child_simple,
                    proof,
                } => {
                    debug!(child, groups = groups.len(), "merging child data");
                    if self.proofs {
                        let ok = proof.map_or(false, |p| {
                            proof_covers(&p, &groups)
                                && p.verify(config.verification_percent, &config.parallelism)
                        });
                        if !ok {
                            return Err(Error::BadProof("aggregation", child));
                        }
                    }
                    merged = merge_groups(merged, groups.clone())?;
                    parts.push(groups);
                    simple = add_simple(simple, child_simple)?;
                }
                _ => return Err(Error::UnexpectedMessage(child)),
            }
        }

        let proof = if self.proofs {
            let refs: Vec<_> = parts.iter().collect();
            Some(merge_proofs(&refs, &merged))
        } else {
            None
        };

        if node.is_root() {
            info!(groups = merged.len(), "collective aggregation done");
            Ok(CollectiveAggregationOutput {
                result: Some(merged),
                simple_result: simple,
                proof,
            })
        } else {
            node.send_to_parent(&CollectiveAggregationMessage::ChildData {
                groups: merged,
                simple,
                proof: proof.clone(),
            })?;
            Ok(CollectiveAggregationOutput {
                result: None,
                simple_result: None,
                proof,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ProtocolConfig,
        transport::{launch, CancellationToken},
        tree::Tree,
    };
    use rand::thread_rng;
    use unlynx_curve::{
        cipher::{decrypt_int_vector, encrypt_int_vector},
        keys::PrivateKey,
        parallel::Parallelism,
        responses::FilteredResponse,
    };

    fn groups(pk: &unlynx_curve::keys::PublicKey, entries: &[(&str, i64)]) -> GroupedResponses {
        entries
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    FilteredResponse {
                        group_by_enc: encrypt_int_vector(pk, &[0]),
                        aggregating_attributes: encrypt_int_vector(pk, &[*v, 1]),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn groups_are_summed_over_the_tree() {
        let sk = PrivateKey::random(&mut thread_rng());
        let pk = sk.public_key();
        let local = vec![
            groups(&pk, &[("a", 1), ("b", 2)]),
            groups(&pk, &[("a", 10)]),
            groups(&pk, &[("c", 5)]),
            groups(&pk, &[("b", 20), ("c", 6)]),
            groups(&pk, &[]),
        ];
        let tree = Tree::new(local.len(), 2).unwrap();
        let out = launch(&tree, &ProtocolConfig::default(), &CancellationToken::new(), |node| {
            CollectiveAggregationProtocol {
                groups: local[node.index()].clone(),
                simple: Some(encrypt_int_vector(&pk, &[node.index() as i64])),
                proofs: true,
            }
            .dispatch(node)
        })
        .unwrap();

        let result = out[0].result.as_ref().unwrap();
        let sums: Vec<_> = result
            .iter()
            .map(|(k, v)| (k.as_str(), decrypt_int_vector(&sk, &v.aggregating_attributes).unwrap()))
            .collect();
        assert_eq!(sums, vec![("a", vec![11, 2]), ("b", vec![22, 2]), ("c", vec![11, 2])]);
        let simple = out[0].simple_result.as_ref().unwrap();
        assert_eq!(decrypt_int_vector(&sk, simple).unwrap(), [10]);

        let par = Parallelism::default();
        assert!(out.iter().all(|o| o.proof.as_ref().unwrap().verify(1.0, &par)));
        assert!(out[1..].iter().all(|o| o.result.is_none()));
    }

    #[test]
    fn mismatched_groups_fail_the_round() {
        let sk = PrivateKey::random(&mut thread_rng());
        let pk = sk.public_key();
        let tree = Tree::new(2, 2).unwrap();
        let r = launch(&tree, &ProtocolConfig::default(), &CancellationToken::new(), |node| {
            let mut groups = groups(&pk, &[("a", 1)]);
            if node.index() == 1 {
                if let Some(g) = groups.get_mut("a") {
                    g.aggregating_attributes.pop();
                }
            }
            CollectiveAggregationProtocol {
                groups,
                simple: None,
                proofs: false,
            }
            .dispatch(node)
        });
        assert!(matches!(r, Err(Error::Curve(_))));
    }

    #[test]
    fn groups_must_match_the_child_proof() {
        let sk = PrivateKey::random(&mut thread_rng());
        let pk = sk.public_key();
        let tree = Tree::new(2, 2).unwrap();
        let r = launch(&tree, &ProtocolConfig::default(), &CancellationToken::new(), |node| {
            let local = groups(&pk, &[("a", 1), ("b", 2)]);
            if node.is_root() {
                return CollectiveAggregationProtocol {
                    groups: local,
                    simple: None,
                    proofs: true,
                }
                .dispatch(node);
            }
            node.receive_from(0)?;
            let proof = merge_proofs(&[&local], &local);
            node.send_to_parent(&CollectiveAggregationMessage::ChildData {
                groups: groups(&pk, &[("a", 100), ("b", 2)]),
                simple: None,
                proof: Some(proof),
            })?;
            Ok(CollectiveAggregationOutput::default())
        });
        assert!(matches!(r, Err(Error::BadProof("aggregation", 1))));
    }
}
