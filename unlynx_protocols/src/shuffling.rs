//! Shuffling protocol
//!
//! The batch travels once around the circuit of all nodes. Every node
//! permutes and re-randomizes it, so no node alone knows the final order.

use crate::{
    transport::{circuit_round, TreeNodeInstance},
    Error, Result,
};
use rand::thread_rng;
use std::sync::Arc;
use tracing::{info, instrument};
use unlynx_curve::{
    cipher::CipherVector,
    keys::PublicKey,
    parallel::Parallelism,
    shuffle::{shuffle_sequence, CipherVectorScalar},
    zkp::shuffle::PublishedShufflingProof,
};

/// A batch in transit, with the proofs of every shuffle applied to it so far
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShufflingMessage {
    /// The rows
    pub data: Vec<CipherVector>,
    /// Proofs of the shuffles that led to `data`, in circuit order
    pub proofs: Vec<PublishedShufflingProof>,
}

/// One node's part of a shuffling run
#[derive(Clone, Debug)]
pub struct ShufflingProtocol {
    /// Key the batch is encrypted under
    pub collective_key: PublicKey,
    /// Precomputed randomization pool
    pub precomputed: Option<Arc<Vec<CipherVectorScalar>>>,
    /// Whether shuffles are proven and checked
    pub proofs: bool,
    /// The batch to shuffle, at the root
    pub target: Option<Vec<CipherVector>>,
}

/// What a node gets out of a shuffling run
#[derive(Clone, Debug, Default)]
pub struct ShufflingOutput {
    /// The shuffled batch, at the root
    pub result: Option<Vec<CipherVector>>,
    /// Proof of this node's shuffle
    pub proof: Option<PublishedShufflingProof>,
}

// The last shuffle must produce `data` from the output of the one before.
fn check_hop(msg: &ShufflingMessage, from: usize, par: &Parallelism) -> Result<()> {
    if msg.data.is_empty() {
        return Ok(());
    }
    let n = msg.proofs.len();
    let ok = match msg.proofs.last() {
        Some(last) => {
            last.shuffled == msg.data
                && (n < 2 || msg.proofs[n - 2].shuffled == last.original)
                && last.verify(par)
        }
        None => false,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::BadProof("shuffling", from))
    }
}

// Every node shuffled once, starting from the root's own batch.
fn check_circuit(
    msg: &ShufflingMessage,
    target: &[CipherVector],
    circuit: &[usize],
    par: &Parallelism,
) -> Result<()> {
    if msg.data.is_empty() {
        return Ok(());
    }
    let last = circuit.len().saturating_sub(1);
    if msg.proofs.len() != circuit.len() {
        return Err(Error::BadProof("shuffling", circuit[last]));
    }
    let mut input = target;
    for (k, p) in msg.proofs.iter().enumerate() {
        if p.original.as_slice() != input || !p.verify(par) {
            return Err(Error::BadProof("shuffling", circuit[k]));
        }
        input = &p.shuffled;
    }
    if input != msg.data.as_slice() {
        return Err(Error::BadProof("shuffling", circuit[last]));
    }
    Ok(())
}

impl ShufflingProtocol {
    /// Runs this node's part of the protocol
    #[instrument(skip_all, fields(node = node.index()))]
    pub fn dispatch(
        self,
        node: &mut TreeNodeInstance<ShufflingMessage>,
    ) -> Result<ShufflingOutput> {
        let par = node.config().parallelism;
        let prev = node.circuit_prev();
        let me = node.index();
        let h = *self.collective_key.point();
        let precomputed = self.precomputed.as_ref().map(|p| p.as_slice());
        let proofs = self.proofs;
        let mut my_proof = None;

        let target = if node.is_root() {
            let target = self.target.ok_or(Error::MissingInput("shuffle target"))?;
            info!(rows = target.len(), "starting shuffle");
            Some(target)
        } else {
            None
        };
        let start = target.clone().map(|data| ShufflingMessage {
            data,
            proofs: Vec::new(),
        });

        let result = circuit_round(node, start, |mut msg| {
            if proofs && me != 0 {
                check_hop(&msg, prev, &par)?;
            }
            let (shuffled, pi, beta) =
                shuffle_sequence(&msg.data, &h, precomputed, &mut thread_rng(), &par);
            if proofs && !msg.data.is_empty() {
                let proof =
                    PublishedShufflingProof::create(msg.data, shuffled.clone(), &h, &beta, &pi, &par)?;
                my_proof = Some(proof.clone());
                msg.proofs.push(proof);
            }
            Ok(ShufflingMessage {
                data: shuffled,
                proofs: msg.proofs,
            })
        })?;

        let result = match (result, target) {
            (Some(last), Some(target)) => {
                if proofs {
                    check_circuit(&last, &target, node.tree().pre_order(), &par)?;
                }
                info!(rows = last.data.len(), "shuffle done");
                Some(last.data)
            }
            _ => None,
        };
        Ok(ShufflingOutput {
            result,
            proof: my_proof,
        })
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
    use curve25519_dalek::scalar::Scalar;
    use unlynx_curve::{
        cipher::{decrypt_int_vector, encrypt_int_vector},
        keys::generate_keys,
        shuffle::create_precomputed_randomize,
    };

    fn run(
        nodes: usize,
        proofs: bool,
        pool: bool,
    ) -> (Vec<Vec<i64>>, Vec<Vec<i64>>, Vec<ShufflingOutput>) {
        let mut rng = thread_rng();
        let (pk, sks, _) = generate_keys(nodes, &mut rng);
        let collective = sks.iter().map(|s| *s.exponent()).sum::<Scalar>();
        let sk = unlynx_curve::keys::PrivateKey::from_exponent(collective);
        let rows: Vec<Vec<i64>> = (0..12).map(|i| vec![i, 100 + i, -i]).collect();
        let target: Vec<_> = rows.iter().map(|r| encrypt_int_vector(&pk, r)).collect();
        let precomputed = if pool {
            Some(Arc::new(create_precomputed_randomize(
                pk.point(),
                &mut rng,
                6,
                10,
                &Parallelism::default(),
            )))
        } else {
            None
        };

        let tree = Tree::new(nodes, 2).unwrap();
        let out = launch(&tree, &ProtocolConfig::default(), &CancellationToken::new(), |node| {
            ShufflingProtocol {
                collective_key: pk,
                precomputed: precomputed.clone(),
                proofs,
                target: if node.is_root() {
                    Some(target.clone())
                } else {
                    None
                },
            }
            .dispatch(node)
        })
        .unwrap();

        let mut shuffled: Vec<_> = out[0]
            .result
            .as_ref()
            .unwrap()
            .iter()
            .map(|r| decrypt_int_vector(&sk, r).unwrap())
            .collect();
        shuffled.sort();
        let mut expected = rows;
        expected.sort();
        (expected, shuffled, out)
    }

    #[test]
    fn shuffle_keeps_the_rows() {
        let (expected, shuffled, out) = run(3, false, false);
        assert_eq!(expected, shuffled);
        assert!(out.iter().all(|o| o.proof.is_none()));
    }

    #[test]
    fn every_node_proves_its_shuffle() {
        let (expected, shuffled, out) = run(4, true, true);
        assert_eq!(expected, shuffled);
        let par = Parallelism::default();
        assert!(out.iter().all(|o| o.proof.as_ref().unwrap().verify(&par)));
        assert!(out[1..].iter().all(|o| o.result.is_none()));
    }

    // The node at `position` on the circuit shuffles other rows than it got.
    fn run_with_substitution(position: usize) -> Result<Vec<ShufflingOutput>> {
        let mut rng = thread_rng();
        let (pk, _, _) = generate_keys(3, &mut rng);
        let h = *pk.point();
        let target: Vec<_> = (0..4).map(|i| encrypt_int_vector(&pk, &[i, i])).collect();
        let forged: Vec<_> = (0..4).map(|i| encrypt_int_vector(&pk, &[7, i])).collect();
        let tree = Tree::new(3, 2).unwrap();
        let forger = tree.pre_order()[position];

        launch(&tree, &ProtocolConfig::default(), &CancellationToken::new(), |node| {
            if node.index() != forger {
                return ShufflingProtocol {
                    collective_key: pk,
                    precomputed: None,
                    proofs: true,
                    target: if node.is_root() {
                        Some(target.clone())
                    } else {
                        None
                    },
                }
                .dispatch(node);
            }
            let par = Parallelism::default();
            circuit_round(node, None, |mut msg| {
                let (shuffled, pi, beta) =
                    shuffle_sequence(&forged, &h, None, &mut thread_rng(), &par);
                msg.proofs.push(PublishedShufflingProof::create(
                    forged.clone(),
                    shuffled.clone(),
                    &h,
                    &beta,
                    &pi,
                    &par,
                )?);
                Ok(ShufflingMessage {
                    data: shuffled,
                    proofs: msg.proofs,
                })
            })?;
            Ok(ShufflingOutput::default())
        })
    }

    #[test]
    fn a_substituted_input_is_caught_by_the_next_node() {
        let forger = Tree::new(3, 2).unwrap().pre_order()[1];
        let r = run_with_substitution(1);
        assert!(matches!(r, Err(Error::BadProof("shuffling", n)) if n == forger));
    }

    #[test]
    fn a_substituted_input_is_caught_by_the_root() {
        let forger = Tree::new(3, 2).unwrap().pre_order()[2];
        let r = run_with_substitution(2);
        assert!(matches!(r, Err(Error::BadProof("shuffling", n)) if n == forger));
    }

    #[test]
    fn single_node_shuffles_alone() {
        let (expected, shuffled, _) = run(1, true, false);
        assert_eq!(expected, shuffled);
    }
}
