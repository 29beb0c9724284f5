//! Shuffling and deterministic tagging in one round
//!
//! The root sends the batch around the circuit. Every node, the root last,
//! shuffles it under the key it is currently encrypted under, adds `s·G` and
//! strips its own key share while exponentiating by `s`. The next node
//! shuffles under the key minus the share just stripped. Once every node has
//! taken its step the message parts are deterministic tags of the rows.

use crate::{
    transport::TreeNodeInstance,
    tree::Roster,
    Error, Result,
};
use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use rand::thread_rng;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use unlynx_curve::{
    cipher::{CipherText, CipherVector},
    det_tag::{addition_sequence_with_proofs, tag_sequence_with_proofs},
    keys::{PrivateKey, PublicKey},
    parallel::Parallelism,
    shuffle::{shuffle_sequence, CipherVectorScalar},
    zkp::{
        det_tag::{PublishedDetTagAdditionListProof, PublishedDetTagCreationListProof},
        shuffle::PublishedShufflingProof,
    },
};

/// Proofs of one node's step
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShufflingDdtProof {
    /// The shuffle
    pub shuffle: PublishedShufflingProof,
    /// The addition of `s·G` to the shuffled rows, flattened
    pub addition: PublishedDetTagAdditionListProof,
    /// The tagging step on the added rows, flattened
    pub creation: PublishedDetTagCreationListProof,
}

/// A batch in transit
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShufflingDdtMessage {
    /// The rows
    pub data: Vec<CipherVector>,
    /// Key the rows are encrypted under
    pub shuffle_key: PublicKey,
    /// Proofs of the steps taken so far, in the order they were taken
    pub steps: Vec<ShufflingDdtProof>,
}

/// One node's part of a shuffling and tagging run
#[derive(Clone, Debug)]
pub struct ShufflingDdtProtocol {
    /// This node's tagging secret
    pub secret: Scalar,
    /// This node's share of the collective key
    pub private_key: PrivateKey,
    /// Precomputed randomization pool
    pub precomputed: Option<Arc<Vec<CipherVectorScalar>>>,
    /// Whether steps are proven and checked
    pub proofs: bool,
    /// The servers, in tree order
    pub roster: Arc<Roster>,
    /// The rows to shuffle and tag, at the root
    pub target: Option<Vec<CipherVector>>,
}

/// What a node gets out of a shuffling and tagging run
#[derive(Clone, Debug, Default)]
pub struct ShufflingDdtOutput {
    /// The shuffled rows, whose message parts are the tags, at the root
    pub result: Option<Vec<CipherVector>>,
    /// Proofs of this node's step
    pub proof: Option<ShufflingDdtProof>,
}

fn flatten(rows: &[CipherVector]) -> CipherVector {
    rows.iter().flat_map(|r| r.iter().copied()).collect()
}

fn regroup(flat: &[CipherText], like: &[CipherVector]) -> Vec<CipherVector> {
    let mut rest = flat;
    like.iter()
        .map(|row| {
            let (head, tail) = rest.split_at(row.len().min(rest.len()));
            rest = tail;
            head.to_vec()
        })
        .collect()
}

struct Checker<'a> {
    roster: &'a Roster,
    percent: f64,
    par: Parallelism,
}

impl<'a> Checker<'a> {
    // The three proofs of a step fit together, under key `h` and node `from`.
    fn step(&self, p: &ShufflingDdtProof, h: &RistrettoPoint, from: usize) -> bool {
        let shuffled = flatten(&p.shuffle.shuffled);
        let key = self.roster.list.get(from).map(|s| *s.public.point());
        p.shuffle.h == *h
            && Some(p.creation.k) == key
            && p.addition.list.len() == shuffled.len()
            && p.creation.list.len() == shuffled.len()
            && p.addition.list.iter().zip(shuffled.iter()).all(|(a, ct)| a.c1 == ct.c)
            && p.addition.list.iter().all(|a| a.c2 == p.creation.sb)
            && p.creation
                .list
                .iter()
                .zip(p.addition.list.iter().zip(shuffled.iter()))
                .all(|(c, (a, ct))| c.before == CipherText::new(ct.k, a.r))
            && p.shuffle.verify(&self.par)
            && p.addition.verify(self.percent, &self.par)
            && p.creation.verify(self.percent, &self.par)
    }

    fn output(p: &ShufflingDdtProof) -> CipherVector {
        p.creation.list.iter().map(|c| c.after).collect()
    }

    fn hop(&self, msg: &ShufflingDdtMessage, order: &[usize], from: usize) -> Result<()> {
        if msg.data.is_empty() {
            return Ok(());
        }
        let bad = || Error::BadProof("shuffling and tagging", from);
        let n = msg.steps.len();
        let last = msg.steps.last().ok_or_else(bad)?;
        let h = last.shuffle.h;
        let continues = n < 2 || Self::output(&msg.steps[n - 2]) == flatten(&last.shuffle.original);
        if !continues
            || Self::output(last) != flatten(&msg.data)
            || *msg.shuffle_key.point() != h - last.creation.k
            || order.get(n - 1) != Some(&from)
            || !self.step(last, &h, from)
        {
            return Err(bad());
        }
        Ok(())
    }

    // Every step before the root's own, from its target under the collective key.
    fn circuit(
        &self,
        msg: &ShufflingDdtMessage,
        target: &[CipherVector],
        order: &[usize],
    ) -> Result<()> {
        if msg.data.is_empty() {
            return Ok(());
        }
        let last = order.len().saturating_sub(1);
        if msg.steps.len() != last {
            return Err(Error::BadProof("shuffling and tagging", order[last.saturating_sub(1)]));
        }
        let mut h = *self.roster.aggregate().point();
        let mut input = flatten(target);
        for (k, p) in msg.steps.iter().enumerate() {
            if flatten(&p.shuffle.original) != input || !self.step(p, &h, order[k]) {
                return Err(Error::BadProof("shuffling and tagging", order[k]));
            }
            h -= p.creation.k;
            input = Self::output(p);
        }
        if input != flatten(&msg.data) || h != *msg.shuffle_key.point() {
            return Err(Error::BadProof("shuffling and tagging", order[last.saturating_sub(1)]));
        }
        Ok(())
    }
}

impl ShufflingDdtProtocol {
    fn step(&self, msg: &ShufflingDdtMessage, par: &Parallelism) -> Result<(Vec<CipherVector>, Option<ShufflingDdtProof>)> {
        let h = msg.shuffle_key.point();
        let precomputed = self.precomputed.as_ref().map(|p| p.as_slice());
        let s = &self.secret;
        let (shuffled, pi, beta) = shuffle_sequence(&msg.data, h, precomputed, &mut thread_rng(), par);
        let flat = flatten(&shuffled);
        let prove = self.proofs && !flat.is_empty();
        let (added, addition) = addition_sequence_with_proofs(&flat, s, prove, par);
        let (tagged, creation) = tag_sequence_with_proofs(&added, &self.private_key, s, prove, par)?;
        let data = regroup(&tagged, &shuffled);
        let proof = match (addition, creation) {
            (Some(addition), Some(creation)) => Some(ShufflingDdtProof {
                shuffle: PublishedShufflingProof::create(msg.data.clone(), shuffled, h, &beta, &pi, par)?,
                addition,
                creation,
            }),
            _ => None,
        };
        Ok((data, proof))
    }

    /// Runs this node's part of the protocol
    #[instrument(skip_all, fields(node = node.index()))]
    pub fn dispatch(self, node: &mut TreeNodeInstance<ShufflingDdtMessage>) -> Result<ShufflingDdtOutput> {
        let config = *node.config();
        let par = config.parallelism;
        let check = Checker {
            roster: &self.roster,
            percent: config.verification_percent,
            par,
        };
        // nodes take their steps after the root's turn to send, root last
        let circuit = node.tree().pre_order();
        let order: Vec<usize> = circuit.iter().skip(1).chain(circuit.first()).copied().collect();
        let prev = node.circuit_prev();
        let next = node.circuit_next();
        let alone = node.tree().size() == 1;

        let (msg, target) = if node.is_root() {
            let target = self
                .target
                .clone()
                .ok_or(Error::MissingInput("shuffling and tagging target"))?;
            info!(rows = target.len(), "starting shuffling and tagging");
            let start = ShufflingDdtMessage {
                data: target.clone(),
                shuffle_key: self.roster.aggregate(),
                steps: Vec::new(),
            };
            if alone {
                (start, Some(target))
            } else {
                node.send_to(next, &start)?;
                let msg = node.receive_from(prev)?;
                if self.proofs {
                    check.circuit(&msg, &target, &order)?;
                }
                (msg, Some(target))
            }
        } else {
            let msg = node.receive_from(prev)?;
            if self.proofs && prev != 0 {
                check.hop(&msg, &order, prev)?;
            }
            (msg, None)
        };

        let (data, proof) = self.step(&msg, &par)?;
        debug!(rows = data.len(), "took shuffling and tagging step");

        if target.is_some() {
            info!(rows = data.len(), "shuffling and tagging done");
            return Ok(ShufflingDdtOutput {
                result: Some(data),
                proof,
            });
        }
        let mut steps = msg.steps;
        steps.extend(proof.clone());
        node.send_to(
            next,
            &ShufflingDdtMessage {
                data,
                shuffle_key: PublicKey::from_point(msg.shuffle_key.point() - self.private_key.public_key().point()),
                steps,
            },
        )?;
        Ok(ShufflingDdtOutput { result: None, proof })
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
    use std::collections::BTreeSet;
    use unlynx_curve::{cipher::encrypt_int_vector, det_tag::tags_to_grouping_key, keys::generate_keys};

    struct Setup {
        roster: Arc<Roster>,
        sks: Vec<PrivateKey>,
        secrets: Vec<Scalar>,
    }

    fn setup(n: usize) -> Setup {
        let mut rng = thread_rng();
        let (_, sks, pks) = generate_keys(n, &mut rng);
        let roster = Roster::new(
            pks.into_iter()
                .enumerate()
                .map(|(i, public)| ServerIdentity {
                    name: format!("node{}", i),
                    public,
                })
                .collect(),
        );
        Setup {
            roster: Arc::new(roster),
            sks,
            secrets: (0..n).map(|_| Scalar::random(&mut rng)).collect(),
        }
    }

    fn run(setup: &Setup, target: &[CipherVector], forger: Option<usize>) -> Result<Vec<ShufflingDdtOutput>> {
        let tree = Tree::binary(&setup.roster).unwrap();
        let pk = setup.roster.aggregate();
        launch(&tree, &ProtocolConfig::default(), &CancellationToken::new(), |node| {
            let i = node.index();
            let protocol = ShufflingDdtProtocol {
                secret: setup.secrets[i],
                private_key: setup.sks[i].clone(),
                precomputed: None,
                proofs: true,
                roster: setup.roster.clone(),
                target: if node.is_root() { Some(target.to_vec()) } else { None },
            };
            if forger != Some(i) {
                return protocol.dispatch(node);
            }
            // take the step on other rows than the ones received
            let prev = node.circuit_prev();
            let next = node.circuit_next();
            let mut msg = node.receive_from(prev)?;
            msg.data = (0..msg.data.len()).map(|_| encrypt_int_vector(&pk, &[99, 99])).collect();
            let (data, proof) = protocol.step(&msg, &Parallelism::default())?;
            let mut steps = msg.steps;
            steps.extend(proof);
            node.send_to(
                next,
                &ShufflingDdtMessage {
                    data,
                    shuffle_key: PublicKey::from_point(msg.shuffle_key.point() - setup.sks[i].public_key().point()),
                    steps,
                },
            )?;
            Ok(ShufflingDdtOutput::default())
        })
    }

    fn tags(rows: &[CipherVector]) -> Vec<String> {
        rows.iter().map(|r| tags_to_grouping_key(r)).collect()
    }

    #[test]
    fn equal_rows_get_equal_tags() {
        let setup = setup(4);
        let pk = setup.roster.aggregate();
        let rows = [[1, 2], [3, 4], [1, 2], [5, 6], [3, 4]];
        let target: Vec<_> = rows.iter().map(|r| encrypt_int_vector(&pk, r)).collect();
        let out = run(&setup, &target, None).unwrap();

        let tagged = tags(out[0].result.as_ref().unwrap());
        assert_eq!(tagged.len(), 5);
        assert_eq!(tagged.iter().collect::<BTreeSet<_>>().len(), 3);
        assert!(out[1..].iter().all(|o| o.result.is_none()));
        assert!(out.iter().all(|o| o.proof.is_some()));

        let again = run(&setup, &target[3..4], None).unwrap();
        assert!(tagged.contains(&tags(again[0].result.as_ref().unwrap())[0]));
    }

    #[test]
    fn a_substituted_batch_is_caught() {
        let setup = setup(3);
        let pk = setup.roster.aggregate();
        let target: Vec<_> = (0..3).map(|i| encrypt_int_vector(&pk, &[i, i])).collect();
        let circuit = Tree::binary(&setup.roster).unwrap().pre_order().to_vec();
        for &forger in circuit[1..].iter() {
            let r = run(&setup, &target, Some(forger));
            assert!(matches!(r, Err(Error::BadProof("shuffling and tagging", n)) if n == forger));
        }
    }
}
