//! Deterministic tagging protocol
//!
//! Two rounds around the circuit. In the first every node adds `s·G` to each
//! ciphertext; in the second every node strips its key share and
//! exponentiates by `s`. The root ends up with ciphertexts whose message parts
//! are deterministic tags of the plaintexts.
//!
//! With proofs on, each message carries the proofs of every step taken so far
//! in the round. A node checks that the last step continues from the one
//! before it; the root checks the whole chain back to its own input.

use crate::{
    transport::{circuit_round, TreeNodeInstance},
    tree::Roster,
    Error, Result,
};
use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_POINT, ristretto::RistrettoPoint, scalar::Scalar,
};
use std::sync::Arc;
use tracing::{info, instrument};
use unlynx_curve::{
    cipher::CipherVector,
    det_tag::{addition_sequence_with_proofs, tag_sequence_with_proofs},
    keys::PrivateKey,
    parallel::Parallelism,
    zkp::det_tag::{PublishedDetTagAdditionListProof, PublishedDetTagCreationListProof},
};

/// A batch in transit, with the proofs of the steps applied to it so far
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum DeterministicTaggingMessage {
    /// First round
    Addition {
        /// The ciphertexts
        data: CipherVector,
        /// Proofs of the additions so far, in circuit order
        proofs: Vec<PublishedDetTagAdditionListProof>,
    },
    /// Second round
    Creation {
        /// The ciphertexts
        data: CipherVector,
        /// Proofs of the tagging steps so far, in circuit order
        proofs: Vec<PublishedDetTagCreationListProof>,
    },
}

/// One node's part of a tagging run
#[derive(Clone, Debug)]
pub struct DeterministicTaggingProtocol {
    /// This node's tagging secret for the survey
    pub secret: Scalar,
    /// This node's share of the collective key
    pub private_key: PrivateKey,
    /// Whether steps are proven and checked
    pub proofs: bool,
    /// The servers, in tree order
    pub roster: Arc<Roster>,
    /// The ciphertexts to tag, at the root
    pub target: Option<CipherVector>,
}

/// What a node gets out of a tagging run
#[derive(Clone, Debug, Default)]
pub struct DeterministicTaggingOutput {
    /// The tagged ciphertexts, at the root
    pub result: Option<CipherVector>,
    /// Proof of this node's addition
    pub addition_proof: Option<PublishedDetTagAdditionListProof>,
    /// Proof of this node's tagging step
    pub creation_proof: Option<PublishedDetTagCreationListProof>,
}

struct Checker<'a> {
    roster: &'a Roster,
    percent: f64,
    par: Parallelism,
}

fn added_onto(p: &PublishedDetTagAdditionListProof, before: &PublishedDetTagAdditionListProof) -> bool {
    p.list.len() == before.list.len() && p.list.iter().zip(&before.list).all(|(p, b)| p.c1 == b.r)
}

fn tagged_onto(p: &PublishedDetTagCreationListProof, before: &PublishedDetTagCreationListProof) -> bool {
    p.list.len() == before.list.len()
        && p.list.iter().zip(&before.list).all(|(p, b)| p.before == b.after)
}

impl<'a> Checker<'a> {
    fn key(&self, node: usize) -> Option<RistrettoPoint> {
        self.roster.list.get(node).map(|s| *s.public.point())
    }

    fn addition_step(&self, p: &PublishedDetTagAdditionListProof, data: &CipherVector) -> bool {
        p.list.len() == data.len()
            && p.list.iter().zip(data.iter()).all(|(p, ct)| p.r == ct.c)
            && p.verify(self.percent, &self.par)
    }

    fn creation_step(&self, p: &PublishedDetTagCreationListProof, data: &CipherVector, from: usize) -> bool {
        Some(p.k) == self.key(from)
            && p.list.len() == data.len()
            && p.list.iter().zip(data.iter()).all(|(p, ct)| p.after == *ct)
            && p.verify(self.percent, &self.par)
    }

    fn addition_hop(
        &self,
        data: &CipherVector,
        proofs: &[PublishedDetTagAdditionListProof],
        from: usize,
    ) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let ok = match proofs {
            [.., before, last] => added_onto(last, before) && self.addition_step(last, data),
            [last] => self.addition_step(last, data),
            [] => false,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::BadProof("tag addition", from))
        }
    }

    fn creation_hop(
        &self,
        data: &CipherVector,
        proofs: &[PublishedDetTagCreationListProof],
        from: usize,
    ) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let ok = match proofs {
            [.., before, last] => tagged_onto(last, before) && self.creation_step(last, data, from),
            [last] => self.creation_step(last, data, from),
            [] => false,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::BadProof("tag creation", from))
        }
    }

    // Each node added once, starting from the message parts of `target`, and
    // the key parts were left alone.
    fn addition_circuit(
        &self,
        target: &CipherVector,
        data: &CipherVector,
        proofs: &[PublishedDetTagAdditionListProof],
        circuit: &[usize],
    ) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let last = circuit[circuit.len() - 1];
        if proofs.len() != circuit.len()
            || data.len() != target.len()
            || data.iter().zip(target.iter()).any(|(d, t)| d.k != t.k)
        {
            return Err(Error::BadProof("tag addition", last));
        }
        for (k, p) in proofs.iter().enumerate() {
            let continues = match k {
                0 => {
                    p.list.len() == target.len()
                        && p.list.iter().zip(target.iter()).all(|(p, ct)| p.c1 == ct.c)
                }
                _ => added_onto(p, &proofs[k - 1]),
            };
            if !continues || !p.verify(self.percent, &self.par) {
                return Err(Error::BadProof("tag addition", circuit[k]));
            }
        }
        if !self.addition_step(&proofs[proofs.len() - 1], data) {
            return Err(Error::BadProof("tag addition", last));
        }
        Ok(())
    }

    // Each node stripped its own key share once, starting from the added
    // ciphertexts, with the secret it committed to in the first round.
    fn creation_circuit(
        &self,
        added: &CipherVector,
        additions: &[PublishedDetTagAdditionListProof],
        data: &CipherVector,
        proofs: &[PublishedDetTagCreationListProof],
        circuit: &[usize],
    ) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let last = circuit[circuit.len() - 1];
        if proofs.len() != circuit.len() || additions.len() != circuit.len() {
            return Err(Error::BadProof("tag creation", last));
        }
        for (k, p) in proofs.iter().enumerate() {
            let continues = match k {
                0 => {
                    p.list.len() == added.len()
                        && p.list.iter().zip(added.iter()).all(|(p, ct)| p.before == *ct)
                }
                _ => tagged_onto(p, &proofs[k - 1]),
            };
            let same_secret = additions[k].list.iter().all(|a| a.c2 == p.sb);
            if !continues
                || !same_secret
                || Some(p.k) != self.key(circuit[k])
                || !p.verify(self.percent, &self.par)
            {
                return Err(Error::BadProof("tag creation", circuit[k]));
            }
        }
        if !self.creation_step(&proofs[proofs.len() - 1], data, last) {
            return Err(Error::BadProof("tag creation", last));
        }
        Ok(())
    }
}

impl DeterministicTaggingProtocol {
    /// Runs this node's part of the protocol
    #[instrument(skip_all, fields(node = node.index()))]
    pub fn dispatch(
        self,
        node: &mut TreeNodeInstance<DeterministicTaggingMessage>,
    ) -> Result<DeterministicTaggingOutput> {
        let config = *node.config();
        let par = config.parallelism;
        let is_root = node.is_root();
        let from = node.circuit_prev();
        let circuit = node.tree().pre_order().to_vec();
        let check = Checker {
            roster: &self.roster,
            percent: config.verification_percent,
            par,
        };
        let proofs = self.proofs;
        let s = self.secret;
        let sk = &self.private_key;
        let mut out = DeterministicTaggingOutput::default();

        let target = if is_root {
            let target = self
                .target
                .clone()
                .ok_or(Error::MissingInput("tagging target"))?;
            info!(len = target.len(), "starting deterministic tagging");
            Some(target)
        } else {
            None
        };
        let start = target.clone().map(|data| DeterministicTaggingMessage::Addition {
            data,
            proofs: Vec::new(),
        });

        let addition_proof = &mut out.addition_proof;
        let added = circuit_round(node, start, |msg| match msg {
            DeterministicTaggingMessage::Addition { data, proofs: mut chain } => {
                if proofs && !is_root {
                    check.addition_hop(&data, &chain, from)?;
                }
                let (data, proof) = addition_sequence_with_proofs(&data, &s, proofs, &par);
                *addition_proof = proof.clone();
                chain.extend(proof);
                Ok(DeterministicTaggingMessage::Addition { data, proofs: chain })
            }
            _ => Err(Error::UnexpectedMessage(from)),
        })?;

        let (start, additions) = match (added, &target) {
            (Some(DeterministicTaggingMessage::Addition { data, proofs: chain }), Some(target)) => {
                if proofs {
                    check.addition_circuit(target, &data, &chain, &circuit)?;
                }
                let start = DeterministicTaggingMessage::Creation {
                    data: data.clone(),
                    proofs: Vec::new(),
                };
                (Some(start), Some((data, chain)))
            }
            (Some(_), _) => return Err(Error::UnexpectedMessage(from)),
            (None, _) => (None, None),
        };

        let creation_proof = &mut out.creation_proof;
        let tagged = circuit_round(node, start, |msg| match msg {
            DeterministicTaggingMessage::Creation { data, proofs: mut chain } => {
                if proofs && !is_root {
                    check.creation_hop(&data, &chain, from)?;
                }
                let (data, proof) = tag_sequence_with_proofs(&data, sk, &s, proofs, &par)?;
                *creation_proof = proof.clone();
                chain.extend(proof);
                Ok(DeterministicTaggingMessage::Creation { data, proofs: chain })
            }
            _ => Err(Error::UnexpectedMessage(from)),
        })?;

        out.result = match (tagged, additions) {
            (Some(DeterministicTaggingMessage::Creation { data, proofs: chain }), Some((added, additions))) => {
                if proofs {
                    check.creation_circuit(&added, &additions, &data, &chain, &circuit)?;
                }
                info!(len = data.len(), "deterministic tagging done");
                Some(data)
            }
            (Some(_), _) => return Err(Error::UnexpectedMessage(from)),
            (None, _) => None,
        };
        Ok(out)
    }
}

/// Public commitment `s·B` to a tagging secret
pub fn secret_commitment(secret: &Scalar) -> RistrettoPoint {
    RISTRETTO_BASEPOINT_POINT * secret
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ProtocolConfig,
        transport::{launch, CancellationToken},
        tree::{ServerIdentity, Tree},
    };
    use rand::thread_rng;
    use unlynx_curve::{
        cipher::encrypt_int_vector,
        det_tag::{grouping_key, tags_to_grouping_key},
        keys::generate_keys,
    };

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

    fn tag(setup: &Setup, target: &CipherVector, proofs: bool) -> Result<Vec<DeterministicTaggingOutput>> {
        let tree = Tree::binary(&setup.roster).unwrap();
        launch(&tree, &ProtocolConfig::default(), &CancellationToken::new(), |node| {
            let i = node.index();
            DeterministicTaggingProtocol {
                secret: setup.secrets[i],
                private_key: setup.sks[i].clone(),
                proofs,
                roster: setup.roster.clone(),
                target: if node.is_root() {
                    Some(target.clone())
                } else {
                    None
                },
            }
            .dispatch(node)
        })
    }

    #[test]
    fn equal_plaintexts_get_equal_tags() {
        let setup = setup(3);
        let pk = setup.roster.aggregate();
        let target = encrypt_int_vector(&pk, &[1, 2, 1, 3, 2]);
        let out = tag(&setup, &target, false).unwrap();
        let tags: Vec<_> = out[0]
            .result
            .as_ref()
            .unwrap()
            .iter()
            .map(|ct| grouping_key(&[ct.c]))
            .collect();
        assert_eq!(tags[0], tags[2]);
        assert_eq!(tags[1], tags[4]);
        assert_ne!(tags[0], tags[1]);
        assert_ne!(tags[0], tags[3]);
        assert!(out[1..].iter().all(|o| o.result.is_none()));

        let again = tag(&setup, &encrypt_int_vector(&pk, &[3]), false).unwrap();
        assert_eq!(
            tags_to_grouping_key(again[0].result.as_ref().unwrap()),
            tags[3]
        );
    }

    #[test]
    fn every_step_is_proven() {
        let setup = setup(4);
        let pk = setup.roster.aggregate();
        let target = encrypt_int_vector(&pk, &[5, 6, 7]);
        let out = tag(&setup, &target, true).unwrap();
        let par = Parallelism::default();
        for (i, o) in out.iter().enumerate() {
            assert!(o.addition_proof.as_ref().unwrap().verify(1.0, &par));
            let creation = o.creation_proof.as_ref().unwrap();
            assert!(creation.verify(1.0, &par));
            assert_eq!(creation.k, *setup.roster.list[i].public.point());
            assert_eq!(creation.sb, secret_commitment(&setup.secrets[i]));
        }
    }

    #[test]
    fn a_wrong_key_is_caught() {
        let mut setup = setup(3);
        setup.sks[2] = PrivateKey::random(&mut thread_rng());
        let pk = setup.roster.aggregate();
        let target = encrypt_int_vector(&pk, &[5]);
        let r = tag(&setup, &target, true);
        assert!(matches!(r, Err(Error::BadProof("tag creation", 2))));
    }

    // The node at `position` on the circuit works on other ciphertexts than
    // it received, in the second round if `in_creation` and the first if not.
    fn tag_with_substitution(position: usize, in_creation: bool) -> (usize, Result<Vec<DeterministicTaggingOutput>>) {
        let setup = setup(3);
        let pk = setup.roster.aggregate();
        let target = encrypt_int_vector(&pk, &[1, 2, 3]);
        let forged = encrypt_int_vector(&pk, &[9, 9, 9]);
        let tree = Tree::binary(&setup.roster).unwrap();
        let forger = tree.pre_order()[position];
        let r = launch(&tree, &ProtocolConfig::default(), &CancellationToken::new(), |node| {
            let i = node.index();
            if i != forger {
                return DeterministicTaggingProtocol {
                    secret: setup.secrets[i],
                    private_key: setup.sks[i].clone(),
                    proofs: true,
                    roster: setup.roster.clone(),
                    target: if node.is_root() {
                        Some(target.clone())
                    } else {
                        None
                    },
                }
                .dispatch(node);
            }
            let par = Parallelism::default();
            let s = setup.secrets[i];
            circuit_round(node, None, |msg| match msg {
                DeterministicTaggingMessage::Addition { data, proofs: mut chain } => {
                    let input = if in_creation { &data } else { &forged };
                    let (data, proof) = addition_sequence_with_proofs(input, &s, true, &par);
                    chain.extend(proof);
                    Ok(DeterministicTaggingMessage::Addition { data, proofs: chain })
                }
                other => Ok(other),
            })?;
            circuit_round(node, None, |msg| match msg {
                DeterministicTaggingMessage::Creation { data, proofs: mut chain } => {
                    let input = if in_creation { &forged } else { &data };
                    let (data, proof) = tag_sequence_with_proofs(input, &setup.sks[i], &s, true, &par)?;
                    chain.extend(proof);
                    Ok(DeterministicTaggingMessage::Creation { data, proofs: chain })
                }
                other => Ok(other),
            })?;
            Ok(DeterministicTaggingOutput::default())
        });
        (forger, r)
    }

    #[test]
    fn a_substituted_addition_input_is_caught() {
        for position in 1..3 {
            let (forger, r) = tag_with_substitution(position, false);
            assert!(matches!(r, Err(Error::BadProof("tag addition", n)) if n == forger));
        }
    }

    #[test]
    fn a_substituted_creation_input_is_caught() {
        for position in 1..3 {
            let (forger, r) = tag_with_substitution(position, true);
            assert!(matches!(r, Err(Error::BadProof("tag creation", n)) if n == forger));
        }
    }
}
