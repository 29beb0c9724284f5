//! Add/remove server protocol
//!
//! The server joining or leaving the cothority stands at the root. It adds its
//! key share to, or removes it from, every ciphertext of the target and sends
//! the result down the tree with its proofs. Every node checks the proofs and
//! ends with the re-encrypted data.

use crate::{transport::TreeNodeInstance, Error, Result};
use tracing::{debug, info, instrument};
use unlynx_curve::{
    add_rm::change_encryption_key_with_proofs,
    cipher::CipherVector,
    keys::{PrivateKey, PublicKey},
    parallel::Parallelism,
    zkp::add_rm::PublishedAddRmListProof,
};

/// The re-encrypted data, on its way down the tree
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddRmServerMessage {
    /// The rows
    pub data: Vec<CipherVector>,
    /// Proofs for the rows, flattened in row order
    pub proof: Option<PublishedAddRmListProof>,
}

/// One node's part of an add/remove server run
#[derive(Clone, Debug)]
pub struct AddRmServerProtocol {
    /// Public key of the server joining or leaving
    pub server: PublicKey,
    /// Its private key, at the root
    pub private_key: Option<PrivateKey>,
    /// Whether the share is added or removed
    pub to_add: bool,
    /// Whether the change is proven and checked
    pub proofs: bool,
    /// The rows to re-encrypt, at the root
    pub target: Option<Vec<CipherVector>>,
}

/// What every node gets out of an add/remove server run
#[derive(Clone, Debug, Default)]
pub struct AddRmServerOutput {
    /// The re-encrypted rows
    pub result: Vec<CipherVector>,
    /// Proofs published by the root
    pub proof: Option<PublishedAddRmListProof>,
}

fn flatten(rows: &[CipherVector]) -> CipherVector {
    rows.iter().flat_map(|r| r.iter().copied()).collect()
}

impl AddRmServerProtocol {
    fn check(&self, msg: &AddRmServerMessage, from: usize, percent: f64, par: &Parallelism) -> Result<()> {
        let flat = flatten(&msg.data);
        if flat.is_empty() {
            return Ok(());
        }
        let ok = msg.proof.as_ref().map_or(false, |p| {
            p.krm == *self.server.point()
                && p.to_add == self.to_add
                && p.list.len() == flat.len()
                && p.list.iter().zip(flat.iter()).all(|(p, ct)| p.after == *ct)
                && p.verify(percent, par)
        });
        if ok {
            Ok(())
        } else {
            Err(Error::BadProof("add/rm server", from))
        }
    }

    /// Runs this node's part of the protocol
    #[instrument(skip_all, fields(node = node.index()))]
    pub fn dispatch(self, node: &mut TreeNodeInstance<AddRmServerMessage>) -> Result<AddRmServerOutput> {
        let config = *node.config();
        let par = config.parallelism;

        let msg = match node.parent() {
            None => {
                let target = self
                    .target
                    .as_ref()
                    .ok_or(Error::MissingInput("add/rm server target"))?;
                let sk = self
                    .private_key
                    .as_ref()
                    .ok_or(Error::MissingInput("add/rm server key"))?;
                info!(rows = target.len(), add = self.to_add, "starting add/rm server");
                let flat = flatten(target);
                let (changed, proof) = change_encryption_key_with_proofs(&flat, sk, self.to_add, self.proofs, &par)?;
                let mut rest = changed.as_slice();
                let data = target
                    .iter()
                    .map(|row| {
                        let (head, tail) = rest.split_at(row.len());
                        rest = tail;
                        head.to_vec()
                    })
                    .collect();
                AddRmServerMessage { data, proof }
            }
            Some(parent) => {
                let msg = node.receive_from(parent)?;
                debug!(rows = msg.data.len(), "received re-encrypted data");
                if self.proofs {
                    self.check(&msg, parent, config.verification_percent, &par)?;
                }
                msg
            }
        };
        node.send_to_children(&msg)?;

        if node.is_root() {
            info!(rows = msg.data.len(), "add/rm server done");
        }
        Ok(AddRmServerOutput {
            result: msg.data,
            proof: msg.proof,
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
    use rand::thread_rng;
    use unlynx_curve::{
        cipher::{decrypt_int_vector, encrypt_int_vector},
        keys::generate_keys,
    };

    fn run(
        to_add: bool,
        proofs: bool,
        announced: &PublicKey,
        key: &PrivateKey,
        target: &[CipherVector],
    ) -> Result<Vec<AddRmServerOutput>> {
        let tree = Tree::new(4, 2).unwrap();
        launch(&tree, &ProtocolConfig::default(), &CancellationToken::new(), |node| {
            let root = node.is_root();
            AddRmServerProtocol {
                server: *announced,
                private_key: if root { Some(key.clone()) } else { None },
                to_add,
                proofs,
                target: if root { Some(target.to_vec()) } else { None },
            }
            .dispatch(node)
        })
    }

    #[test]
    fn every_node_gets_data_under_the_new_key() {
        let mut rng = thread_rng();
        let (pk, sks, _) = generate_keys(3, &mut rng);
        let joining = PrivateKey::random(&mut rng);
        let old: Scalar = sks.iter().map(|s| *s.exponent()).sum();
        let new = PrivateKey::from_exponent(old + joining.exponent());
        let rows = vec![vec![1, 2], vec![3], vec![-4, 5, 6]];
        let target: Vec<_> = rows.iter().map(|r| encrypt_int_vector(&pk, r)).collect();

        let out = run(true, true, &joining.public_key(), &joining, &target).unwrap();
        for o in out.iter() {
            let decrypted: Vec<_> = o.result.iter().map(|r| decrypt_int_vector(&new, r).unwrap()).collect();
            assert_eq!(decrypted, rows);
            assert!(o.proof.as_ref().unwrap().verify(1.0, &Parallelism::default()));
        }

        let back = run(false, false, &joining.public_key(), &joining, &out[0].result).unwrap();
        let old = PrivateKey::from_exponent(old);
        for o in back.iter() {
            let decrypted: Vec<_> = o.result.iter().map(|r| decrypt_int_vector(&old, r).unwrap()).collect();
            assert_eq!(decrypted, rows);
            assert!(o.proof.is_none());
        }
    }

    #[test]
    fn a_change_with_another_key_is_caught() {
        let mut rng = thread_rng();
        let (pk, _, _) = generate_keys(2, &mut rng);
        let announced = PrivateKey::random(&mut rng).public_key();
        let other = PrivateKey::random(&mut rng);
        let target = vec![encrypt_int_vector(&pk, &[7, 8])];
        let r = run(true, true, &announced, &other, &target);
        assert!(matches!(r, Err(Error::BadProof("add/rm server", 0))));
    }
}
