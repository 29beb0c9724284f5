//! Checking a bundle of published proofs

use tracing::{info, warn};
use unlynx_curve::{
    parallel::Parallelism,
    zkp::{
        aggregation::PublishedAggregationListProof,
        det_tag::{PublishedDetTagAdditionListProof, PublishedDetTagCreationListProof},
        key_switch::PublishedKSListProof,
        shuffle::PublishedShufflingListProof,
    },
};

/// Published proofs of a survey, by kind
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofsToVerify {
    /// Key switching proofs
    pub key_switching: Vec<PublishedKSListProof>,
    /// Tagging step proofs
    pub det_tag_creation: Vec<PublishedDetTagCreationListProof>,
    /// Tagging addition proofs
    pub det_tag_addition: Vec<PublishedDetTagAdditionListProof>,
    /// Aggregation proofs
    pub aggregation: Vec<PublishedAggregationListProof>,
    /// Shuffle proofs
    pub shuffling: PublishedShufflingListProof,
}

impl ProofsToVerify {
    /// Checks every list, sampling `percent` of each, and returns one result
    /// per list: key switching, tagging steps, tagging additions, aggregation,
    /// then one for all shuffles
    pub fn verify(&self, percent: f64, par: &Parallelism) -> Vec<bool> {
        let mut results = Vec::new();
        results.extend(self.key_switching.iter().map(|p| p.verify(percent, par)));
        results.extend(self.det_tag_creation.iter().map(|p| p.verify(percent, par)));
        results.extend(self.det_tag_addition.iter().map(|p| p.verify(percent, par)));
        results.extend(self.aggregation.iter().map(|p| p.verify(percent, par)));
        results.push(self.shuffling.verify(percent, par));
        let failed = results.iter().filter(|ok| !**ok).count();
        if failed > 0 {
            warn!(failed, total = results.len(), "proof lists failed verification");
        } else {
            info!(total = results.len(), "all proof lists verified");
        }
        results
    }

    /// Whether every list verifies
    pub fn verify_all(&self, percent: f64, par: &Parallelism) -> bool {
        self.verify(percent, par).into_iter().all(|ok| ok)
    }
}
