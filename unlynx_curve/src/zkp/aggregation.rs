//! Publicly checkable aggregation results
//!
//! Aggregation involves no secret, so the proof is the data itself: anyone can
//! recompute the homomorphic sum and compare it with the published result.

use crate::{
    cipher::{CipherText, CipherVector},
    parallel::Parallelism,
};

/// A column of ciphertexts and the claimed sum
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedAggregationProof {
    /// Aggregated values
    pub data: CipherVector,
    /// Claimed sum
    pub aggregation_result: CipherText,
}

/// A list of aggregation proofs
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedAggregationListProof {
    /// One proof per aggregated column
    pub list: Vec<PublishedAggregationProof>,
}

impl PublishedAggregationProof {
    /// Publishes an aggregation
    pub fn create(data: CipherVector, aggregation_result: CipherText) -> Self {
        Self {
            data,
            aggregation_result,
        }
    }

    /// Recomputes the sum and compares it field by field
    pub fn verify(&self) -> bool {
        if self.data.is_empty() {
            return false;
        }
        let expected: CipherText = self.data.iter().sum();
        expected.k == self.aggregation_result.k && expected.c == self.aggregation_result.c
    }
}

impl PublishedAggregationListProof {
    /// Publishes a list of aggregations
    pub fn create(data: Vec<CipherVector>, results: Vec<CipherText>) -> Self {
        let list = data
            .into_iter()
            .zip(results.into_iter())
            .map(|(d, r)| PublishedAggregationProof::create(d, r))
            .collect();
        Self { list }
    }

    /// Appends the proofs of another list
    pub fn extend(&mut self, other: PublishedAggregationListProof) {
        self.list.extend(other.list);
    }

    /// Verifies a sample of `percent` of the proofs
    pub fn verify(&self, percent: f64, par: &Parallelism) -> bool {
        super::verify_list(&self.list, percent, par, PublishedAggregationProof::verify)
    }
}
