//! Protocol configuration

use std::time::Duration;
use unlynx_curve::parallel::Parallelism;

/// Settings shared by every protocol instance of a run
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Bound on every blocking receive, in seconds
    pub timeout_secs: u64,
    /// Batch parallelism
    pub parallelism: Parallelism,
    /// Share of list proofs checked when verifying a peer's proofs
    pub verification_percent: f64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            parallelism: Parallelism::default(),
            verification_percent: 1.0,
        }
    }
}

impl ProtocolConfig {
    /// Bound on every blocking receive
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
