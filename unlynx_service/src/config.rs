//! Service configuration

use crate::Result;
use std::{
    fs,
    path::{Path, PathBuf},
};
use unlynx_protocols::config::ProtocolConfig;

/// Differential privacy noise settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffPrivacy {
    /// Whether noise is added to the results
    pub enabled: bool,
    /// Privacy budget
    pub epsilon: f64,
    /// Sensitivity of the query
    pub sensitivity: f64,
    /// Probability mass covered by one table entry
    pub quanta: f64,
    /// Bound on the noise magnitude, 0 for none
    pub limit: u64,
    /// Number of entries in the noise table
    pub count: usize,
}

impl Default for DiffPrivacy {
    fn default() -> Self {
        Self {
            enabled: false,
            epsilon: 1.0,
            sensitivity: 1.0,
            quanta: 0.1,
            limit: 0,
            count: 1000,
        }
    }
}

impl DiffPrivacy {
    /// Scale of the Laplace distribution
    pub fn scale(&self) -> f64 {
        self.sensitivity / self.epsilon
    }
}

/// Settings of one server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Protocol timeouts, parallelism and proof sampling
    pub protocol: ProtocolConfig,
    /// Noise settings
    pub diff_privacy: DiffPrivacy,
    /// File the shuffle precomputation is kept in
    pub precompute_file: PathBuf,
    /// Branching factor of the protocol trees
    pub branching: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            diff_privacy: DiffPrivacy::default(),
            precompute_file: PathBuf::from("pre_compute_multiplications.bin"),
            branching: 2,
        }
    }
}

impl ServiceConfig {
    /// Parses a configuration, missing fields taking their defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Reads a configuration file, or the defaults if there is no such file
    pub fn read(path: &Path) -> Result<Self> {
        if fs::metadata(path).is_err() {
            return Ok(Self::default());
        }
        let s = fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }
}
