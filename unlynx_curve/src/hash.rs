//! Cryptographic hash functions

/// The hash function used for grouping keys
pub type Hash = sha3::Sha3_512;

/// The extended output function used to derive public weights
pub type Xof = sha3::Shake256;
