#![warn(missing_docs)]
#![deny(clippy::correctness)]

//! UnLynx distributed protocols
//!
//! Every protocol runs one instance per node of a tree of servers. Instances
//! exchange typed messages over per-instance channels; see [`transport`].

#[macro_use]
extern crate serde_derive;

pub mod add_rm_server;
pub mod collective_aggregation;
pub mod config;
pub mod deterministic_tagging;
pub mod dro;
pub mod key_switching;
pub mod proofs_verification;
pub mod shuffling;
pub mod shuffling_ddt;
pub mod transport;
pub mod tree;

mod error;
pub use self::error::{Error, Result};
