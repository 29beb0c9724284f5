#![allow(clippy::many_single_char_names)]
#![warn(missing_docs)]
#![deny(clippy::correctness)]

//! UnLynx cryptographic tools

#[macro_use]
extern crate serde_derive;

mod hash;
pub use self::hash::*;
pub mod add_rm;
pub mod aggregation;
pub mod cipher;
pub mod commit;
pub mod det_tag;
pub mod diff_privacy;
pub mod key_switch;
pub mod keys;
pub mod map;
pub mod parallel;
pub mod perm;
pub mod responses;
pub mod shuffle;
pub mod zkp;

mod error;
pub use self::error::{Error, Result};
