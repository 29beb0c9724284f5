#![warn(missing_docs)]
#![deny(clippy::correctness)]

//! UnLynx service: surveys over the data of a cothority of servers

#[macro_use]
extern crate nom;
#[macro_use]
extern crate serde_derive;

pub mod api;
pub mod config;
pub mod cothority;
pub mod logging;
pub mod messages;
pub mod predicate;
pub mod service;
pub mod store;
pub mod survey;

mod error;
pub use self::error::{Error, Result};
