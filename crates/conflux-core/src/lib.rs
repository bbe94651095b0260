//! Shared identifiers, error types and configuration used by every other
//! `conflux-*` crate — the one dependency all of them share.

pub mod config;
pub mod error;
pub mod types;

pub use error::{ConfluxError, Result};
