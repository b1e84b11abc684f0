//! EmberKV Common - Shared types and utilities
//!
//! This crate provides the identifiers, seqno sentinels, error taxonomy and
//! configuration shared by the collections engine and its tooling.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
