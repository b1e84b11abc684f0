//! Configuration types for EmberKV
//!
//! This module defines configuration structures used by the collections
//! engine and its tooling. Every section falls back to its defaults when
//! omitted from a configuration file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Root configuration for EmberKV
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Bucket configuration
    #[serde(default)]
    pub bucket: BucketConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Check the configuration for values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        self.bucket.validate()
    }
}

/// Bucket-level configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Bucket name
    #[serde(default = "default_bucket_name")]
    pub name: String,
    /// Number of partitions (vbuckets) in the bucket
    #[serde(default = "default_num_vbuckets")]
    pub num_vbuckets: u16,
    /// Upper bound on collections accepted in one manifest
    #[serde(default = "default_max_collections")]
    pub max_collections: usize,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            name: default_bucket_name(),
            num_vbuckets: default_num_vbuckets(),
            max_collections: default_max_collections(),
        }
    }
}

impl BucketConfig {
    fn validate(&self) -> Result<()> {
        if self.num_vbuckets == 0 {
            return Err(Error::Configuration(
                "bucket.num_vbuckets must be at least 1".into(),
            ));
        }
        if self.max_collections == 0 {
            return Err(Error::Configuration(
                "bucket.max_collections must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_bucket_name() -> String {
    "default".to_string()
}

fn default_num_vbuckets() -> u16 {
    4
}

fn default_max_collections() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}
