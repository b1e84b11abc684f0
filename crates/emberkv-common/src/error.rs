//! Error types for EmberKV
//!
//! This module defines the error taxonomy of the collections engine.

use crate::types::{CollectionId, Seqno, Vbid};
use thiserror::Error;

/// Common result type for EmberKV operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for EmberKV
#[derive(Debug, Error)]
pub enum Error {
    // Persistence errors
    #[error("corrupt persisted manifest: {0}")]
    CorruptManifest(String),

    #[error("persisted manifest patch failed: {0}")]
    PatchFailed(String),

    // Manifest state errors
    #[error("collection {collection} is still being deleted and cannot be added")]
    ConflictingDeletion { collection: CollectionId },

    #[error("unknown collection: {collection}")]
    UnknownCollection { collection: CollectionId },

    #[error("system event key carries a collection id of {len} bytes, expected 4")]
    MalformedSystemKey { len: usize },

    #[error("no manifest entry resolved for lookup at seqno {seqno}")]
    InvalidIterator { seqno: Seqno },

    // Administrative errors
    #[error("collections manifest update already in progress")]
    Busy,

    #[error("invalid collections manifest: {0}")]
    InvalidManifest(String),

    #[error("failed to apply collections manifest to {vbid}: {source}")]
    ApplyFailed {
        vbid: Vbid,
        #[source]
        source: Box<Error>,
    },

    #[error("no collections manifest has been set")]
    NoManifest,

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a corrupt manifest error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptManifest(msg.into())
    }

    /// Create an invalid manifest error
    pub fn invalid_manifest(msg: impl Into<String>) -> Self {
        Self::InvalidManifest(msg.into())
    }

    /// Check if the caller may retry the same request later
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy)
    }

    /// Check if this error signals a broken internal invariant.
    ///
    /// Fatal errors must abort the operation; the partition state can no
    /// longer be trusted to continue.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::CorruptManifest(_) | Self::UnknownCollection { .. } | Self::PatchFailed(_) => {
                true
            }
            Self::ApplyFailed { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// Get the engine status name reported to the client connection
    #[must_use]
    pub fn engine_status(&self) -> &'static str {
        match self {
            Self::Busy => "temporary_failure",
            Self::InvalidManifest(_) | Self::MalformedSystemKey { .. } => "invalid_arguments",
            Self::ApplyFailed { .. } | Self::ConflictingDeletion { .. } => {
                "cannot_apply_collections_manifest"
            }
            Self::UnknownCollection { .. } => "unknown_collection",
            Self::NoManifest => "no_collections_manifest",
            Self::CorruptManifest(_)
            | Self::PatchFailed(_)
            | Self::InvalidIterator { .. }
            | Self::Configuration(_)
            | Self::Io(_) => "failed",
        }
    }
}
