//! Core type definitions for EmberKV
//!
//! Identifiers for collections, scopes and partitions, plus the seqno and
//! manifest-uid aliases used by the collections engine.

use derive_more::{From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-partition sequence number assigned to every mutation
pub type Seqno = i64;

/// Seqno sentinel meaning "open / not yet known"
///
/// Used for an entry's start seqno before its system event is assigned a
/// seqno, for the end seqno of every open collection, and for a manifest's
/// greatest end seqno while nothing is being deleted. Being negative, any
/// real seqno compares greater than it.
pub const COLLECTION_OPEN_SEQNO: Seqno = -6;

/// Identifier of a bucket-wide manifest epoch
pub type ManifestUid = u64;

/// Identifier of a collection
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, From, Into)]
pub struct CollectionId(u32);

impl CollectionId {
    /// The default collection, present in every bucket unless dropped
    pub const DEFAULT: Self = Self(0);
    /// Pseudo-collection tagging system event keys in the log
    pub const SYSTEM: Self = Self(1);

    /// Create from a raw value
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw value
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_default(self) -> bool {
        self.0 == Self::DEFAULT.0
    }

    #[must_use]
    pub const fn is_system(self) -> bool {
        self.0 == Self::SYSTEM.0
    }
}

impl fmt::Debug for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionId({:#x})", self.0)
    }
}

/// Displayed as lowercase hex, matching the manifest JSON encoding
impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Identifier of a scope
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, From, Into)]
pub struct ScopeId(u32);

impl ScopeId {
    /// The default scope
    pub const DEFAULT: Self = Self(0);

    /// Create from a raw value
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw value
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_default(self) -> bool {
        self.0 == Self::DEFAULT.0
    }
}

impl fmt::Debug for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeId({:#x})", self.0)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// A (scope, collection) pair identifying one collection and its owner
pub type ScopeCollectionPair = (ScopeId, CollectionId);

/// Identifier of a partition (vbucket)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, From, Into)]
pub struct Vbid(u16);

impl Vbid {
    /// Create from a raw value
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Get the raw value
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for Vbid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vbid({})", self.0)
    }
}

impl fmt::Display for Vbid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vb:{}", self.0)
    }
}
