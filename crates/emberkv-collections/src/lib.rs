//! EmberKV Collections - Per-vbucket collections manifest engine
//!
//! This crate tracks which collections each vbucket holds and drives their
//! lifecycle:
//! - Persisted manifest format with in-place seqno patching
//! - Per-vbucket manifest with lock-scoped read and write handles
//! - Collection system events queued into the vbucket log
//! - Item visibility against deleted collection generations
//! - Bucket-level manager applying administrative manifests

pub mod bucket_manifest;
pub mod codec;
pub mod doc_key;
pub mod entry;
pub mod event;
pub mod log;
pub mod manager;
pub mod partition;
pub mod vbucket;

// Re-exports
pub use bucket_manifest::{BucketManifest, CollectionInfo, Scope};
pub use codec::{PatchField, PersistedEntry, PersistedManifest, PersistedState, SystemEventData};
pub use doc_key::{DocKey, SystemEvent};
pub use entry::ManifestEntry;
pub use event::SystemEventItem;
pub use log::{FlushOutcome, InMemoryLog, LoggedItem, SystemEventLog};
pub use manager::Manager;
pub use partition::{Bucket, MemoryBucket, MemoryPartition, Partition, SweepOutcome};
pub use vbucket::{CachingReadHandle, Manifest, ReadHandle, Summary, VbManifest, WriteHandle};
