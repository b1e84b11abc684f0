//! Partitions and buckets
//!
//! The [`Manager`](crate::Manager) only needs to find each partition's
//! manifest and log. [`MemoryPartition`] and [`MemoryBucket`] are the
//! in-memory implementations used by the tooling and tests.

use crate::doc_key::DocKey;
use crate::log::{InMemoryLog, LoggedItem, SystemEventLog};
use crate::vbucket::{Manifest, VbManifest};
use emberkv_common::config::BucketConfig;
use emberkv_common::{CollectionId, Error, Result, Seqno, Vbid};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// A vbucket as seen by the collections engine
pub trait Partition: Send + Sync {
    fn vbid(&self) -> Vbid;

    /// Only active partitions generate collection events from a bucket
    /// manifest; replicas receive them from their active
    fn is_active(&self) -> bool;

    fn manifest(&self) -> &VbManifest;

    fn log(&self) -> &dyn SystemEventLog;
}

/// A set of partitions sharing one bucket manifest
pub trait Bucket: Send + Sync {
    fn name(&self) -> &str;

    fn partitions(&self) -> Vec<&dyn Partition>;
}

/// Result of one deletion sweep
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Flushed items dropped because their collection is gone
    pub purged: usize,
    /// Collections whose deletion was completed
    pub completed: Vec<CollectionId>,
}

/// In-memory partition
#[derive(Debug)]
pub struct MemoryPartition {
    vbid: Vbid,
    active: AtomicBool,
    manifest: VbManifest,
    log: InMemoryLog,
}

impl MemoryPartition {
    /// Create an active partition with a fresh manifest
    #[must_use]
    pub fn new(vbid: Vbid) -> Self {
        Self {
            vbid,
            active: AtomicBool::new(true),
            manifest: VbManifest::new(Manifest::new()),
            log: InMemoryLog::new(vbid),
        }
    }

    /// Rebuild a partition from its persisted manifest, continuing the log
    /// after `high_seqno`
    pub fn warmup(vbid: Vbid, persisted: &[u8], high_seqno: Seqno) -> Result<Self> {
        let manifest = Manifest::from_persisted(persisted)?;
        info!(
            "{} warmup manifest uid:{:x} with {} collections",
            vbid,
            manifest.manifest_uid(),
            manifest.len()
        );
        Ok(Self {
            vbid,
            active: AtomicBool::new(true),
            manifest: VbManifest::new(manifest),
            log: InMemoryLog::with_high_seqno(vbid, high_seqno),
        })
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    #[must_use]
    pub const fn memory_log(&self) -> &InMemoryLog {
        &self.log
    }

    /// Store a document.
    ///
    /// The read lock is held while the mutation is queued so the collection
    /// cannot begin deletion underneath the write.
    pub fn set(&self, key: DocKey) -> Result<Seqno> {
        let handle = self.manifest.lock();
        let cached = handle.for_key(&key)?;
        if !cached.valid() {
            return Err(Error::UnknownCollection {
                collection: key.collection_id(),
            });
        }
        cached.increment_disk_count();
        Ok(self.log.queue_mutation(key))
    }

    /// True if an item stored at `seqno` under `key` is still visible
    pub fn is_visible(&self, key: &DocKey, seqno: Seqno) -> Result<bool> {
        let handle = self.manifest.lock();
        Ok(handle.does_key_contain_valid_collection(key)
            && !handle.is_logically_deleted(key, seqno)?)
    }

    /// Flush the log, purge items of deleted collections and complete
    /// every deletion whose items are all gone
    pub fn run_deletion_sweep(&self) -> Result<SweepOutcome> {
        self.log.flush()?;
        let flushed = self.log.flushed_items();

        let mut purge = HashSet::new();
        let mut completed = Vec::new();
        {
            let handle = self.manifest.lock();
            for item in &flushed {
                let cached = handle.for_key(item.key())?;
                match item {
                    LoggedItem::Mutation { seqno, .. } => {
                        let dropped = match cached.entry() {
                            Some(_) => cached.is_logically_deleted(*seqno)?,
                            None => true,
                        };
                        if dropped {
                            cached.decrement_disk_count();
                            purge.insert(*seqno);
                        }
                    }
                    LoggedItem::SystemEvent(event) => {
                        if let Some(cid) = cached.should_complete_deletion(event.by_seqno()) {
                            purge.insert(event.by_seqno());
                            completed.push(cid);
                        }
                    }
                }
            }
        }

        let purged = self.log.purge(&purge);
        completed.sort();
        completed.dedup();
        for cid in &completed {
            self.manifest.wlock().complete_deletion(&self.log, *cid)?;
        }

        debug!(
            "{} deletion sweep purged {} items, completed {} deletions",
            self.vbid,
            purged,
            completed.len()
        );
        Ok(SweepOutcome { purged, completed })
    }
}

impl Partition for MemoryPartition {
    fn vbid(&self) -> Vbid {
        self.vbid
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn manifest(&self) -> &VbManifest {
        &self.manifest
    }

    fn log(&self) -> &dyn SystemEventLog {
        &self.log
    }
}

/// In-memory bucket holding a fixed set of partitions
#[derive(Debug)]
pub struct MemoryBucket {
    name: String,
    partitions: Vec<MemoryPartition>,
}

impl MemoryBucket {
    /// Create a bucket with `num_vbuckets` active partitions
    #[must_use]
    pub fn new(name: impl Into<String>, num_vbuckets: u16) -> Self {
        Self {
            name: name.into(),
            partitions: (0..num_vbuckets)
                .map(|id| MemoryPartition::new(Vbid::new(id)))
                .collect(),
        }
    }

    #[must_use]
    pub fn from_config(config: &BucketConfig) -> Self {
        Self::new(config.name.clone(), config.num_vbuckets)
    }

    #[must_use]
    pub fn partition(&self, vbid: Vbid) -> Option<&MemoryPartition> {
        self.partitions.get(usize::from(vbid.get()))
    }

    pub fn memory_partitions(&self) -> impl Iterator<Item = &MemoryPartition> {
        self.partitions.iter()
    }
}

impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn partitions(&self) -> Vec<&dyn Partition> {
        self.partitions
            .iter()
            .map(|partition| partition as &dyn Partition)
            .collect()
    }
}
