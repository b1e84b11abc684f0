//! Bucket-level collections manager
//!
//! Accepts administrative manifest updates for a bucket and pushes them to
//! every active partition. Only one update runs at a time; a concurrent
//! caller is told to retry instead of waiting.

use crate::bucket_manifest::BucketManifest;
use crate::partition::{Bucket, Partition};
use crate::vbucket::Summary;
use emberkv_common::{Error, ManifestUid, Result};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Serializes collections manifest updates for one bucket
pub struct Manager {
    /// Last manifest accepted by [`Manager::update`]
    current: Mutex<Option<Arc<BucketManifest>>>,
    max_collections: usize,
}

impl Manager {
    #[must_use]
    pub fn new(max_collections: usize) -> Self {
        Self {
            current: Mutex::new(None),
            max_collections,
        }
    }

    /// Apply a JSON manifest to every active partition of `bucket`.
    ///
    /// Partitions are updated in order and the first failure stops the
    /// update. Partitions already updated keep the new manifest.
    pub fn update(&self, bucket: &dyn Bucket, json: &str) -> Result<()> {
        let Some(mut current) = self.current.try_lock() else {
            warn!(
                "Collections::Manager::update {} update already in progress",
                bucket.name()
            );
            return Err(Error::Busy);
        };

        let target = match BucketManifest::from_json(json, self.max_collections) {
            Ok(manifest) => Arc::new(manifest),
            Err(e) => {
                warn!(
                    "Collections::Manager::update {} rejected manifest: {}",
                    bucket.name(),
                    e
                );
                return Err(e);
            }
        };

        *current = Some(Arc::clone(&target));
        info!(
            "Collections::Manager::update {} applying manifest uid:{:x}",
            bucket.name(),
            target.uid()
        );

        for partition in bucket.partitions() {
            if !partition.is_active() {
                continue;
            }
            if let Err(e) = apply(partition, &target) {
                warn!(
                    "Collections::Manager::update {} aborted on {}: {}",
                    bucket.name(),
                    partition.vbid(),
                    e
                );
                return Err(Error::ApplyFailed {
                    vbid: partition.vbid(),
                    source: Box::new(e),
                });
            }
        }
        Ok(())
    }

    /// Bring one partition up to the current manifest, e.g. when it
    /// becomes active. Does nothing before the first update.
    pub fn update_partition(&self, partition: &dyn Partition) -> Result<()> {
        let current = self.current.lock().clone();
        match current {
            Some(target) => apply(partition, &target),
            None => Ok(()),
        }
    }

    /// JSON of the last accepted manifest
    pub fn get_manifest(&self) -> Result<String> {
        self.current
            .lock()
            .as_ref()
            .map(|manifest| manifest.to_json())
            .ok_or(Error::NoManifest)
    }

    #[must_use]
    pub fn current_uid(&self) -> Option<ManifestUid> {
        self.current.lock().as_ref().map(|manifest| manifest.uid())
    }

    /// Emit the current uid and per-collection item counts summed over
    /// every partition
    pub fn add_stats(&self, bucket: &dyn Bucket, add_stat: &mut dyn FnMut(&str, &str)) {
        if let Some(uid) = self.current_uid() {
            add_stat("manifest_uid", &format!("{uid:x}"));
        }

        let mut summary = Summary::new();
        for partition in bucket.partitions() {
            partition.manifest().lock().update_summary(&mut summary);
        }

        let mut counts: Vec<_> = summary.into_iter().collect();
        counts.sort();
        for (cid, items) in counts {
            add_stat(&format!("collection:{cid}:items"), &items.to_string());
        }
    }

    /// Log the manager and every partition's manifest
    pub fn log_all(&self, bucket: &dyn Bucket) {
        info!("{}", self);
        for partition in bucket.partitions() {
            info!("{}: {}", partition.vbid(), *partition.manifest().lock());
        }
    }
}

fn apply(partition: &dyn Partition, target: &BucketManifest) -> Result<()> {
    partition
        .manifest()
        .wlock()
        .update(partition.log(), target)
}

impl fmt::Display for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.current.try_lock() {
            Some(current) => match current.as_ref() {
                Some(manifest) => write!(f, "Collections::Manager current:{manifest}"),
                None => write!(f, "Collections::Manager current:none"),
            },
            None => write!(f, "Collections::Manager update in progress"),
        }
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("current_uid", &self.current_uid())
            .field("max_collections", &self.max_collections)
            .finish()
    }
}
