//! Per-vbucket collections manifest
//!
//! Tracks every collection a vbucket knows about, open or being deleted,
//! and answers "is this item visible" for items by seqno.
//!
//! # Lifecycle of a collection
//!
//! ```text
//!   add event (seqno a)        delete event (seqno d)       complete deletion
//! ─────────────────────► Open ─────────────────────► Deleting ─────────────► erased
//!   start = a, end = OPEN       end = d                       hard delete event
//! ```
//!
//! Every lifecycle change is queued into the vbucket's log as a system event
//! carrying a snapshot of the whole manifest (see [`crate::codec`]). The
//! snapshot is taken before the event has a seqno, so the changed entry is
//! written last and patched when the event is flushed.
//!
//! # Visibility
//!
//! An item at seqno `s` in collection `c` is logically deleted when `c` is
//! deleting and `s <= end(c)`. `greatest_end_seqno` is the largest end seqno
//! of all deleting collections, so any `s` above it needs no lookup.
//!
//! # Locking
//!
//! [`VbManifest`] owns the [`Manifest`] behind a reader/writer lock and only
//! hands it out through [`ReadHandle`], [`CachingReadHandle`] and
//! [`WriteHandle`].

mod handle;

pub use handle::{CachingReadHandle, ReadHandle, VbManifest, WriteHandle};

use crate::bucket_manifest::BucketManifest;
use crate::codec::{self, PatchField, PersistedEntry, PersistedManifest, PersistedState, SystemEventData};
use crate::doc_key::{DocKey, SystemEvent};
use crate::entry::ManifestEntry;
use crate::event::SystemEventItem;
use crate::log::SystemEventLog;
use emberkv_common::{
    COLLECTION_OPEN_SEQNO, CollectionId, Error, ManifestUid, Result, ScopeCollectionPair, ScopeId,
    Seqno, Vbid,
};
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

/// Bucket-wide per-collection item counts
pub type Summary = HashMap<CollectionId, u64>;

/// Collections known to one vbucket
#[derive(Debug)]
pub struct Manifest {
    /// Uid of the last bucket manifest applied
    manifest_uid: ManifestUid,
    map: HashMap<CollectionId, ManifestEntry>,
    /// Mirrors whether the default collection is open
    default_collection_exists: bool,
    /// Largest end seqno of all deleting collections, or OPEN if none
    greatest_end_seqno: Seqno,
    n_deleting_collections: usize,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

impl Manifest {
    /// Create the manifest of a brand new vbucket: only the default
    /// collection, open, with no known start seqno
    #[must_use]
    pub fn new() -> Self {
        let mut manifest = Self::empty();
        manifest.map.insert(
            CollectionId::DEFAULT,
            ManifestEntry::new(ScopeId::DEFAULT, COLLECTION_OPEN_SEQNO, COLLECTION_OPEN_SEQNO),
        );
        manifest.default_collection_exists = true;
        manifest
    }

    fn empty() -> Self {
        Self {
            manifest_uid: 0,
            map: HashMap::new(),
            default_collection_exists: false,
            greatest_end_seqno: COLLECTION_OPEN_SEQNO,
            n_deleting_collections: 0,
        }
    }

    /// Rebuild a manifest from its persisted snapshot.
    ///
    /// An empty buffer means nothing was ever persisted and yields
    /// [`Manifest::new`]. Any other buffer must decode cleanly.
    pub fn from_persisted(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self::new());
        }

        let state = codec::decode(data)?;
        let mut manifest = Self::empty();
        manifest.manifest_uid = state.manifest_uid;
        for entry in state.entries {
            if manifest
                .add_new_collection_entry(
                    (entry.scope_id, entry.collection_id),
                    entry.start_seqno,
                    entry.end_seqno,
                )
                .is_none()
            {
                return Err(Error::corrupt(format!(
                    "collection {} appears more than once",
                    entry.collection_id
                )));
            }
        }
        Ok(manifest)
    }

    /// Insert an entry for a collection not yet in the map.
    ///
    /// Returns `None` if the collection is already present.
    fn add_new_collection_entry(
        &mut self,
        identifiers: ScopeCollectionPair,
        start_seqno: Seqno,
        end_seqno: Seqno,
    ) -> Option<&mut ManifestEntry> {
        let (scope_id, cid) = identifiers;
        if self.map.contains_key(&cid) {
            return None;
        }

        let entry = ManifestEntry::new(scope_id, start_seqno, end_seqno);
        if cid.is_default() {
            self.default_collection_exists = entry.is_open();
        }
        // Restored from a snapshot mid-delete
        if entry.is_deleting() {
            self.track_end_seqno(end_seqno);
        }
        Some(self.map.entry(cid).or_insert(entry))
    }

    /// Apply a bucket manifest: delete collections it no longer has and
    /// add collections this vbucket does not know yet.
    ///
    /// Fails with [`Error::ConflictingDeletion`] without changing anything
    /// if the manifest names a collection still being deleted here. Only
    /// the final event queued carries `target.uid()`.
    pub fn update(&mut self, log: &dyn SystemEventLog, target: &BucketManifest) -> Result<()> {
        let (mut additions, mut deletions) = match self.process_manifest(target) {
            Ok(changes) => changes,
            Err(e) => {
                warn!("VB::Manifest::update cannot update {}: {}", log.vbid(), e);
                return Err(e);
            }
        };
        // Every snapshot must still fit the header count
        codec::entry_count(self.map.len() + additions.len())?;

        let final_deletion = deletions.pop();
        for identifiers in deletions {
            self.begin_collection_delete(log, self.manifest_uid, identifiers, None)?;
        }

        if let Some(identifiers) = final_deletion {
            let uid = if additions.is_empty() {
                target.uid()
            } else {
                self.manifest_uid
            };
            self.begin_collection_delete(log, uid, identifiers, None)?;
        }

        let final_addition = additions.pop();
        for identifiers in additions {
            self.add_collection(log, self.manifest_uid, identifiers, None)?;
        }

        if let Some(identifiers) = final_addition {
            self.add_collection(log, target.uid(), identifiers, None)?;
        }
        Ok(())
    }

    /// Diff against `target`, returning (additions, deletions) each sorted
    /// by collection id
    fn process_manifest(
        &self,
        target: &BucketManifest,
    ) -> Result<(Vec<ScopeCollectionPair>, Vec<ScopeCollectionPair>)> {
        let mut deletions: Vec<ScopeCollectionPair> = self
            .map
            .iter()
            .filter(|(cid, entry)| entry.is_open() && !target.contains_collection(**cid))
            .map(|(cid, entry)| (entry.scope_id(), *cid))
            .collect();

        let mut additions = Vec::new();
        for (sid, cid) in target.collections() {
            match self.map.get(&cid) {
                None => additions.push((sid, cid)),
                Some(entry) if entry.is_deleting() => {
                    warn!("Attempt to add a deleting collection:{}:{}", sid, cid);
                    return Err(Error::ConflictingDeletion { collection: cid });
                }
                Some(_) => {}
            }
        }

        deletions.sort_by_key(|(_, cid)| *cid);
        additions.sort_by_key(|(_, cid)| *cid);
        Ok((additions, deletions))
    }

    /// Add a collection and queue its creation event
    fn add_collection(
        &mut self,
        log: &dyn SystemEventLog,
        manifest_uid: ManifestUid,
        identifiers: ScopeCollectionPair,
        seqno: Option<Seqno>,
    ) -> Result<Seqno> {
        let (scope_id, cid) = identifiers;
        codec::entry_count(self.map.len() + 1)?;
        if self
            .add_new_collection_entry(identifiers, COLLECTION_OPEN_SEQNO, COLLECTION_OPEN_SEQNO)
            .is_none()
        {
            return Err(Error::ConflictingDeletion { collection: cid });
        }

        self.manifest_uid = manifest_uid;

        // The snapshot in the event is taken now and patched with the seqno
        // when the event is flushed
        let assigned =
            self.queue_system_event(log, SystemEvent::Collection, identifiers, false, seqno)?;

        info!(
            "collections: {} adding collection:{} to scope:{}, replica:{}, seqno:{}, manifest:{:x}",
            log.vbid(),
            cid,
            scope_id,
            seqno.is_some(),
            assigned,
            manifest_uid
        );

        self.get_manifest_entry_mut(cid)?.set_start_seqno(assigned);
        Ok(assigned)
    }

    /// Mark an open collection as deleting and queue its delete event
    fn begin_collection_delete(
        &mut self,
        log: &dyn SystemEventLog,
        manifest_uid: ManifestUid,
        identifiers: ScopeCollectionPair,
        seqno: Option<Seqno>,
    ) -> Result<Seqno> {
        let (scope_id, cid) = identifiers;
        let already_deleting = self.get_manifest_entry(cid)?.is_deleting();

        self.manifest_uid = manifest_uid;

        let assigned =
            self.queue_system_event(log, SystemEvent::Collection, identifiers, true, seqno)?;

        info!(
            "collections: {} begin delete of collection:{} from scope:{}, replica:{}, seqno:{}, manifest:{:x}",
            log.vbid(),
            cid,
            scope_id,
            seqno.is_some(),
            assigned,
            manifest_uid
        );

        if cid.is_default() {
            self.default_collection_exists = false;
        }

        self.get_manifest_entry_mut(cid)?.set_end_seqno(assigned);
        if already_deleting {
            // Re-opened collection deleted again: still one pending deletion
            self.greatest_end_seqno = self.greatest_end_seqno.max(assigned);
        } else {
            self.track_end_seqno(assigned);
        }
        Ok(assigned)
    }

    /// Add a collection on a replica, using the seqno the active assigned
    pub fn replica_add(
        &mut self,
        log: &dyn SystemEventLog,
        manifest_uid: ManifestUid,
        identifiers: ScopeCollectionPair,
        seqno: Seqno,
    ) -> Result<()> {
        self.add_collection(log, manifest_uid, identifiers, Some(seqno))
            .map(|_| ())
    }

    /// Begin deleting a collection on a replica, using the seqno the active
    /// assigned
    pub fn replica_begin_delete(
        &mut self,
        log: &dyn SystemEventLog,
        manifest_uid: ManifestUid,
        identifiers: ScopeCollectionPair,
        seqno: Seqno,
    ) -> Result<()> {
        self.begin_collection_delete(log, manifest_uid, identifiers, Some(seqno))
            .map(|_| ())
    }

    /// Finish deleting a collection once all of its items are purged.
    ///
    /// An exclusively deleting collection is erased and a hard delete event
    /// queued. A collection re-opened since the delete began stays, returns
    /// to plain open, and a soft delete event is queued. A collection that
    /// is not deleting fails with [`Error::UnknownCollection`] and nothing
    /// changes.
    pub fn complete_deletion(&mut self, log: &dyn SystemEventLog, cid: CollectionId) -> Result<()> {
        info!(
            "collections: {} complete delete of collection:{}",
            log.vbid(),
            cid
        );

        let entry = self
            .map
            .get_mut(&cid)
            .ok_or(Error::UnknownCollection { collection: cid })?;
        if !entry.is_deleting() {
            warn!(
                "collections: {} complete delete of collection:{} which is not deleting",
                log.vbid(),
                cid
            );
            return Err(Error::UnknownCollection { collection: cid });
        }
        let n_deleting = self
            .n_deleting_collections
            .checked_sub(1)
            .ok_or_else(|| Error::corrupt(format!("no deletion pending for collection {cid}")))?;

        let event = entry.complete_deletion();
        let scope_id = entry.scope_id();

        if event == SystemEvent::DeleteCollectionHard {
            self.map.remove(&cid);
        }

        self.n_deleting_collections = n_deleting;
        if self.n_deleting_collections == 0 {
            self.greatest_end_seqno = COLLECTION_OPEN_SEQNO;
        }

        self.queue_system_event(log, event, (scope_id, cid), false, None)?;
        Ok(())
    }

    fn track_end_seqno(&mut self, seqno: Seqno) {
        self.n_deleting_collections += 1;
        if seqno > self.greatest_end_seqno || self.greatest_end_seqno == COLLECTION_OPEN_SEQNO {
            self.greatest_end_seqno = seqno;
        }
    }

    /// Build the item for a system event, its value a snapshot of this
    /// manifest with `identifiers` written last
    fn create_system_event(
        &self,
        event: SystemEvent,
        identifiers: ScopeCollectionPair,
        deleted: bool,
    ) -> Result<SystemEventItem> {
        let value = codec::encode(self.manifest_uid, self.persisted_entries(), identifiers)?;
        Ok(SystemEventItem::new(event, identifiers.1, value, deleted))
    }

    /// Queue a system event. Events generated here (no explicit seqno) close
    /// the current persistence batch so they are not de-duplicated with
    /// later items.
    fn queue_system_event(
        &self,
        log: &dyn SystemEventLog,
        event: SystemEvent,
        identifiers: ScopeCollectionPair,
        deleted: bool,
        seqno: Option<Seqno>,
    ) -> Result<Seqno> {
        let item = self.create_system_event(event, identifiers, deleted)?;
        let assigned = log.queue_item(item, seqno);
        if seqno.is_none() {
            log.start_new_persistence_batch();
        }
        Ok(assigned)
    }

    /// Correct the snapshot carried by a flushed collection event with the
    /// event's seqno
    pub fn patch_serialised_data(item: &SystemEventItem) -> Result<PersistedManifest> {
        let event = SystemEvent::from_flags(item.flags()).ok_or_else(|| {
            Error::PatchFailed(format!("unknown system event flags {:#x}", item.flags()))
        })?;
        let field = match event {
            SystemEvent::Collection if item.is_deleted() => PatchField::EndSeqno(item.by_seqno()),
            SystemEvent::Collection => PatchField::StartSeqno(item.by_seqno()),
            SystemEvent::DeleteCollectionHard => PatchField::DropLastEntry,
            SystemEvent::DeleteCollectionSoft => return Ok(item.value().clone()),
        };
        codec::patch(item.value().clone(), field)
    }

    /// Uid and collection identity carried by a collection event's snapshot
    pub fn system_event_data(serialised: &[u8]) -> Result<SystemEventData> {
        codec::system_event_data(serialised)
    }

    /// Entries in collection id order, for encoding
    fn persisted_entries(&self) -> Vec<PersistedEntry> {
        let mut entries: Vec<PersistedEntry> = self
            .map
            .iter()
            .map(|(cid, entry)| PersistedEntry {
                scope_id: entry.scope_id(),
                collection_id: *cid,
                start_seqno: entry.start_seqno(),
                end_seqno: entry.end_seqno(),
            })
            .collect();
        entries.sort_by_key(|e| e.collection_id);
        entries
    }

    /// Current state as a decoded snapshot
    #[must_use]
    pub fn to_persisted_state(&self) -> PersistedState {
        PersistedState {
            manifest_uid: self.manifest_uid,
            entries: self.persisted_entries(),
        }
    }

    /// Encode the current state with every entry live
    pub fn to_persisted(&self) -> Result<PersistedManifest> {
        codec::encode_state(&self.to_persisted_state())
    }

    // ---- Queries ----

    /// True if the key's collection exists and is open
    #[must_use]
    pub fn does_key_contain_valid_collection(&self, key: &DocKey) -> bool {
        if self.default_collection_exists && key.collection_id().is_default() {
            return true;
        }
        self.map
            .get(&key.collection_id())
            .is_some_and(ManifestEntry::is_open)
    }

    /// True if the key's collection exists and belongs to `scope_id`
    #[must_use]
    pub fn does_key_belong_to_scope(&self, key: &DocKey, scope_id: ScopeId) -> bool {
        self.map
            .get(&key.collection_id())
            .is_some_and(|entry| entry.scope_id() == scope_id)
    }

    /// Find the entry a key resolves to.
    ///
    /// With `allow_system`, system event keys resolve to the collection
    /// embedded in the key; otherwise they resolve to nothing.
    pub fn get_manifest_entry_for_key(
        &self,
        key: &DocKey,
        allow_system: bool,
    ) -> Result<Option<(CollectionId, &ManifestEntry)>> {
        let lookup = if allow_system {
            key.lookup_collection_id()?
        } else {
            key.collection_id()
        };
        Ok(self.map.get_key_value(&lookup).map(|(cid, e)| (*cid, e)))
    }

    /// True if an item of `key` at `seqno` belongs to a deleted collection
    /// generation and must be treated as gone
    pub fn is_logically_deleted(&self, key: &DocKey, seqno: Seqno) -> Result<bool> {
        // Nothing above the highest delete boundary is hidden
        if seqno > self.greatest_end_seqno {
            return Ok(false);
        }
        if key.collection_id().is_default() {
            return Ok(!self.default_collection_exists);
        }
        let lookup = key.lookup_collection_id()?;
        Ok(self
            .map
            .get(&lookup)
            .is_some_and(|entry| seqno <= entry.end_seqno()))
    }

    /// [`Manifest::is_logically_deleted`] against an already resolved entry.
    ///
    /// Fails with [`Error::InvalidIterator`] if nothing was resolved.
    pub fn is_logically_deleted_entry(
        &self,
        entry: Option<&ManifestEntry>,
        seqno: Seqno,
    ) -> Result<bool> {
        let entry = entry.ok_or(Error::InvalidIterator { seqno })?;
        Ok(seqno <= self.greatest_end_seqno && seqno <= entry.end_seqno())
    }

    /// The collection whose deletion should complete, if `key` is the
    /// system event of a deleting collection
    #[must_use]
    pub fn should_complete_deletion(
        &self,
        key: &DocKey,
        _seqno: Seqno,
        entry: Option<(CollectionId, &ManifestEntry)>,
    ) -> Option<CollectionId> {
        if !key.is_system_event() {
            return None;
        }
        entry
            .filter(|(_, entry)| entry.is_deleting())
            .map(|(cid, _)| cid)
    }

    fn get_manifest_entry(&self, cid: CollectionId) -> Result<&ManifestEntry> {
        self.map
            .get(&cid)
            .ok_or(Error::UnknownCollection { collection: cid })
    }

    fn get_manifest_entry_mut(&mut self, cid: CollectionId) -> Result<&mut ManifestEntry> {
        self.map
            .get_mut(&cid)
            .ok_or(Error::UnknownCollection { collection: cid })
    }

    /// Entry for a collection, if known
    #[must_use]
    pub fn entry(&self, cid: CollectionId) -> Option<&ManifestEntry> {
        self.map.get(&cid)
    }

    /// Entries in arbitrary order
    pub fn entries(&self) -> impl Iterator<Item = (CollectionId, &ManifestEntry)> {
        self.map.iter().map(|(cid, entry)| (*cid, entry))
    }

    #[must_use]
    pub fn exists(&self, cid: CollectionId) -> bool {
        self.map.contains_key(&cid)
    }

    /// Items stored for a collection
    pub fn get_item_count(&self, cid: CollectionId) -> Result<u64> {
        Ok(self.get_manifest_entry(cid)?.disk_count())
    }

    #[must_use]
    pub const fn manifest_uid(&self) -> ManifestUid {
        self.manifest_uid
    }

    #[must_use]
    pub const fn greatest_end_seqno(&self) -> Seqno {
        self.greatest_end_seqno
    }

    #[must_use]
    pub const fn n_deleting_collections(&self) -> usize {
        self.n_deleting_collections
    }

    #[must_use]
    pub const fn default_collection_exists(&self) -> bool {
        self.default_collection_exists
    }

    /// Number of entries, open and deleting
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Emit per-vbucket stats
    pub fn add_stats(&self, vbid: Vbid, add_stat: &mut dyn FnMut(&str, &str)) {
        let id = vbid.get();
        add_stat(&format!("vb_{id}:manifest:entries"), &self.map.len().to_string());
        add_stat(
            &format!("vb_{id}:manifest:default_exists"),
            if self.default_collection_exists {
                "true"
            } else {
                "false"
            },
        );
        add_stat(
            &format!("vb_{id}:manifest:greatest_end"),
            &self.greatest_end_seqno.to_string(),
        );
        add_stat(
            &format!("vb_{id}:manifest:n_deleting"),
            &self.n_deleting_collections.to_string(),
        );

        let mut cids: Vec<_> = self.map.keys().copied().collect();
        cids.sort();
        for cid in cids {
            if let Some(entry) = self.map.get(&cid) {
                entry.add_stats(&format!("vb_{id}:collection:{cid}:entry"), add_stat);
            }
        }
    }

    /// Accumulate this vbucket's item counts into `summary`
    pub fn update_summary(&self, summary: &mut Summary) {
        for (cid, entry) in &self.map {
            *summary.entry(*cid).or_insert(0) += entry.disk_count();
        }
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "VB::Manifest: uid:{:x}, defaultCollectionExists:{}, greatestEndSeqno:{}, nDeletingCollections:{}, map.size:{}",
            self.manifest_uid,
            self.default_collection_exists,
            self.greatest_end_seqno,
            self.n_deleting_collections,
            self.map.len()
        )?;
        let mut cids: Vec<_> = self.map.keys().copied().collect();
        cids.sort();
        for cid in cids {
            if let Some(entry) = self.map.get(&cid) {
                writeln!(f, "cid:{cid}:{entry}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
