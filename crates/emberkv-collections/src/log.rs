//! Vbucket mutation log
//!
//! The collections engine only needs two things from the log that holds a
//! vbucket's mutations: queue an item and learn its seqno, and close the
//! current persistence batch. [`SystemEventLog`] is that seam.
//!
//! [`InMemoryLog`] is a simple implementation used by the in-memory
//! partitions:
//! - Sequential seqno assignment, or explicit seqnos replayed from a peer
//! - Open batch plus closed batches awaiting flush
//! - Flush patches each collection event's manifest snapshot and keeps the
//!   newest one as the vbucket's persisted manifest
//! - Flushed items are keyed like a disk store: a system event replaces any
//!   earlier event with the same key

use crate::codec::PersistedManifest;
use crate::doc_key::DocKey;
use crate::event::SystemEventItem;
use crate::vbucket::Manifest;
use emberkv_common::{Result, Seqno, Vbid};
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::debug;

/// The log a vbucket's collection system events are queued into
pub trait SystemEventLog: Send + Sync {
    /// The vbucket this log belongs to
    fn vbid(&self) -> Vbid;

    /// Queue a system event and return its seqno.
    ///
    /// `seqno` is set when replaying an event received from a peer;
    /// otherwise the log assigns the next seqno.
    fn queue_item(&self, item: SystemEventItem, seqno: Option<Seqno>) -> Seqno;

    /// Close the current persistence batch so later items start a new one
    fn start_new_persistence_batch(&self);
}

/// An item held by the in-memory log
#[derive(Clone, Debug)]
pub enum LoggedItem {
    /// An ordinary document mutation
    Mutation { key: DocKey, seqno: Seqno },
    /// A collection lifecycle event
    SystemEvent(SystemEventItem),
}

impl LoggedItem {
    #[must_use]
    pub const fn key(&self) -> &DocKey {
        match self {
            Self::Mutation { key, .. } => key,
            Self::SystemEvent(item) => item.key(),
        }
    }

    #[must_use]
    pub const fn seqno(&self) -> Seqno {
        match self {
            Self::Mutation { seqno, .. } => *seqno,
            Self::SystemEvent(item) => item.by_seqno(),
        }
    }

    #[must_use]
    pub const fn is_system_event(&self) -> bool {
        matches!(self, Self::SystemEvent(_))
    }
}

/// Result of flushing the in-memory log
#[derive(Clone, Debug, Default)]
pub struct FlushOutcome {
    /// Items moved to the flushed set
    pub items: usize,
    /// Batches flushed
    pub batches: usize,
    /// Newest manifest snapshot written, if any collection event was flushed
    pub manifest: Option<PersistedManifest>,
}

#[derive(Debug)]
struct LogState {
    high_seqno: Seqno,
    /// Closed batches followed by the open batch (never empty)
    batches: Vec<Vec<LoggedItem>>,
    /// Flushed items in seqno order
    flushed: Vec<LoggedItem>,
    persisted_manifest: Option<PersistedManifest>,
}

/// Mutex-guarded in-memory mutation log for one vbucket
#[derive(Debug)]
pub struct InMemoryLog {
    vbid: Vbid,
    state: Mutex<LogState>,
}

impl InMemoryLog {
    /// Create an empty log
    #[must_use]
    pub fn new(vbid: Vbid) -> Self {
        Self::with_high_seqno(vbid, 0)
    }

    /// Create a log continuing after `high_seqno`
    #[must_use]
    pub fn with_high_seqno(vbid: Vbid, high_seqno: Seqno) -> Self {
        Self {
            vbid,
            state: Mutex::new(LogState {
                high_seqno,
                batches: vec![Vec::new()],
                flushed: Vec::new(),
                persisted_manifest: None,
            }),
        }
    }

    /// Queue a document mutation and return its seqno
    pub fn queue_mutation(&self, key: DocKey) -> Seqno {
        let mut state = self.state.lock();
        state.high_seqno += 1;
        let seqno = state.high_seqno;
        push_open(&mut state, LoggedItem::Mutation { key, seqno });
        seqno
    }

    #[must_use]
    pub fn high_seqno(&self) -> Seqno {
        self.state.lock().high_seqno
    }

    /// Snapshot of unflushed items grouped by persistence batch
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<LoggedItem>> {
        self.state
            .lock()
            .batches
            .iter()
            .filter(|batch| !batch.is_empty())
            .cloned()
            .collect()
    }

    /// Snapshot of every unflushed item in seqno order
    #[must_use]
    pub fn pending_items(&self) -> Vec<LoggedItem> {
        self.state.lock().batches.iter().flatten().cloned().collect()
    }

    /// Snapshot of flushed items in seqno order
    #[must_use]
    pub fn flushed_items(&self) -> Vec<LoggedItem> {
        self.state.lock().flushed.clone()
    }

    /// The manifest snapshot written by the most recent flush of a collection event
    #[must_use]
    pub fn persisted_manifest(&self) -> Option<PersistedManifest> {
        self.state.lock().persisted_manifest.clone()
    }

    /// Flush every pending batch.
    ///
    /// Each collection event's snapshot is patched with the event's seqno
    /// on the way out. A patch failure aborts the flush and leaves the
    /// unflushed batches in place.
    pub fn flush(&self) -> Result<FlushOutcome> {
        let mut state = self.state.lock();

        let mut patched = Vec::new();
        for item in state.batches.iter().flatten() {
            if let LoggedItem::SystemEvent(event) = item {
                patched.push(Manifest::patch_serialised_data(event)?);
            }
        }

        let batches: Vec<Vec<LoggedItem>> = std::mem::replace(&mut state.batches, vec![Vec::new()])
            .into_iter()
            .filter(|batch| !batch.is_empty())
            .collect();

        let mut outcome = FlushOutcome {
            batches: batches.len(),
            ..FlushOutcome::default()
        };
        for item in batches.into_iter().flatten() {
            if item.is_system_event() {
                state.flushed.retain(|existing| existing.key() != item.key());
            }
            state.flushed.push(item);
            outcome.items += 1;
        }

        if let Some(manifest) = patched.pop() {
            state.persisted_manifest = Some(manifest.clone());
            outcome.manifest = Some(manifest);
        }

        debug!(
            "{} flushed {} items in {} batches",
            self.vbid, outcome.items, outcome.batches
        );
        Ok(outcome)
    }

    /// Drop flushed items with the given seqnos
    pub fn purge(&self, seqnos: &HashSet<Seqno>) -> usize {
        let mut state = self.state.lock();
        let before = state.flushed.len();
        state.flushed.retain(|item| !seqnos.contains(&item.seqno()));
        before - state.flushed.len()
    }
}

fn push_open(state: &mut LogState, item: LoggedItem) {
    if let Some(open) = state.batches.last_mut() {
        open.push(item);
    } else {
        state.batches.push(vec![item]);
    }
}

impl SystemEventLog for InMemoryLog {
    fn vbid(&self) -> Vbid {
        self.vbid
    }

    fn queue_item(&self, mut item: SystemEventItem, seqno: Option<Seqno>) -> Seqno {
        let mut state = self.state.lock();
        let seqno = seqno.unwrap_or(state.high_seqno + 1);
        state.high_seqno = state.high_seqno.max(seqno);
        item.set_by_seqno(seqno);
        push_open(&mut state, LoggedItem::SystemEvent(item));
        seqno
    }

    fn start_new_persistence_batch(&self) {
        let mut state = self.state.lock();
        if state.batches.last().is_some_and(|open| !open.is_empty()) {
            state.batches.push(Vec::new());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{self, PersistedEntry};
    use crate::doc_key::SystemEvent;
    use emberkv_common::{COLLECTION_OPEN_SEQNO, CollectionId, ScopeId};

    fn collection_event(cid: u32, deleted: bool) -> SystemEventItem {
        let identifiers = (ScopeId::DEFAULT, CollectionId::new(cid));
        let value = codec::encode(1, Vec::<PersistedEntry>::new(), identifiers).unwrap();
        SystemEventItem::new(SystemEvent::Collection, identifiers.1, value, deleted)
    }

    #[test]
    fn test_seqno_assignment() {
        let log = InMemoryLog::new(Vbid::new(0));
        assert_eq!(log.queue_mutation(DocKey::in_default("a")), 1);
        assert_eq!(log.queue_item(collection_event(8, false), None), 2);
        assert_eq!(log.queue_mutation(DocKey::in_default("b")), 3);
        assert_eq!(log.high_seqno(), 3);
    }

    #[test]
    fn test_explicit_seqno() {
        let log = InMemoryLog::with_high_seqno(Vbid::new(1), 10);
        assert_eq!(log.queue_item(collection_event(8, false), Some(15)), 15);
        assert_eq!(log.queue_mutation(DocKey::in_default("a")), 16);
    }

    #[test]
    fn test_batches() {
        let log = InMemoryLog::new(Vbid::new(0));
        log.start_new_persistence_batch();
        assert!(log.batches().is_empty());

        log.queue_mutation(DocKey::in_default("a"));
        log.queue_item(collection_event(8, false), None);
        log.start_new_persistence_batch();
        log.queue_mutation(DocKey::in_default("b"));

        let batches = log.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert!(batches[0][1].is_system_event());
        assert_eq!(batches[1][0].seqno(), 3);
    }

    #[test]
    fn test_flush_patches_snapshot() {
        let log = InMemoryLog::new(Vbid::new(0));
        log.queue_mutation(DocKey::in_default("a"));
        log.queue_item(collection_event(8, false), None);
        log.start_new_persistence_batch();

        let outcome = log.flush().unwrap();
        assert_eq!(outcome.items, 2);
        assert_eq!(outcome.batches, 1);

        let manifest = outcome.manifest.unwrap();
        let state = codec::decode(manifest.as_bytes()).unwrap();
        assert_eq!(state.entries[0].collection_id, CollectionId::new(8));
        assert_eq!(state.entries[0].start_seqno, 2);
        assert_eq!(state.entries[0].end_seqno, COLLECTION_OPEN_SEQNO);
        assert_eq!(log.persisted_manifest(), Some(manifest));
        assert!(log.pending_items().is_empty());
    }

    #[test]
    fn test_flushed_events_supersede_by_key() {
        let log = InMemoryLog::new(Vbid::new(0));
        log.queue_item(collection_event(8, false), None);
        log.queue_item(collection_event(8, true), None);
        log.flush().unwrap();

        let flushed = log.flushed_items();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].seqno(), 2);
    }

    #[test]
    fn test_purge() {
        let log = InMemoryLog::new(Vbid::new(0));
        log.queue_mutation(DocKey::in_default("a"));
        log.queue_mutation(DocKey::in_default("b"));
        log.flush().unwrap();

        let removed = log.purge(&HashSet::from([1]));
        assert_eq!(removed, 1);
        assert_eq!(log.flushed_items()[0].seqno(), 2);
    }
}
