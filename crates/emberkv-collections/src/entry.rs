//! Per-collection manifest entry

use crate::doc_key::SystemEvent;
use emberkv_common::{COLLECTION_OPEN_SEQNO, ScopeId, Seqno};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// One collection known to a vbucket, open or mid-deletion.
///
/// The state is derived from the seqnos: an entry is open while its end
/// seqno is [`COLLECTION_OPEN_SEQNO`] and deleting once a delete event has
/// been assigned a seqno. An entry whose start seqno is greater than its end
/// seqno was re-opened after an earlier delete and is both open and deleting.
#[derive(Debug)]
pub struct ManifestEntry {
    scope_id: ScopeId,
    start_seqno: Seqno,
    end_seqno: Seqno,
    /// Items stored on disk for this collection. Adjusted from the front-end
    /// path while only a read lock is held.
    disk_count: AtomicU64,
}

impl ManifestEntry {
    /// Create a new entry
    #[must_use]
    pub const fn new(scope_id: ScopeId, start_seqno: Seqno, end_seqno: Seqno) -> Self {
        Self {
            scope_id,
            start_seqno,
            end_seqno,
            disk_count: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub const fn scope_id(&self) -> ScopeId {
        self.scope_id
    }

    #[must_use]
    pub const fn start_seqno(&self) -> Seqno {
        self.start_seqno
    }

    pub const fn set_start_seqno(&mut self, seqno: Seqno) {
        self.start_seqno = seqno;
    }

    #[must_use]
    pub const fn end_seqno(&self) -> Seqno {
        self.end_seqno
    }

    pub const fn set_end_seqno(&mut self, seqno: Seqno) {
        self.end_seqno = seqno;
    }

    /// Reset the end seqno, marking the entry as no longer deleting
    pub const fn reset_end_seqno(&mut self) {
        self.end_seqno = COLLECTION_OPEN_SEQNO;
    }

    /// True if the collection currently accepts new items.
    ///
    /// A re-opened collection (start seqno above end seqno) is open even
    /// though its earlier generation is still being deleted.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.end_seqno == COLLECTION_OPEN_SEQNO || self.start_seqno > self.end_seqno
    }

    /// True if a delete has been recorded and not yet completed
    #[must_use]
    pub const fn is_deleting(&self) -> bool {
        self.end_seqno != COLLECTION_OPEN_SEQNO
    }

    /// True if deleting and not re-opened since
    #[must_use]
    pub const fn is_exclusive_deleting(&self) -> bool {
        self.is_deleting() && !self.is_open()
    }

    /// Finish the delete of this entry.
    ///
    /// Returns [`SystemEvent::DeleteCollectionHard`] when the collection is
    /// going away entirely and the caller must erase the entry. A re-opened
    /// collection instead returns [`SystemEvent::DeleteCollectionSoft`] and the
    /// entry drops back to plain open.
    pub const fn complete_deletion(&mut self) -> SystemEvent {
        if self.is_exclusive_deleting() {
            SystemEvent::DeleteCollectionHard
        } else {
            self.reset_end_seqno();
            SystemEvent::DeleteCollectionSoft
        }
    }

    #[must_use]
    pub fn disk_count(&self) -> u64 {
        self.disk_count.load(Ordering::Relaxed)
    }

    pub fn increment_disk_count(&self) {
        self.disk_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturates at zero
    pub fn decrement_disk_count(&self) {
        let _ = self
            .disk_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn set_disk_count(&self, count: u64) {
        self.disk_count.store(count, Ordering::Relaxed);
    }

    /// Emit this entry's stats under `vb_<id>:collection:<cid>:entry:`
    pub(crate) fn add_stats(&self, prefix: &str, add_stat: &mut dyn FnMut(&str, &str)) {
        add_stat(&format!("{prefix}:scope"), &self.scope_id.to_string());
        add_stat(
            &format!("{prefix}:start_seqno"),
            &self.start_seqno.to_string(),
        );
        add_stat(&format!("{prefix}:end_seqno"), &self.end_seqno.to_string());
        add_stat(&format!("{prefix}:items"), &self.disk_count().to_string());
    }
}

impl Clone for ManifestEntry {
    fn clone(&self) -> Self {
        Self {
            scope_id: self.scope_id,
            start_seqno: self.start_seqno,
            end_seqno: self.end_seqno,
            disk_count: AtomicU64::new(self.disk_count()),
        }
    }
}

/// Item counts are accounting, not identity
impl PartialEq for ManifestEntry {
    fn eq(&self, other: &Self) -> bool {
        self.scope_id == other.scope_id
            && self.start_seqno == other.start_seqno
            && self.end_seqno == other.end_seqno
    }
}

impl Eq for ManifestEntry {}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ManifestEntry: scope:{}, startSeqno:{}, endSeqno:{}, diskCount:{}",
            self.scope_id,
            self.start_seqno,
            self.end_seqno,
            self.disk_count()
        )
    }
}
