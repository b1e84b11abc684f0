//! Collection system event items

use crate::codec::PersistedManifest;
use crate::doc_key::{DocKey, SystemEvent};
use emberkv_common::{COLLECTION_OPEN_SEQNO, CollectionId, Seqno};

/// A collection lifecycle record queued into a vbucket's log.
///
/// The value is the vbucket's manifest snapshot as of this event. Its last
/// entry describes the collection named by the key and carries placeholder
/// seqnos until the item is flushed and patched.
#[derive(Clone, Debug)]
pub struct SystemEventItem {
    key: DocKey,
    event: SystemEvent,
    value: PersistedManifest,
    deleted: bool,
    by_seqno: Seqno,
}

impl SystemEventItem {
    /// Create an item that has not yet been assigned a seqno
    #[must_use]
    pub fn new(
        event: SystemEvent,
        collection: CollectionId,
        value: PersistedManifest,
        deleted: bool,
    ) -> Self {
        Self {
            key: DocKey::system_event(event, collection),
            event,
            value,
            deleted,
            by_seqno: COLLECTION_OPEN_SEQNO,
        }
    }

    #[must_use]
    pub const fn key(&self) -> &DocKey {
        &self.key
    }

    #[must_use]
    pub const fn event(&self) -> SystemEvent {
        self.event
    }

    /// Flags value stored with the item
    #[must_use]
    pub const fn flags(&self) -> u32 {
        self.event.as_flags()
    }

    #[must_use]
    pub const fn value(&self) -> &PersistedManifest {
        &self.value
    }

    /// True for the event that begins a collection's deletion
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted
    }

    #[must_use]
    pub const fn by_seqno(&self) -> Seqno {
        self.by_seqno
    }

    /// Set by the log when the item is queued
    pub const fn set_by_seqno(&mut self, seqno: Seqno) {
        self.by_seqno = seqno;
    }
}
