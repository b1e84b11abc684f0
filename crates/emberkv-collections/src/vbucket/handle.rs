//! Lock-scoped access to a vbucket manifest

use super::Manifest;
use crate::doc_key::DocKey;
use crate::entry::ManifestEntry;
use emberkv_common::{CollectionId, Result, ScopeId, Seqno};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::ops::{Deref, DerefMut};

/// A vbucket's manifest behind a reader/writer lock
#[derive(Debug, Default)]
pub struct VbManifest {
    inner: RwLock<Manifest>,
}

impl VbManifest {
    #[must_use]
    pub fn new(manifest: Manifest) -> Self {
        Self {
            inner: RwLock::new(manifest),
        }
    }

    /// Take the shared lock
    pub fn lock(&self) -> ReadHandle<'_> {
        ReadHandle {
            guard: self.inner.read(),
        }
    }

    /// Take the exclusive lock
    pub fn wlock(&self) -> WriteHandle<'_> {
        WriteHandle {
            guard: self.inner.write(),
        }
    }
}

/// Shared view of a manifest, held for as long as the handle lives
pub struct ReadHandle<'a> {
    guard: RwLockReadGuard<'a, Manifest>,
}

impl ReadHandle<'_> {
    /// Resolve `key` against the locked manifest.
    ///
    /// The returned handle borrows this one, so the resolved entry cannot
    /// be used after the lock is released.
    pub fn for_key<'h, 'k>(&'h self, key: &'k DocKey) -> Result<CachingReadHandle<'h, 'k>> {
        CachingReadHandle::new(&self.guard, key)
    }
}

impl Deref for ReadHandle<'_> {
    type Target = Manifest;

    fn deref(&self) -> &Manifest {
        &self.guard
    }
}

impl fmt::Debug for ReadHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadHandle")
            .field("manifest_uid", &self.guard.manifest_uid())
            .finish()
    }
}

/// Read view with one key's collection lookup done up front.
///
/// Every query is answered against the entry resolved at construction.
pub struct CachingReadHandle<'h, 'k> {
    manifest: &'h Manifest,
    key: &'k DocKey,
    entry: Option<(CollectionId, &'h ManifestEntry)>,
}

impl<'h, 'k> CachingReadHandle<'h, 'k> {
    fn new(manifest: &'h Manifest, key: &'k DocKey) -> Result<Self> {
        let entry = manifest.get_manifest_entry_for_key(key, true)?;
        Ok(Self {
            manifest,
            key,
            entry,
        })
    }

    #[must_use]
    pub const fn key(&self) -> &DocKey {
        self.key
    }

    /// The collection the key resolved to, if it exists
    #[must_use]
    pub fn collection_id(&self) -> Option<CollectionId> {
        self.entry.map(|(cid, _)| cid)
    }

    #[must_use]
    pub fn entry(&self) -> Option<&ManifestEntry> {
        self.entry.map(|(_, entry)| entry)
    }

    /// True if the resolved collection exists and accepts items.
    ///
    /// System event keys never do.
    #[must_use]
    pub fn valid(&self) -> bool {
        !self.key.is_system_event() && self.entry().is_some_and(ManifestEntry::is_open)
    }

    #[must_use]
    pub fn belongs_to_scope(&self, scope_id: ScopeId) -> bool {
        self.entry()
            .is_some_and(|entry| entry.scope_id() == scope_id)
    }

    /// True if an item at `seqno` is hidden by a deletion.
    ///
    /// Fails with `InvalidIterator` if the key's collection is unknown.
    pub fn is_logically_deleted(&self, seqno: Seqno) -> Result<bool> {
        self.manifest.is_logically_deleted_entry(self.entry(), seqno)
    }

    /// Collection whose deletion is complete once this system event item
    /// is purged
    #[must_use]
    pub fn should_complete_deletion(&self, seqno: Seqno) -> Option<CollectionId> {
        self.manifest
            .should_complete_deletion(self.key, seqno, self.entry)
    }

    /// Count a new item against the resolved collection
    pub fn increment_disk_count(&self) {
        if let Some(entry) = self.entry() {
            entry.increment_disk_count();
        }
    }

    /// Uncount an item from the resolved collection
    pub fn decrement_disk_count(&self) {
        if let Some(entry) = self.entry() {
            entry.decrement_disk_count();
        }
    }

    #[must_use]
    pub const fn manifest(&self) -> &Manifest {
        self.manifest
    }
}

impl fmt::Debug for CachingReadHandle<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingReadHandle")
            .field("key", self.key)
            .field("collection", &self.collection_id())
            .finish()
    }
}

/// Exclusive view of a manifest
pub struct WriteHandle<'a> {
    guard: RwLockWriteGuard<'a, Manifest>,
}

impl Deref for WriteHandle<'_> {
    type Target = Manifest;

    fn deref(&self) -> &Manifest {
        &self.guard
    }
}

impl DerefMut for WriteHandle<'_> {
    fn deref_mut(&mut self) -> &mut Manifest {
        &mut self.guard
    }
}

impl fmt::Debug for WriteHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteHandle")
            .field("manifest_uid", &self.guard.manifest_uid())
            .finish()
    }
}
