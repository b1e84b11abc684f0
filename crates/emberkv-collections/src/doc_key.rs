//! Collection-aware document keys
//!
//! Every document key carries the id of the collection it belongs to.
//! Keys of system events (collection lifecycle records written into the
//! same log as documents) live in [`CollectionId::SYSTEM`] and embed the id
//! of the collection they describe after the event prefix.
//!
//! Encoded form:
//! ```text
//! +---------------+-------------------------------+
//! | Collection ID | Key                           |
//! | 4B (BE)       | var                           |
//! +---------------+-------------------------------+
//!
//! System event key body:
//! +---------------+-----+-------------------------+
//! | "_collection" | ':' | Collection ID 4B (LE)   |
//! +---------------+-----+-------------------------+
//! ```

use emberkv_common::{CollectionId, Error, Result};
use std::fmt;

/// Separates a system event prefix from its embedded payload
const SYSTEM_SEPARATOR: u8 = b':';

/// Kinds of collection lifecycle records written into the log
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SystemEvent {
    /// A collection was added (or, when the item is deleted, began deletion)
    Collection = 0,
    /// A re-opened collection finished purging its earlier generation
    DeleteCollectionSoft = 1,
    /// A collection finished deletion and is gone
    DeleteCollectionHard = 2,
}

impl SystemEvent {
    /// Key prefix shared by all events for one collection so that they
    /// supersede each other in the log
    #[must_use]
    pub const fn key_prefix(self) -> &'static str {
        match self {
            Self::Collection | Self::DeleteCollectionSoft | Self::DeleteCollectionHard => {
                "_collection"
            }
        }
    }

    /// Item flags value carried by queued events
    #[must_use]
    pub const fn as_flags(self) -> u32 {
        self as u32
    }

    /// Parse from item flags
    #[must_use]
    pub const fn from_flags(flags: u32) -> Option<Self> {
        match flags {
            0 => Some(Self::Collection),
            1 => Some(Self::DeleteCollectionSoft),
            2 => Some(Self::DeleteCollectionHard),
            _ => None,
        }
    }
}

impl fmt::Display for SystemEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Collection => "Collection",
            Self::DeleteCollectionSoft => "DeleteCollectionSoft",
            Self::DeleteCollectionHard => "DeleteCollectionHard",
        };
        f.write_str(name)
    }
}

/// A document key qualified by its collection
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DocKey {
    collection: CollectionId,
    key: Vec<u8>,
}

impl DocKey {
    /// Create a key in the given collection
    pub fn new(collection: CollectionId, key: impl Into<Vec<u8>>) -> Self {
        Self {
            collection,
            key: key.into(),
        }
    }

    /// Create a key in the default collection
    pub fn in_default(key: impl Into<Vec<u8>>) -> Self {
        Self::new(CollectionId::DEFAULT, key)
    }

    /// Create the key of a system event describing `collection`
    #[must_use]
    pub fn system_event(event: SystemEvent, collection: CollectionId) -> Self {
        Self::system_event_with_extra(event, &collection.get().to_le_bytes())
    }

    /// Create a system event key with an arbitrary embedded payload
    #[must_use]
    pub fn system_event_with_extra(event: SystemEvent, extra: &[u8]) -> Self {
        let prefix = event.key_prefix().as_bytes();
        let mut key = Vec::with_capacity(prefix.len() + 1 + extra.len());
        key.extend_from_slice(prefix);
        key.push(SYSTEM_SEPARATOR);
        key.extend_from_slice(extra);
        Self::new(CollectionId::SYSTEM, key)
    }

    #[must_use]
    pub const fn collection_id(&self) -> CollectionId {
        self.collection
    }

    /// Key bytes without the collection prefix
    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    #[must_use]
    pub const fn is_system_event(&self) -> bool {
        self.collection.is_system()
    }

    /// Payload embedded after the system event prefix.
    ///
    /// Empty for keys without a separator.
    #[must_use]
    pub fn system_key_extra(&self) -> &[u8] {
        match self.key.iter().position(|&b| b == SYSTEM_SEPARATOR) {
            Some(pos) => &self.key[pos + 1..],
            None => &[],
        }
    }

    /// The collection this key should be looked up under.
    ///
    /// For ordinary keys that is the key's own collection; system event
    /// keys resolve to the collection id embedded in their payload.
    pub fn lookup_collection_id(&self) -> Result<CollectionId> {
        if !self.is_system_event() {
            return Ok(self.collection);
        }
        let extra = self.system_key_extra();
        let raw: [u8; 4] = extra
            .try_into()
            .map_err(|_| Error::MalformedSystemKey { len: extra.len() })?;
        Ok(CollectionId::new(u32::from_le_bytes(raw)))
    }
}

impl fmt::Debug for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocKey({self})")
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cid:{:#x}:{}",
            self.collection.get(),
            String::from_utf8_lossy(&self.key)
        )
    }
}
