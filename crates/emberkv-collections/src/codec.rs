//! Persisted vbucket manifest format
//!
//! A snapshot of every collection known to a vbucket rides along with each
//! collection system event as its value. The snapshot is built before the
//! event has a seqno, so the entry being changed is always written last
//! with placeholder seqnos and patched in place once the log assigns the
//! real seqno.
//!
//! Layout (little-endian):
//! ```text
//! +--------+---------+-------------+-----+---------------+----------------+
//! | Magic  | Version | Entry width | UID | Logical count | Physical count |
//! | 4B     | 2B      | 2B          | 8B  | 4B            | 4B             |
//! +--------+---------+-------------+-----+---------------+----------------+
//! followed by `physical count` entries:
//! +----------+---------------+-------------+-----------+
//! | Scope ID | Collection ID | Start seqno | End seqno |
//! | 4B       | 4B            | 8B          | 8B        |
//! +----------+---------------+-------------+-----------+
//! ```
//!
//! Only the first `logical count` entries are live. A hard delete shrinks
//! the logical count and leaves the dropped entry's bytes behind.

use bytes::{Buf, BufMut, BytesMut};
use emberkv_common::{
    COLLECTION_OPEN_SEQNO, CollectionId, Error, ManifestUid, Result, ScopeCollectionPair,
    ScopeId, Seqno,
};
use std::fmt;

/// Magic number for persisted vbucket manifests
pub const MAGIC: [u8; 4] = *b"VBCM";

/// Current format version
pub const FORMAT_VERSION: u16 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 24;

/// Size of one encoded entry
pub const ENTRY_SIZE: usize = 24;

const VERSION_OFFSET: usize = 4;
const ENTRY_WIDTH_OFFSET: usize = 6;
const UID_OFFSET: usize = 8;
const LOGICAL_COUNT_OFFSET: usize = 16;
const PHYSICAL_COUNT_OFFSET: usize = 20;

const START_SEQNO_OFFSET: usize = 8;
const END_SEQNO_OFFSET: usize = 16;
const SEQNO_WIDTH: usize = 8;

/// Encoded manifest snapshot
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PersistedManifest(Vec<u8>);

impl PersistedManifest {
    /// Wrap raw bytes without validation
    #[must_use]
    pub const fn from_vec(data: Vec<u8>) -> Self {
        Self(data)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for PersistedManifest {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

impl AsRef<[u8]> for PersistedManifest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PersistedManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PersistedManifest({} bytes)", self.0.len())
    }
}

/// One decoded collection record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PersistedEntry {
    pub scope_id: ScopeId,
    pub collection_id: CollectionId,
    pub start_seqno: Seqno,
    pub end_seqno: Seqno,
}

impl PersistedEntry {
    /// Entry with both seqnos still unknown
    #[must_use]
    pub const fn placeholder(identifiers: ScopeCollectionPair) -> Self {
        Self {
            scope_id: identifiers.0,
            collection_id: identifiers.1,
            start_seqno: COLLECTION_OPEN_SEQNO,
            end_seqno: COLLECTION_OPEN_SEQNO,
        }
    }
}

/// Decoded manifest snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersistedState {
    pub manifest_uid: ManifestUid,
    /// Live entries in encoded order
    pub entries: Vec<PersistedEntry>,
}

/// Identity of the collection a snapshot was built for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SystemEventData {
    pub manifest_uid: ManifestUid,
    pub scope_id: ScopeId,
    pub collection_id: CollectionId,
}

/// In-place edit applied to the last-appended entry of a snapshot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchField {
    /// Collection added at this seqno
    StartSeqno(Seqno),
    /// Collection began deletion at this seqno
    EndSeqno(Seqno),
    /// Collection hard deleted, drop it from the logical count
    DropLastEntry,
}

/// Header fields after structural validation
#[derive(Clone, Copy, Debug)]
struct Header {
    manifest_uid: ManifestUid,
    logical_count: usize,
    physical_count: usize,
}

/// Encode a snapshot in which `mutated` is written last.
///
/// Every entry of `entries` other than the mutated collection is copied in
/// the given order. The mutated collection keeps its current seqnos when it
/// is present in `entries`, otherwise it is written with placeholder
/// seqnos.
pub fn encode<I>(
    manifest_uid: ManifestUid,
    entries: I,
    mutated: ScopeCollectionPair,
) -> Result<PersistedManifest>
where
    I: IntoIterator<Item = PersistedEntry>,
{
    let mut final_entry = PersistedEntry::placeholder(mutated);
    let mut ordered = Vec::new();
    for entry in entries {
        if entry.collection_id == mutated.1 {
            final_entry = PersistedEntry {
                scope_id: mutated.0,
                ..entry
            };
        } else {
            ordered.push(entry);
        }
    }
    ordered.push(final_entry);
    write_entries(manifest_uid, &ordered)
}

/// Encode entries verbatim with every entry live
pub fn encode_state(state: &PersistedState) -> Result<PersistedManifest> {
    write_entries(state.manifest_uid, &state.entries)
}

/// Entry count as written in the header, which holds a u32
pub fn entry_count(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        Error::corrupt(format!(
            "{len} entries do not fit the manifest header count"
        ))
    })
}

fn write_entries(manifest_uid: ManifestUid, entries: &[PersistedEntry]) -> Result<PersistedManifest> {
    let count = entry_count(entries.len())?;
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + entries.len() * ENTRY_SIZE);

    buf.put_slice(&MAGIC);
    buf.put_u16_le(FORMAT_VERSION);
    buf.put_u16_le(ENTRY_SIZE as u16);
    buf.put_u64_le(manifest_uid);
    buf.put_u32_le(count);
    buf.put_u32_le(count);

    for entry in entries {
        buf.put_u32_le(entry.scope_id.get());
        buf.put_u32_le(entry.collection_id.get());
        buf.put_i64_le(entry.start_seqno);
        buf.put_i64_le(entry.end_seqno);
    }

    Ok(PersistedManifest(buf.to_vec()))
}

fn read_header(data: &[u8]) -> Result<Header> {
    if data.len() < HEADER_SIZE {
        return Err(Error::corrupt(format!(
            "buffer of {} bytes is smaller than the {HEADER_SIZE} byte header",
            data.len()
        )));
    }

    let mut buf = data;
    let mut magic = [0u8; 4];
    buf.copy_to_slice(&mut magic);
    if magic != MAGIC {
        return Err(Error::corrupt("invalid manifest magic"));
    }

    let version = buf.get_u16_le();
    if version != FORMAT_VERSION {
        return Err(Error::corrupt(format!(
            "unsupported manifest version {version}"
        )));
    }

    let entry_width = usize::from(buf.get_u16_le());
    if entry_width != ENTRY_SIZE {
        return Err(Error::corrupt(format!(
            "entry width {entry_width}, expected {ENTRY_SIZE}"
        )));
    }

    let manifest_uid = buf.get_u64_le();
    let logical_count = buf.get_u32_le() as usize;
    let physical_count = buf.get_u32_le() as usize;

    if logical_count > physical_count {
        return Err(Error::corrupt(format!(
            "logical entry count {logical_count} exceeds physical count {physical_count}"
        )));
    }

    let expected = physical_count
        .checked_mul(ENTRY_SIZE)
        .and_then(|n| n.checked_add(HEADER_SIZE))
        .ok_or_else(|| Error::corrupt("entry count overflows"))?;
    if data.len() != expected {
        return Err(Error::corrupt(format!(
            "buffer is {} bytes, header describes {expected}",
            data.len()
        )));
    }

    Ok(Header {
        manifest_uid,
        logical_count,
        physical_count,
    })
}

fn read_entry(data: &[u8], index: usize) -> PersistedEntry {
    let offset = HEADER_SIZE + index * ENTRY_SIZE;
    let mut buf = &data[offset..offset + ENTRY_SIZE];
    PersistedEntry {
        scope_id: ScopeId::new(buf.get_u32_le()),
        collection_id: CollectionId::new(buf.get_u32_le()),
        start_seqno: buf.get_i64_le(),
        end_seqno: buf.get_i64_le(),
    }
}

/// Decode a snapshot, returning only the live entries
pub fn decode(data: &[u8]) -> Result<PersistedState> {
    let header = read_header(data)?;
    let entries = (0..header.logical_count)
        .map(|index| read_entry(data, index))
        .collect();
    Ok(PersistedState {
        manifest_uid: header.manifest_uid,
        entries,
    })
}

/// Apply `field` to the snapshot without re-laying it out.
///
/// Seqno edits target the last physical entry, which is where [`encode`]
/// places the mutated collection. Any failure here means the buffer was not
/// produced by [`encode`] and is reported as [`Error::PatchFailed`].
pub fn patch(manifest: PersistedManifest, field: PatchField) -> Result<PersistedManifest> {
    let mut data = manifest.into_vec();
    let header =
        read_header(&data).map_err(|e| Error::PatchFailed(format!("{field:?}: {e}")))?;

    if header.physical_count == 0 {
        return Err(Error::PatchFailed(format!(
            "{field:?}: manifest has no entries"
        )));
    }
    let last = HEADER_SIZE + (header.physical_count - 1) * ENTRY_SIZE;

    match field {
        PatchField::StartSeqno(seqno) => {
            write_seqno(&mut data, last + START_SEQNO_OFFSET, seqno)?;
        }
        PatchField::EndSeqno(seqno) => {
            write_seqno(&mut data, last + END_SEQNO_OFFSET, seqno)?;
        }
        PatchField::DropLastEntry => {
            let count = header.logical_count.checked_sub(1).ok_or_else(|| {
                Error::PatchFailed("cannot drop entry from empty logical count".into())
            })?;
            let count = u32::try_from(count)
                .map_err(|_| Error::PatchFailed(format!("entry count {count} too wide")))?;
            data[LOGICAL_COUNT_OFFSET..LOGICAL_COUNT_OFFSET + 4]
                .copy_from_slice(&count.to_le_bytes());
        }
    }

    Ok(PersistedManifest(data))
}

fn write_seqno(data: &mut [u8], offset: usize, seqno: Seqno) -> Result<()> {
    let field = data
        .get_mut(offset..offset + SEQNO_WIDTH)
        .ok_or_else(|| Error::PatchFailed(format!("seqno field at {offset} out of bounds")))?;
    field.copy_from_slice(&seqno.to_le_bytes());
    Ok(())
}

/// Read the uid and identity of the mutated (last) entry of a snapshot
pub fn system_event_data(data: &[u8]) -> Result<SystemEventData> {
    let header = read_header(data)?;
    if header.physical_count == 0 {
        return Err(Error::corrupt("manifest has no entries"));
    }
    let entry = read_entry(data, header.physical_count - 1);
    Ok(SystemEventData {
        manifest_uid: header.manifest_uid,
        scope_id: entry.scope_id,
        collection_id: entry.collection_id,
    })
}
