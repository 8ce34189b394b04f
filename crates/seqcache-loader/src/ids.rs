//! Identifier-keyed records: alias, alternate ids, content list, and the
//! blob version record.
//!
//! Each kind lives under its own fixed subkey at version 0, so the records
//! of one identifier are stored and evicted independently. Integers are
//! little-endian throughout.
//!
//! ```text
//! alias         [gi: i64]
//! alternate ids [SeqId (bincode)]*
//! content list  [magic: u32] [state: i32] { [sat] [sub_sat] [sat_key] [mask] : i32 }*
//! blob version  [version: i32]
//! ```
//!
//! A record that does not match its layout reads as absent.

use std::io::Write;
use std::sync::Arc;

use bincode::Options;
use seqcache_store::{BlobStore, StoreResult};
use seqcache_types::keys::{blob_key, id_key};
use seqcache_types::{BlobId, RecordKind, SeqId};
use tracing::{debug, warn};

use crate::error::RecordError;

/// Leading magic number of a content list record.
pub const CONTENT_LIST_MAGIC: u32 = 0x32fd_0104;

const CONTENT_HEADER_LEN: usize = 8;
const CONTENT_ENTRY_LEN: usize = 16;

/// Identifier records are not versioned.
const RECORD_VERSION: i32 = 0;

/// One blob holding content for a sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContentEntry {
    pub blob_id: BlobId,
    /// Bit set of content kinds the blob carries.
    pub mask: i32,
}

impl ContentEntry {
    pub const fn new(blob_id: BlobId, mask: i32) -> Self {
        Self { blob_id, mask }
    }
}

/// Blobs holding content for one sequence, with the load state reported
/// by the origin.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentList {
    pub state: i32,
    pub entries: Vec<ContentEntry>,
}

impl ContentList {
    pub fn new(state: i32, entries: Vec<ContentEntry>) -> Self {
        Self { state, entries }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CONTENT_HEADER_LEN + CONTENT_ENTRY_LEN * self.entries.len());
        buf.extend_from_slice(&CONTENT_LIST_MAGIC.to_le_bytes());
        buf.extend_from_slice(&self.state.to_le_bytes());
        for entry in &self.entries {
            for word in [
                entry.blob_id.sat,
                entry.blob_id.sub_sat,
                entry.blob_id.sat_key,
                entry.mask,
            ] {
                buf.extend_from_slice(&word.to_le_bytes());
            }
        }
        buf
    }

    /// Decode a content list, rejecting anything whose length is not
    /// `8 + 16n` or whose magic is wrong.
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() < CONTENT_HEADER_LEN
            || (bytes.len() - CONTENT_HEADER_LEN) % CONTENT_ENTRY_LEN != 0
        {
            return Err(RecordError::InvalidLength {
                kind: "content list",
                len: bytes.len(),
            });
        }

        let mut words = bytes
            .chunks_exact(4)
            .map(|w| i32::from_le_bytes([w[0], w[1], w[2], w[3]]));
        let magic = words.next().unwrap_or_default() as u32;
        if magic != CONTENT_LIST_MAGIC {
            return Err(RecordError::BadMagic(magic));
        }
        let state = words.next().unwrap_or_default();

        let words: Vec<i32> = words.collect();
        let entries = words
            .chunks_exact(4)
            .map(|e| ContentEntry::new(BlobId::new(e[0], e[1], e[2]), e[3]))
            .collect();
        Ok(Self { state, entries })
    }
}

pub fn encode_alias(gi: i64) -> [u8; 8] {
    gi.to_le_bytes()
}

pub fn decode_alias(bytes: &[u8]) -> Result<i64, RecordError> {
    let bytes: [u8; 8] = bytes.try_into().map_err(|_| RecordError::InvalidLength {
        kind: "alias",
        len: bytes.len(),
    })?;
    Ok(i64::from_le_bytes(bytes))
}

pub fn encode_blob_version(version: i32) -> [u8; 4] {
    version.to_le_bytes()
}

pub fn decode_blob_version(bytes: &[u8]) -> Result<i32, RecordError> {
    let bytes: [u8; 4] = bytes.try_into().map_err(|_| RecordError::InvalidLength {
        kind: "blob version",
        len: bytes.len(),
    })?;
    Ok(i32::from_le_bytes(bytes))
}

/// Fixed-width integers, items back-to-back.
fn id_codec() -> impl Options + Copy {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

/// Alternate ids written back-to-back with no count.
pub fn encode_alternate_ids(ids: &[SeqId]) -> StoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    for id in ids {
        id_codec().serialize_into(&mut buf, id)?;
    }
    Ok(buf)
}

/// Decode identifiers until the input is exhausted. A malformed tail
/// rejects the whole list.
///
/// Each item is bounded by the bytes left, so a corrupt length prefix is
/// an error rather than an allocation.
pub fn decode_alternate_ids(bytes: &[u8]) -> Result<Vec<SeqId>, RecordError> {
    let mut rest = bytes;
    let mut ids = Vec::new();
    while !rest.is_empty() {
        let id: SeqId = id_codec()
            .with_limit(rest.len() as u64)
            .deserialize_from(&mut rest)
            .map_err(|e| RecordError::MalformedIds(e.to_string()))?;
        ids.push(id);
    }
    Ok(ids)
}

/// Reads and writes identifier records in one store.
#[derive(Clone, Debug)]
pub struct IdentifierCache {
    store: Arc<BlobStore>,
}

impl IdentifierCache {
    pub fn new(store: Arc<BlobStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<BlobStore> {
        &self.store
    }

    // -- alias --------------------------------------------------------------

    pub fn save_alias(&self, id: &SeqId, gi: i64) -> StoreResult<()> {
        self.write_record(&id_key(id), RecordKind::Alias, &encode_alias(gi))
    }

    pub fn load_alias(&self, id: &SeqId) -> StoreResult<Option<i64>> {
        self.read_record(&id_key(id), RecordKind::Alias, decode_alias)
    }

    // -- alternate ids ------------------------------------------------------

    pub fn save_alternate_ids(&self, id: &SeqId, ids: &[SeqId]) -> StoreResult<()> {
        let bytes = encode_alternate_ids(ids)?;
        self.write_record(&id_key(id), RecordKind::AlternateIds, &bytes)
    }

    pub fn load_alternate_ids(&self, id: &SeqId) -> StoreResult<Option<Vec<SeqId>>> {
        self.read_record(&id_key(id), RecordKind::AlternateIds, decode_alternate_ids)
    }

    // -- content list -------------------------------------------------------

    pub fn save_content_list(&self, id: &SeqId, list: &ContentList) -> StoreResult<()> {
        self.write_record(&id_key(id), RecordKind::ContentList, &list.encode())
    }

    pub fn load_content_list(&self, id: &SeqId) -> StoreResult<Option<ContentList>> {
        self.read_record(&id_key(id), RecordKind::ContentList, ContentList::decode)
    }

    // -- blob version -------------------------------------------------------

    /// Record the current version of a blob. Stored under the blob key.
    pub fn save_blob_version(&self, blob_id: &BlobId, version: i32) -> StoreResult<()> {
        self.write_record(
            &blob_key(blob_id),
            RecordKind::BlobVersion,
            &encode_blob_version(version),
        )
    }

    pub fn load_blob_version(&self, blob_id: &BlobId) -> StoreResult<Option<i32>> {
        self.read_record(&blob_key(blob_id), RecordKind::BlobVersion, decode_blob_version)
    }

    // -- removal ------------------------------------------------------------

    /// Drop one record kind of an identifier.
    pub fn remove(&self, id: &SeqId, kind: RecordKind) -> StoreResult<()> {
        self.store.remove(&id_key(id), RECORD_VERSION, kind.subkey())
    }

    /// Drop every record of an identifier.
    pub fn remove_all(&self, id: &SeqId) -> StoreResult<()> {
        self.store.remove_key(&id_key(id))
    }

    /// Records are rewritten in place; a newer answer from the origin
    /// replaces the cached one.
    fn write_record(&self, key: &str, kind: RecordKind, bytes: &[u8]) -> StoreResult<()> {
        let mut writer = self.store.open_write(key, RECORD_VERSION, kind.subkey())?;
        writer.write_all(bytes)?;
        writer.close()?;
        debug!(key, ?kind, len = bytes.len(), "saved identifier record");
        Ok(())
    }

    fn read_record<T>(
        &self,
        key: &str,
        kind: RecordKind,
        decode: impl FnOnce(&[u8]) -> Result<T, RecordError>,
    ) -> StoreResult<Option<T>> {
        let Some(bytes) = self.store.load(key, RECORD_VERSION, kind.subkey())? else {
            return Ok(None);
        };
        match decode(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, ?kind, error = %e, "rejected cached identifier record");
                Ok(None)
            }
        }
    }
}
