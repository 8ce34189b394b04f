//! Canonical cache keys and subkeys.
//!
//! Pure functions: no I/O, no state. Blob records are keyed by the rendered
//! [`BlobId`] and addressed per chunk by [`ChunkId::subkey`]. Identifier
//! records are keyed by [`id_key`] and told apart by the fixed subkey of
//! their [`RecordKind`].

use crate::blob_id::{BlobId, ChunkId};
use crate::seq_id::SeqId;

/// Primary key of a blob: `"<sat>[.<sub_sat>]-<sat_key>"`.
pub fn blob_key(id: &BlobId) -> String {
    id.to_string()
}

/// Subkey of one chunk of a blob.
pub fn chunk_subkey(chunk: ChunkId) -> String {
    chunk.subkey()
}

/// Primary key of the identifier records for `id`.
///
/// A gi renders as its bare decimal form; every other identifier renders as
/// its canonical string.
pub fn id_key(id: &SeqId) -> String {
    match id {
        SeqId::Gi(gi) => gi_key(*gi),
        other => other.to_string(),
    }
}

/// Primary key for a numeric identifier.
pub fn gi_key(gi: i64) -> String {
    gi.to_string()
}

/// Kinds of small records kept in the identifier cache.
///
/// Each kind lives under its own fixed subkey so the records for one key
/// coexist and can be evicted independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Canonical numeric alias (gi) of an identifier.
    Alias,
    /// Alternate identifiers of a sequence.
    AlternateIds,
    /// Blobs holding content for a sequence, with content masks.
    ContentList,
    /// Current version of a blob, keyed by the blob key.
    BlobVersion,
}

impl RecordKind {
    /// All record kinds.
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Alias,
        RecordKind::AlternateIds,
        RecordKind::ContentList,
        RecordKind::BlobVersion,
    ];

    /// The fixed subkey for this record kind.
    pub const fn subkey(&self) -> &'static str {
        match self {
            RecordKind::Alias => "gi",
            RecordKind::AlternateIds => "ids",
            RecordKind::ContentList => "blobs",
            RecordKind::BlobVersion => "ver",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn blob_key_formats() {
        assert_eq!(blob_key(&BlobId::main(10, 12345)), "10-12345");
        assert_eq!(blob_key(&BlobId::new(10, 3, 12345)), "10.3-12345");
    }

    #[test]
    fn gi_renders_bare_decimal() {
        assert_eq!(id_key(&SeqId::Gi(5_000_001)), "5000001");
        assert_eq!(gi_key(-1), "-1");
    }

    #[test]
    fn textual_ids_render_canonical_string() {
        let id = SeqId::accession("ref", "NM_000546", Some(5));
        assert_eq!(id_key(&id), "ref|NM_000546.5|");
        assert_eq!(id_key(&SeqId::Local("chr1".into())), "lcl|chr1");
    }

    #[test]
    fn chunk_subkeys() {
        assert_eq!(chunk_subkey(ChunkId::MAIN), "");
        assert_eq!(chunk_subkey(ChunkId(12)), "12");
    }

    #[test]
    fn record_subkeys_are_distinct() {
        let subkeys: HashSet<&str> = RecordKind::ALL.iter().map(|k| k.subkey()).collect();
        assert_eq!(subkeys.len(), RecordKind::ALL.len());
    }

    proptest! {
        #[test]
        fn blob_key_is_injective(
            a in (any::<i32>(), any::<i32>(), any::<i32>()),
            b in (any::<i32>(), any::<i32>(), any::<i32>()),
        ) {
            let ia = BlobId::new(a.0, a.1, a.2);
            let ib = BlobId::new(b.0, b.1, b.2);
            prop_assert_eq!(ia == ib, blob_key(&ia) == blob_key(&ib));
        }

        #[test]
        fn blob_key_parses_back(sat in any::<i32>(), sub_sat in any::<i32>(), sat_key in any::<i32>()) {
            let id = BlobId::new(sat, sub_sat, sat_key);
            let parsed: BlobId = blob_key(&id).parse().unwrap();
            prop_assert_eq!(parsed, id);
        }
    }
}
