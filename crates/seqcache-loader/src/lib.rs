//! Cache adapters for a sequence data loader.
//!
//! Two stores back the adapters: an identifier cache holding small records
//! keyed by sequence identifier (alias, alternate ids, content list) and by
//! blob key (current blob version), and a blob cache holding versioned blob
//! chunks behind a format header.
//!
//! - [`ReadThroughAdapter`] -- cache-first lookups; every failure is a miss
//! - [`WriteThroughAdapter`] -- best-effort population from the origin
//! - [`IdentifierCache`] -- record layouts of the identifier cache
//! - [`CacheHolder`] -- the two optional stores, opened from [`LoaderConfig`]

pub mod config;
pub mod error;
pub mod header;
pub mod holder;
pub mod ids;
pub mod reader;
pub mod writer;

pub use config::{CacheSection, LoaderConfig};
pub use error::RecordError;
pub use header::{FormatRegistry, RecordFormat};
pub use holder::CacheHolder;
pub use ids::{ContentEntry, ContentList, IdentifierCache};
pub use reader::{CachedChunk, ReadThroughAdapter, VersionResolver};
pub use writer::{ChunkStream, WriteThroughAdapter};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use seqcache_store::{KeepVersions, ManualClock};
    use seqcache_types::{BlobId, ChunkId};

    use super::*;

    const FORMAT: RecordFormat = RecordFormat::new(1, 0x3230_3031);

    fn adapters(config: &LoaderConfig) -> (ReadThroughAdapter, WriteThroughAdapter) {
        let holder = CacheHolder::open_with_clock(config, Arc::new(ManualClock::new(0))).unwrap();
        (
            ReadThroughAdapter::new(holder.clone(), FormatRegistry::new().with(FORMAT)),
            WriteThroughAdapter::new(holder),
        )
    }

    #[test]
    fn large_blob_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let (reader, writer) = adapters(&LoaderConfig::at(dir.path()));
        let blob: BlobId = "10-12345".parse().unwrap();
        let payload: Vec<u8> = (0..5_000_000u32).map(|i| (i % 253) as u8).collect();

        assert!(writer.save_chunk(&blob, 1, ChunkId::MAIN, FORMAT, &payload));

        let store = reader.blob_store().unwrap();
        let overflow = store.overflow_path("10-12345", 1, "");
        assert!(overflow.exists());
        assert!(store.attributes("10-12345", 1, "").unwrap().unwrap().overflow);

        let chunk = reader.load_chunk(&blob, 1, ChunkId::MAIN).unwrap();
        assert_eq!(chunk.data.len(), payload.len());
        assert!(chunk.data[..] == payload[..]);

        store.remove_key("10-12345").unwrap();
        assert!(!overflow.exists());
        assert!(reader.load_chunk(&blob, 1, ChunkId::MAIN).is_none());
    }

    #[test]
    fn first_cached_version_wins_for_plain_stores() {
        let dir = tempfile::tempdir().unwrap();
        let (reader, _) = adapters(&LoaderConfig::at(dir.path()));
        let store = reader.blob_store().unwrap();

        let mut first = FORMAT.encode().to_vec();
        first.extend_from_slice(b"bytes1");
        let mut second = FORMAT.encode().to_vec();
        second.extend_from_slice(b"bytes2");
        store.store("10-1", 3, "", &first).unwrap();
        store.store("10-1", 3, "", &second).unwrap();

        let chunk = reader.load_blob(&BlobId::main(10, 1), 3).unwrap();
        assert_eq!(&chunk.data[..], b"bytes1");
    }

    #[test]
    fn newer_version_replaces_older_under_drop_older() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LoaderConfig::at(dir.path());
        config.blob_cache.store.keep_versions = KeepVersions::DropOlder;
        let (reader, writer) = adapters(&config);
        let blob = BlobId::new(10, 2, 7);

        assert!(writer.save_blob(&blob, 1, FORMAT, b"v1"));
        assert!(writer.save_chunk(&blob, 1, ChunkId(4), FORMAT, b"v1-chunk"));
        assert!(writer.save_blob(&blob, 2, FORMAT, b"v2"));

        assert!(reader.load_blob(&blob, 1).is_none());
        assert!(reader.load_chunk(&blob, 1, ChunkId(4)).is_none());
        assert_eq!(&reader.load_blob(&blob, 2).unwrap().data[..], b"v2");
    }

    #[test]
    fn versions_coexist_under_keep_all() {
        let dir = tempfile::tempdir().unwrap();
        let (reader, writer) = adapters(&LoaderConfig::at(dir.path()));
        let blob = BlobId::main(10, 9);

        assert!(writer.save_blob(&blob, 1, FORMAT, b"a"));
        assert!(writer.save_blob(&blob, 2, FORMAT, b"b"));
        assert_eq!(&reader.load_blob(&blob, 1).unwrap().data[..], b"a");
        assert_eq!(&reader.load_blob(&blob, 2).unwrap().data[..], b"b");
    }

    #[test]
    fn misaligned_content_list_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let (reader, writer) = adapters(&LoaderConfig::at(dir.path()));
        let id = seqcache_types::SeqId::Gi(77);
        let list = ContentList::new(
            0,
            vec![ContentEntry::new(BlobId::main(4, 1), 1), ContentEntry::new(BlobId::main(4, 2), 2)],
        );
        assert!(writer.save_content_list(&id, &list));
        assert_eq!(reader.load_content_list(&id), Some(list.clone()));

        let mut bytes = list.encode();
        bytes.extend_from_slice(&[1, 2, 3]);
        let ids = reader.holder().id_cache().unwrap();
        ids.remove("77", 0, "blobs").unwrap();
        ids.store("77", 0, "blobs", &bytes).unwrap();
        assert_eq!(reader.load_content_list(&id), None);
    }
}
