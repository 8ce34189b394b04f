//! Write-through side: push bytes fetched from the origin into the cache.
//!
//! Caching is best-effort. A failure removes the entry being written, logs a
//! warning, and reports `false`; it never reaches the caller as an error.

use std::io::{self, Write};

use seqcache_store::{BlobStore, BlobWriter, StoreResult};
use seqcache_types::keys::{blob_key, chunk_subkey};
use seqcache_types::{BlobId, ChunkId, RecordKind, SeqId};
use tracing::{debug, warn};

use crate::header::RecordFormat;
use crate::holder::CacheHolder;
use crate::ids::{ContentList, IdentifierCache};

/// Best-effort writes over a [`CacheHolder`].
#[derive(Clone, Debug)]
pub struct WriteThroughAdapter {
    holder: CacheHolder,
}

impl WriteThroughAdapter {
    pub fn new(holder: CacheHolder) -> Self {
        Self { holder }
    }

    pub fn holder(&self) -> &CacheHolder {
        &self.holder
    }

    // ---------------------------------------------------------------
    // Blob chunks
    // ---------------------------------------------------------------

    /// Cache one chunk, prefixed with the header of `format`.
    ///
    /// Returns `true` if the chunk was committed.
    pub fn save_chunk(
        &self,
        blob_id: &BlobId,
        version: i32,
        chunk: ChunkId,
        format: RecordFormat,
        data: &[u8],
    ) -> bool {
        let Some(mut stream) = self.open_chunk_stream(blob_id, version, chunk, format) else {
            return false;
        };
        if let Err(e) = stream.write_all(data) {
            warn!(blob = %blob_id, version, chunk = %chunk, error = %e, "chunk write failed");
            stream.abort();
            return false;
        }
        stream.close()
    }

    /// Cache the main chunk.
    pub fn save_blob(&self, blob_id: &BlobId, version: i32, format: RecordFormat, data: &[u8]) -> bool {
        self.save_chunk(blob_id, version, ChunkId::MAIN, format, data)
    }

    /// Open a stream for a chunk whose bytes arrive incrementally.
    ///
    /// The header is written before the stream is returned. Returns `None`
    /// if the blob cache is disabled or the stream cannot be opened.
    pub fn open_chunk_stream(
        &self,
        blob_id: &BlobId,
        version: i32,
        chunk: ChunkId,
        format: RecordFormat,
    ) -> Option<ChunkStream<'_>> {
        let store: &BlobStore = self.holder.blob_cache()?;
        let key = blob_key(blob_id);
        let subkey = chunk_subkey(chunk);

        let opened = store.open_write(&key, version, &subkey).and_then(|mut writer| {
            writer.write_all(&format.encode())?;
            Ok(writer)
        });
        match opened {
            Ok(writer) => Some(ChunkStream {
                store,
                key,
                version,
                subkey,
                writer: Some(writer),
            }),
            Err(e) => {
                warn!(key = %key, version, chunk = %chunk, error = %e, "opening chunk stream failed");
                remove_quietly(store, &key, version, &subkey);
                None
            }
        }
    }

    // ---------------------------------------------------------------
    // Identifier records
    // ---------------------------------------------------------------

    /// Record the current version of a blob.
    pub fn save_blob_version(&self, blob_id: &BlobId, version: i32) -> bool {
        let Some(ids) = self.holder.identifiers() else {
            return false;
        };
        match ids.save_blob_version(blob_id, version) {
            Ok(()) => true,
            Err(e) => {
                warn!(blob = %blob_id, version, error = %e, "caching blob version failed");
                remove_quietly(ids.store(), &blob_key(blob_id), 0, RecordKind::BlobVersion.subkey());
                false
            }
        }
    }

    pub fn save_alias(&self, id: &SeqId, gi: i64) -> bool {
        self.save_record(id, RecordKind::Alias, |ids| ids.save_alias(id, gi))
    }

    pub fn save_alternate_ids(&self, id: &SeqId, alternates: &[SeqId]) -> bool {
        self.save_record(id, RecordKind::AlternateIds, |ids| {
            ids.save_alternate_ids(id, alternates)
        })
    }

    pub fn save_content_list(&self, id: &SeqId, list: &ContentList) -> bool {
        self.save_record(id, RecordKind::ContentList, |ids| ids.save_content_list(id, list))
    }

    fn save_record(
        &self,
        id: &SeqId,
        kind: RecordKind,
        save: impl FnOnce(&IdentifierCache) -> StoreResult<()>,
    ) -> bool {
        let Some(ids) = self.holder.identifiers() else {
            return false;
        };
        match save(&ids) {
            Ok(()) => true,
            Err(e) => {
                warn!(id = %id, ?kind, error = %e, "caching identifier record failed");
                if let Err(e) = ids.remove(id, kind) {
                    warn!(id = %id, ?kind, error = %e, "cleanup after failed record write failed");
                }
                false
            }
        }
    }
}

fn remove_quietly(store: &BlobStore, key: &str, version: i32, subkey: &str) {
    if let Err(e) = store.remove(key, version, subkey) {
        warn!(key, version, subkey, error = %e, "cleanup after failed write failed");
    }
}

/// Write stream for one cached chunk.
///
/// Bytes become visible only on [`close`](Self::close). Aborting, a failed
/// write, or dropping the stream unclosed removes the chunk from the cache.
pub struct ChunkStream<'a> {
    store: &'a BlobStore,
    key: String,
    version: i32,
    subkey: String,
    writer: Option<BlobWriter<'a>>,
}

impl ChunkStream<'_> {
    /// Commit the chunk. Returns `true` on success.
    pub fn close(mut self) -> bool {
        let Some(writer) = self.writer.take() else {
            self.discard();
            return false;
        };
        match writer.close() {
            Ok(()) => {
                debug!(key = %self.key, version = self.version, subkey = %self.subkey, "cached chunk");
                true
            }
            Err(e) => {
                warn!(key = %self.key, version = self.version, error = %e, "committing chunk failed");
                self.discard();
                false
            }
        }
    }

    /// Drop the chunk without committing it.
    pub fn abort(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        remove_quietly(self.store, &self.key, self.version, &self.subkey);
    }
}

impl Write for ChunkStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::Other, "chunk stream already failed"));
        };
        match writer.write(buf) {
            Ok(n) => Ok(n),
            Err(e) => {
                warn!(key = %self.key, version = self.version, error = %e, "chunk stream write failed");
                self.discard();
                Err(e)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for ChunkStream<'_> {
    fn drop(&mut self) {
        if self.writer.is_some() {
            debug!(key = %self.key, version = self.version, "chunk stream dropped unclosed");
            self.discard();
        }
    }
}

impl std::fmt::Debug for ChunkStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream")
            .field("key", &self.key)
            .field("version", &self.version)
            .field("subkey", &self.subkey)
            .field("open", &self.writer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use seqcache_store::{KvBackend, InMemoryBackend, ManualClock, StoreConfig, StoreError, Table};

    use super::*;
    use crate::config::LoaderConfig;
    use crate::header::FormatRegistry;
    use crate::reader::ReadThroughAdapter;

    const FORMAT: RecordFormat = RecordFormat::new(2, 0x3232_0001);

    fn holder(root: &std::path::Path) -> CacheHolder {
        CacheHolder::open_with_clock(&LoaderConfig::at(root), Arc::new(ManualClock::new(0))).unwrap()
    }

    fn reader(holder: &CacheHolder) -> ReadThroughAdapter {
        ReadThroughAdapter::new(holder.clone(), FormatRegistry::new().with(FORMAT))
    }

    // -----------------------------------------------------------------------
    // Chunks
    // -----------------------------------------------------------------------

    #[test]
    fn saved_chunk_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let h = holder(dir.path());
        let writer = WriteThroughAdapter::new(h.clone());
        let blob = BlobId::main(10, 1);

        assert!(writer.save_blob(&blob, 2, FORMAT, b"entry"));
        let chunk = reader(&h).load_blob(&blob, 2).unwrap();
        assert_eq!(&chunk.data[..], b"entry");
        assert_eq!(chunk.format, FORMAT);
    }

    #[test]
    fn chunks_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let h = holder(dir.path());
        let writer = WriteThroughAdapter::new(h.clone());
        let blob = BlobId::main(10, 1);

        assert!(writer.save_chunk(&blob, 1, ChunkId::MAIN, FORMAT, b"main"));
        assert!(writer.save_chunk(&blob, 1, ChunkId(5), FORMAT, b"five"));

        let store = h.blob_cache().unwrap();
        store.remove("10-1", 1, "").unwrap();
        let r = reader(&h);
        assert!(r.load_chunk(&blob, 1, ChunkId::MAIN).is_none());
        assert_eq!(&r.load_chunk(&blob, 1, ChunkId(5)).unwrap().data[..], b"five");
    }

    #[test]
    fn streamed_chunk_commits_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let h = holder(dir.path());
        let writer = WriteThroughAdapter::new(h.clone());
        let blob = BlobId::main(10, 1);

        let mut stream = writer.open_chunk_stream(&blob, 1, ChunkId(3), FORMAT).unwrap();
        stream.write_all(b"part one, ").unwrap();
        assert!(reader(&h).load_chunk(&blob, 1, ChunkId(3)).is_none());
        stream.write_all(b"part two").unwrap();
        assert!(stream.close());

        let chunk = reader(&h).load_chunk(&blob, 1, ChunkId(3)).unwrap();
        assert_eq!(&chunk.data[..], b"part one, part two");
    }

    #[test]
    fn aborted_stream_leaves_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let h = holder(dir.path());
        let writer = WriteThroughAdapter::new(h.clone());
        let blob = BlobId::main(10, 1);
        assert!(writer.save_blob(&blob, 1, FORMAT, b"old"));

        let mut stream = writer.open_chunk_stream(&blob, 1, ChunkId::MAIN, FORMAT).unwrap();
        stream.write_all(b"partial").unwrap();
        stream.abort();
        assert!(reader(&h).load_blob(&blob, 1).is_none());
    }

    #[test]
    fn dropped_stream_leaves_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let h = holder(dir.path());
        let writer = WriteThroughAdapter::new(h.clone());
        let blob = BlobId::main(10, 1);
        {
            let mut stream = writer.open_chunk_stream(&blob, 1, ChunkId::MAIN, FORMAT).unwrap();
            stream.write_all(&vec![7u8; 3 * 1024 * 1024]).unwrap();
        }
        assert!(reader(&h).load_blob(&blob, 1).is_none());
        let overflow = h.blob_cache().unwrap().overflow_path("10-1", 1, "");
        assert!(!overflow.exists());
    }

    #[test]
    fn disabled_blob_cache_is_a_noop() {
        let writer = WriteThroughAdapter::new(CacheHolder::default());
        let blob = BlobId::main(1, 1);
        assert!(!writer.save_blob(&blob, 1, FORMAT, b"x"));
        assert!(writer.open_chunk_stream(&blob, 1, ChunkId::MAIN, FORMAT).is_none());
        assert!(!writer.save_blob_version(&blob, 1));
        assert!(!writer.save_alias(&SeqId::Gi(1), 1));
    }

    // -----------------------------------------------------------------------
    // Failures
    // -----------------------------------------------------------------------

    /// Backend whose payload table refuses writes.
    struct ReadOnlyPayloads(InMemoryBackend);

    impl KvBackend for ReadOnlyPayloads {
        fn get(&self, table: Table, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
            self.0.get(table, key)
        }
        fn put(&self, table: Table, key: &[u8], value: &[u8]) -> StoreResult<()> {
            match table {
                Table::Payloads => Err(StoreError::Backend("read-only".into())),
                Table::Attributes => self.0.put(table, key, value),
            }
        }
        fn delete(&self, table: Table, key: &[u8]) -> StoreResult<bool> {
            self.0.delete(table, key)
        }
        fn scan_prefix(&self, table: Table, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
            self.0.scan_prefix(table, prefix)
        }
        fn truncate(&self, table: Table) -> StoreResult<()> {
            self.0.truncate(table)
        }
    }

    fn failing_holder(root: &std::path::Path) -> CacheHolder {
        let store = |name: &str| {
            let config = StoreConfig {
                name: name.into(),
                ..StoreConfig::at(root)
            };
            let backend = Box::new(ReadOnlyPayloads(InMemoryBackend::new()));
            Arc::new(BlobStore::with_backend(backend, config, Arc::new(ManualClock::new(0))).unwrap())
        };
        CacheHolder::new(Some(store("ids")), Some(store("blobs")))
    }

    #[test]
    fn failures_are_swallowed_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let h = failing_holder(dir.path());
        let writer = WriteThroughAdapter::new(h.clone());
        let blob = BlobId::main(10, 1);
        let id = SeqId::Gi(5);

        assert!(!writer.save_blob(&blob, 1, FORMAT, b"inline"));
        assert!(!writer.save_alias(&id, 5));
        assert!(!writer.save_blob_version(&blob, 1));

        let blobs = h.blob_cache().unwrap();
        assert!(!blobs.exists("10-1", 1, "").unwrap());
        assert!(!h.id_cache().unwrap().exists("5", 0, "gi").unwrap());
        assert!(reader(&h).load_blob(&blob, 1).is_none());
    }

    // -----------------------------------------------------------------------
    // Identifier records
    // -----------------------------------------------------------------------

    #[test]
    fn identifier_records_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let h = holder(dir.path());
        let writer = WriteThroughAdapter::new(h.clone());
        let r = reader(&h);
        let id = SeqId::accession("ref", "NM_000546", Some(5));
        let list = ContentList::new(0, vec![crate::ids::ContentEntry::new(BlobId::main(4, 9), 1)]);

        assert!(writer.save_alias(&id, 42));
        assert!(writer.save_alternate_ids(&id, &[SeqId::Gi(42), SeqId::Local("x".into())]));
        assert!(writer.save_content_list(&id, &list));
        assert!(writer.save_blob_version(&BlobId::main(4, 9), 6));

        assert_eq!(r.load_alias(&id), Some(42));
        assert_eq!(
            r.load_alternate_ids(&id),
            Some(vec![SeqId::Gi(42), SeqId::Local("x".into())])
        );
        assert_eq!(r.load_content_list(&id), Some(list));
        assert_eq!(r.load_blob_version(&BlobId::main(4, 9)), Some(6));
    }
}
