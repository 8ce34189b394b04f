//! Read-through side: look in the cache first, report a miss otherwise.
//!
//! Nothing here returns an error. A store failure, a missing entry, a
//! version that is not cached, and a rejected header all come back as
//! `None`; the caller then goes to the origin.

use bytes::Bytes;
use seqcache_store::BlobStore;
use seqcache_types::keys::{blob_key, chunk_subkey};
use seqcache_types::{BlobId, ChunkId, SeqId};
use tracing::{debug, warn};

use crate::header::{FormatRegistry, RecordFormat, HEADER_LEN};
use crate::holder::CacheHolder;
use crate::ids::ContentList;

/// A cached chunk with its header stripped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedChunk {
    pub format: RecordFormat,
    pub data: Bytes,
}

/// Source of the current version of a blob when the cache has none.
///
/// Usually backed by the origin service.
pub trait VersionResolver {
    fn resolve_version(&self, blob_id: &BlobId) -> Option<i32>;
}

impl<F> VersionResolver for F
where
    F: Fn(&BlobId) -> Option<i32>,
{
    fn resolve_version(&self, blob_id: &BlobId) -> Option<i32> {
        self(blob_id)
    }
}

/// Cache-first lookups over a [`CacheHolder`].
#[derive(Clone, Debug)]
pub struct ReadThroughAdapter {
    holder: CacheHolder,
    formats: FormatRegistry,
}

impl ReadThroughAdapter {
    /// Chunks are accepted only in the formats registered in `formats`.
    pub fn new(holder: CacheHolder, formats: FormatRegistry) -> Self {
        Self { holder, formats }
    }

    pub fn holder(&self) -> &CacheHolder {
        &self.holder
    }

    pub fn formats(&self) -> &FormatRegistry {
        &self.formats
    }

    // ---------------------------------------------------------------
    // Blob chunks
    // ---------------------------------------------------------------

    /// Load one chunk of `blob_id` at exactly `version`.
    pub fn load_chunk(&self, blob_id: &BlobId, version: i32, chunk: ChunkId) -> Option<CachedChunk> {
        let store = self.holder.blob_cache()?;
        let key = blob_key(blob_id);
        let subkey = chunk_subkey(chunk);

        let record = match store.load(&key, version, &subkey) {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(key = %key, version, chunk = %chunk, "chunk cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %key, version, chunk = %chunk, error = %e, "chunk cache read failed");
                return None;
            }
        };

        let format = match self.formats.split(&record) {
            Ok((format, _)) => format,
            Err(e) => {
                warn!(key = %key, version, chunk = %chunk, error = %e, "rejected cached chunk");
                return None;
            }
        };
        debug!(key = %key, version, chunk = %chunk, len = record.len(), "chunk cache hit");
        Some(CachedChunk {
            format,
            data: Bytes::from(record).slice(HEADER_LEN..),
        })
    }

    /// Load the main chunk.
    pub fn load_blob(&self, blob_id: &BlobId, version: i32) -> Option<CachedChunk> {
        self.load_chunk(blob_id, version, ChunkId::MAIN)
    }

    /// Returns `true` if any version of the chunk is cached.
    pub fn has_blobs(&self, blob_id: &BlobId, chunk: ChunkId) -> bool {
        let Some(store) = self.holder.blob_cache() else {
            return false;
        };
        store
            .has_blobs(&blob_key(blob_id), &chunk_subkey(chunk))
            .unwrap_or_else(|e| {
                warn!(blob = %blob_id, error = %e, "blob presence check failed");
                false
            })
    }

    /// Cached current version of a blob.
    pub fn load_blob_version(&self, blob_id: &BlobId) -> Option<i32> {
        let ids = self.holder.identifiers()?;
        ids.load_blob_version(blob_id).unwrap_or_else(|e| {
            warn!(blob = %blob_id, error = %e, "blob version read failed");
            None
        })
    }

    /// Load a chunk when the caller does not know the blob version.
    ///
    /// Gives up early if no version of the chunk is cached. Otherwise the
    /// version comes from the cached version record, or failing that from
    /// `resolver`; a resolved version is cached for next time.
    pub fn load_chunk_resolving(
        &self,
        blob_id: &BlobId,
        chunk: ChunkId,
        resolver: &dyn VersionResolver,
    ) -> Option<CachedChunk> {
        if !self.has_blobs(blob_id, chunk) {
            return None;
        }
        let version = match self.load_blob_version(blob_id) {
            Some(version) => version,
            None => {
                let version = resolver.resolve_version(blob_id)?;
                self.remember_blob_version(blob_id, version);
                version
            }
        };
        self.load_chunk(blob_id, version, chunk)
    }

    fn remember_blob_version(&self, blob_id: &BlobId, version: i32) {
        let Some(ids) = self.holder.identifiers() else {
            return;
        };
        if let Err(e) = ids.save_blob_version(blob_id, version) {
            warn!(blob = %blob_id, version, error = %e, "caching resolved blob version failed");
        }
    }

    // ---------------------------------------------------------------
    // Identifier records
    // ---------------------------------------------------------------

    pub fn load_alias(&self, id: &SeqId) -> Option<i64> {
        let ids = self.holder.identifiers()?;
        ids.load_alias(id).unwrap_or_else(|e| {
            warn!(id = %id, error = %e, "alias read failed");
            None
        })
    }

    pub fn load_alternate_ids(&self, id: &SeqId) -> Option<Vec<SeqId>> {
        let ids = self.holder.identifiers()?;
        ids.load_alternate_ids(id).unwrap_or_else(|e| {
            warn!(id = %id, error = %e, "alternate id read failed");
            None
        })
    }

    pub fn load_content_list(&self, id: &SeqId) -> Option<ContentList> {
        let ids = self.holder.identifiers()?;
        ids.load_content_list(id).unwrap_or_else(|e| {
            warn!(id = %id, error = %e, "content list read failed");
            None
        })
    }

    /// Blob cache store, for callers that stream chunks themselves.
    pub fn blob_store(&self) -> Option<&BlobStore> {
        self.holder.blob_cache().map(|store| store.as_ref())
    }
}
