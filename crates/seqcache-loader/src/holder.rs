use std::sync::Arc;

use seqcache_store::{BlobStore, Clock, StoreResult, SystemClock};
use tracing::info;

use crate::config::{CacheSection, LoaderConfig};
use crate::ids::IdentifierCache;

/// The pair of stores behind the adapters.
///
/// Either store may be absent: a disabled section leaves its slot empty and
/// every operation against it becomes a miss.
#[derive(Clone, Debug, Default)]
pub struct CacheHolder {
    id_cache: Option<Arc<BlobStore>>,
    blob_cache: Option<Arc<BlobStore>>,
}

impl CacheHolder {
    pub fn new(id_cache: Option<Arc<BlobStore>>, blob_cache: Option<Arc<BlobStore>>) -> Self {
        Self {
            id_cache,
            blob_cache,
        }
    }

    /// Open the enabled stores described by `config`.
    pub fn open(config: &LoaderConfig) -> StoreResult<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(config: &LoaderConfig, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        config.validate()?;
        let holder = Self {
            id_cache: open_section(&config.id_cache, clock.clone())?,
            blob_cache: open_section(&config.blob_cache, clock)?,
        };
        info!(
            id_cache = holder.id_cache.is_some(),
            blob_cache = holder.blob_cache.is_some(),
            "opened cache holder"
        );
        Ok(holder)
    }

    pub fn id_cache(&self) -> Option<&Arc<BlobStore>> {
        self.id_cache.as_ref()
    }

    pub fn blob_cache(&self) -> Option<&Arc<BlobStore>> {
        self.blob_cache.as_ref()
    }

    /// Identifier record access over the id cache, if it is open.
    pub fn identifiers(&self) -> Option<IdentifierCache> {
        self.id_cache.clone().map(IdentifierCache::new)
    }

    pub fn set_id_cache(&mut self, store: Option<Arc<BlobStore>>) {
        self.id_cache = store;
    }

    pub fn set_blob_cache(&mut self, store: Option<Arc<BlobStore>>) {
        self.blob_cache = store;
    }
}

fn open_section(section: &CacheSection, clock: Arc<dyn Clock>) -> StoreResult<Option<Arc<BlobStore>>> {
    if !section.enabled {
        return Ok(None);
    }
    let store = BlobStore::open_with_clock(section.store.clone(), clock)?;
    Ok(Some(Arc::new(store)))
}
