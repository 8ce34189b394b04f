use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use seqcache_store::{StoreConfig, StoreError, StoreResult};

/// Default store name of the identifier cache.
pub const DEFAULT_ID_CACHE_NAME: &str = "ids";
/// Default store name of the blob cache.
pub const DEFAULT_BLOB_CACHE_NAME: &str = "blobs";

/// One cache section: a store configuration plus an on/off switch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSection {
    /// A disabled section opens no store.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(flatten)]
    pub store: StoreConfig,
}

fn enabled_by_default() -> bool {
    true
}

impl CacheSection {
    fn named(name: &str) -> Self {
        Self {
            enabled: true,
            store: StoreConfig {
                name: name.to_string(),
                ..Default::default()
            },
        }
    }

    /// A section that opens nothing.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            store: StoreConfig::default(),
        }
    }
}

/// Configuration of both caches used by the adapters.
///
/// A section given without a `name` keeps its default store name, so
/// `[id_cache]` and `[blob_cache]` never collide unless told to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLoaderConfig")]
pub struct LoaderConfig {
    /// Identifier records and blob versions.
    pub id_cache: CacheSection,
    /// Blob chunks.
    pub blob_cache: CacheSection,
}

#[derive(Deserialize)]
struct RawLoaderConfig {
    #[serde(default)]
    id_cache: Option<toml::Table>,
    #[serde(default)]
    blob_cache: Option<toml::Table>,
}

impl TryFrom<RawLoaderConfig> for LoaderConfig {
    type Error = toml::de::Error;

    fn try_from(raw: RawLoaderConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            id_cache: section_from(raw.id_cache, DEFAULT_ID_CACHE_NAME)?,
            blob_cache: section_from(raw.blob_cache, DEFAULT_BLOB_CACHE_NAME)?,
        })
    }
}

fn section_from(table: Option<toml::Table>, default_name: &str) -> Result<CacheSection, toml::de::Error> {
    let Some(table) = table else {
        return Ok(CacheSection::named(default_name));
    };
    let named = table.contains_key("name");
    let mut section: CacheSection = toml::Value::Table(table).try_into()?;
    if !named {
        section.store.name = default_name.to_string();
    }
    Ok(section)
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            id_cache: CacheSection::named(DEFAULT_ID_CACHE_NAME),
            blob_cache: CacheSection::named(DEFAULT_BLOB_CACHE_NAME),
        }
    }
}

impl LoaderConfig {
    /// Both caches enabled and rooted at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut config = Self::default();
        config.id_cache.store.path = path.clone();
        config.blob_cache.store.path = path;
        config
    }

    /// Parse from TOML. Missing sections and fields take their defaults.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> StoreResult<()> {
        for section in [&self.id_cache, &self.blob_cache] {
            if section.enabled {
                section.store.validate()?;
            }
        }
        if self.id_cache.enabled
            && self.blob_cache.enabled
            && self.id_cache.store.database_path() == self.blob_cache.store.database_path()
        {
            return Err(StoreError::Config(format!(
                "id cache and blob cache share database {}",
                self.id_cache.store.database_path().display()
            )));
        }
        Ok(())
    }
}
