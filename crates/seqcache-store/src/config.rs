use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Default inline threshold: payloads up to 2 MiB stay in the database.
pub const DEFAULT_INLINE_THRESHOLD: usize = 2 * 1024 * 1024;

/// Default access-time expiry: 5 days.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5 * 24 * 60 * 60;

/// What happens to other versions of a key when a new version is written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepVersions {
    /// Keep every version.
    #[default]
    #[serde(alias = "all")]
    KeepAll,
    /// Drop versions older than the one being written.
    DropOlder,
    /// Drop every version other than the one being written.
    DropAll,
}

/// Configuration for one blob store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store root: holds the database file and the overflow files.
    pub path: PathBuf,
    /// Database file stem (`<name>.redb`).
    pub name: String,
    /// Largest payload kept inline; anything bigger goes to an overflow file.
    pub inline_threshold: usize,
    /// Version retention policy applied on write.
    pub keep_versions: KeepVersions,
    /// Entries not accessed for this long are removed by `purge_expired`.
    pub timeout_secs: u64,
    /// Run `purge_expired` when the store is opened.
    pub purge_on_open: bool,
    /// Make every commit durable before returning.
    pub write_sync: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".genbank_cache"),
            name: "blobs".to_string(),
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
            keep_versions: KeepVersions::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            purge_on_open: false,
            write_sync: false,
        }
    }
}

impl StoreConfig {
    /// Default configuration rooted at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Parse a configuration from TOML; missing fields take their defaults.
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

    /// Check invariants the store relies on.
    pub fn validate(&self) -> StoreResult<()> {
        if self.name.is_empty() {
            return Err(StoreError::Config("store name must not be empty".into()));
        }
        if self.name.contains(['/', '\\']) {
            return Err(StoreError::Config(format!(
                "store name {:?} must not contain path separators",
                self.name
            )));
        }
        Ok(())
    }

    /// Path to the database file.
    pub fn database_path(&self) -> PathBuf {
        self.path.join(format!("{}.redb", self.name))
    }
}
