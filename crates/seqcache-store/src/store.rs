//! The blob store: attribute rows and inline payloads in an ordered
//! key-value backend, oversized payloads in overflow files.
//!
//! # Locking
//!
//! Every operation that touches the backend or the overflow namespace runs
//! under one store-wide mutex. Streaming bytes out of an already opened
//! reader, and buffering bytes into a writer, happen outside it; only the
//! lookup/open and commit steps are serialized.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::backend::{KvBackend, Table};
use crate::clock::{Clock, SystemClock};
use crate::config::{KeepVersions, StoreConfig};
use crate::entry::{family_prefix, AttributeRecord, EntryKey};
use crate::error::{StoreError, StoreResult};
use crate::overflow::overflow_path;
use crate::redb_backend::RedbBackend;
use crate::stream::{BlobReader, BlobWriter};

/// Counts describing the current store contents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub entries: usize,
    pub overflow_entries: usize,
}

/// Disk-backed, versioned blob store.
pub struct BlobStore {
    backend: Box<dyn KvBackend>,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl BlobStore {
    /// Open (or create) the store described by `config` using wall-clock time.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open (or create) the store with an explicit clock.
    pub fn open_with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        config.validate()?;
        let backend = RedbBackend::open(&config.database_path(), config.write_sync)?;
        Self::with_backend(Box::new(backend), config, clock)
    }

    /// Build a store on top of any backend.
    ///
    /// The store root is still created on disk; overflow files live there.
    pub fn with_backend(
        backend: Box<dyn KvBackend>,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> StoreResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.path)?;

        let store = Self {
            backend,
            config,
            clock,
            lock: Mutex::new(()),
        };
        info!(
            root = %store.root().display(),
            name = %store.config.name,
            inline_threshold = store.config.inline_threshold,
            "opened blob store"
        );

        if store.config.purge_on_open {
            store.purge_expired()?;
        }
        Ok(store)
    }

    /// Store root directory.
    pub fn root(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Largest payload kept inline.
    pub fn inline_threshold(&self) -> usize {
        self.config.inline_threshold
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> u64 {
        self.clock.now_secs()
    }

    /// Deterministic overflow file path for an entry.
    pub fn overflow_path(&self, key: &str, version: i32, subkey: &str) -> PathBuf {
        overflow_path(self.root(), &EntryKey::new(key, version, subkey))
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Store a complete payload.
    ///
    /// If an entry for `(key, version, subkey)` already exists the call is
    /// a no-op: the first writer of a version wins. On failure the entry is
    /// removed before the error is returned.
    pub fn store(&self, key: &str, version: i32, subkey: &str, data: &[u8]) -> StoreResult<()> {
        let entry = EntryKey::new(key, version, subkey);
        entry.encode()?;

        {
            let _guard = self.lock();
            if self.read_attr_locked(&entry)?.is_some() {
                debug!(entry = %entry, "entry already cached; store is a no-op");
                return Ok(());
            }
            self.apply_keep_policy_locked(&entry)?;
        }

        let result = BlobWriter::new(self, entry.clone(), false)
            .and_then(|mut writer| {
                writer.write_all(data)?;
                writer.close()
            });
        if let Err(e) = result {
            warn!(entry = %entry, error = %e, "store failed; removing entry");
            self.remove_entry_quietly(&entry);
            return Err(e);
        }
        debug!(entry = %entry, len = data.len(), "stored entry");
        Ok(())
    }

    /// Open a write stream for `(key, version, subkey)`.
    ///
    /// The version retention policy is applied before the stream is handed
    /// out. Closing the stream replaces any existing entry for the same
    /// triple; dropping or aborting it leaves the store untouched.
    pub fn open_write(&self, key: &str, version: i32, subkey: &str) -> StoreResult<BlobWriter<'_>> {
        let entry = EntryKey::new(key, version, subkey);
        entry.encode()?;
        {
            let _guard = self.lock();
            self.apply_keep_policy_locked(&entry)?;
        }
        BlobWriter::new(self, entry, true)
    }

    /// Commit a buffered payload as an inline row. Returns `false` when an
    /// existing entry was kept instead.
    pub(crate) fn commit_inline(&self, entry: &EntryKey, data: &[u8], replace: bool) -> StoreResult<bool> {
        let _guard = self.lock();
        let encoded = entry.encode()?;

        if let Some(existing) = self.read_attr_locked(entry)? {
            if !replace {
                return Ok(false);
            }
            if existing.overflow {
                remove_file_if_exists(&overflow_path(self.root(), entry))?;
            }
        }

        self.backend.put(Table::Payloads, &encoded, data)?;
        let record = AttributeRecord::new(entry, self.now(), false);
        self.backend.put(Table::Attributes, &encoded, &record.to_bytes()?)?;
        debug!(entry = %entry, len = data.len(), "committed inline entry");
        Ok(true)
    }

    /// Commit a staged overflow file. Returns `false` when an existing entry
    /// was kept instead; the staged file is then discarded.
    pub(crate) fn commit_overflow(
        &self,
        entry: &EntryKey,
        staged: NamedTempFile,
        replace: bool,
    ) -> StoreResult<bool> {
        let _guard = self.lock();
        let encoded = entry.encode()?;

        if self.read_attr_locked(entry)?.is_some() && !replace {
            return Ok(false);
        }

        let path = overflow_path(self.root(), entry);
        staged.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        self.backend.delete(Table::Payloads, &encoded)?;
        let record = AttributeRecord::new(entry, self.now(), true);
        self.backend.put(Table::Attributes, &encoded, &record.to_bytes()?)?;
        debug!(entry = %entry, path = %path.display(), "committed overflow entry");
        Ok(true)
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// Open a read stream, refreshing the entry's access time.
    ///
    /// Returns `Ok(None)` if the entry does not exist. An entry whose
    /// attribute row survives but whose payload is gone is removed and
    /// reported as absent.
    pub fn open_read(&self, key: &str, version: i32, subkey: &str) -> StoreResult<Option<BlobReader>> {
        let entry = EntryKey::new(key, version, subkey);
        let encoded = entry.encode()?;
        let _guard = self.lock();

        let Some(mut record) = self.read_attr_locked(&entry)? else {
            if self.backend.get(Table::Attributes, &encoded)?.is_some() {
                self.drop_entry_locked(&entry)?;
            }
            return Ok(None);
        };

        let reader = if record.overflow {
            let path = overflow_path(self.root(), &entry);
            match File::open(&path) {
                Ok(file) => BlobReader::overflow(file)?,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!(entry = %entry, path = %path.display(), "overflow file missing; dropping entry");
                    self.drop_entry_locked(&entry)?;
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            match self.backend.get(Table::Payloads, &encoded)? {
                Some(data) => BlobReader::inline(data),
                None => {
                    warn!(entry = %entry, "inline payload missing; dropping entry");
                    self.drop_entry_locked(&entry)?;
                    return Ok(None);
                }
            }
        };

        record.last_access = self.now();
        self.backend.put(Table::Attributes, &encoded, &record.to_bytes()?)?;
        Ok(Some(reader))
    }

    /// Read a whole payload into memory.
    pub fn load(&self, key: &str, version: i32, subkey: &str) -> StoreResult<Option<Vec<u8>>> {
        let Some(mut reader) = self.open_read(key, version, subkey)? else {
            return Ok(None);
        };
        let mut data = Vec::with_capacity(reader.len() as usize);
        reader.read_to_end(&mut data)?;
        Ok(Some(data))
    }

    /// Payload length without opening a stream.
    pub fn size(&self, key: &str, version: i32, subkey: &str) -> StoreResult<Option<u64>> {
        let entry = EntryKey::new(key, version, subkey);
        let encoded = entry.encode()?;
        let _guard = self.lock();

        let Some(record) = self.read_attr_locked(&entry)? else {
            return Ok(None);
        };
        if record.overflow {
            match std::fs::metadata(overflow_path(self.root(), &entry)) {
                Ok(meta) => Ok(Some(meta.len())),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        } else {
            self.backend.value_len(Table::Payloads, &encoded)
        }
    }

    /// Returns `true` if an entry exists for the triple.
    pub fn exists(&self, key: &str, version: i32, subkey: &str) -> StoreResult<bool> {
        let entry = EntryKey::new(key, version, subkey);
        let _guard = self.lock();
        Ok(self.read_attr_locked(&entry)?.is_some())
    }

    /// Attribute row of an entry, if present. Does not refresh access time.
    pub fn attributes(&self, key: &str, version: i32, subkey: &str) -> StoreResult<Option<AttributeRecord>> {
        let entry = EntryKey::new(key, version, subkey);
        let _guard = self.lock();
        self.read_attr_locked(&entry)
    }

    /// Last access time of an entry, in seconds since the UNIX epoch.
    pub fn access_time(&self, key: &str, version: i32, subkey: &str) -> StoreResult<Option<u64>> {
        Ok(self.attributes(key, version, subkey)?.map(|r| r.last_access))
    }

    /// Returns `true` if any version of `key` is stored under `subkey`.
    pub fn has_blobs(&self, key: &str, subkey: &str) -> StoreResult<bool> {
        let _guard = self.lock();
        Ok(self
            .family_locked(key)?
            .iter()
            .any(|record| record.subkey == subkey))
    }

    /// Distinct versions stored for `key`, ascending.
    pub fn versions(&self, key: &str) -> StoreResult<Vec<i32>> {
        let _guard = self.lock();
        let mut versions: Vec<i32> = self
            .family_locked(key)?
            .iter()
            .map(|record| record.version)
            .collect();
        versions.dedup();
        Ok(versions)
    }

    /// Entry and overflow counts from a full attribute scan.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let _guard = self.lock();
        let records = self.scan_locked(&[])?;
        Ok(StoreStats {
            entries: records.len(),
            overflow_entries: records.iter().filter(|r| r.overflow).count(),
        })
    }

    // ---------------------------------------------------------------
    // Removal
    // ---------------------------------------------------------------

    /// Remove one entry. Removing an absent entry is not an error.
    pub fn remove(&self, key: &str, version: i32, subkey: &str) -> StoreResult<()> {
        let entry = EntryKey::new(key, version, subkey);
        entry.encode()?;
        let _guard = self.lock();
        self.drop_entry_locked(&entry)?;
        debug!(entry = %entry, "removed entry");
        Ok(())
    }

    /// Remove every version and subkey of `key`.
    pub fn remove_key(&self, key: &str) -> StoreResult<()> {
        let _guard = self.lock();
        let records = self.family_locked(key)?;
        for record in &records {
            self.drop_entry_locked(&record.entry_key())?;
        }
        debug!(key, removed = records.len(), "removed key");
        Ok(())
    }

    /// Remove an entry after a failed write; failures are only logged.
    pub(crate) fn remove_entry_quietly(&self, entry: &EntryKey) {
        if let Err(e) = self.remove(&entry.key, entry.version, &entry.subkey) {
            warn!(entry = %entry, error = %e, "cleanup after failed write also failed");
        }
    }

    // ---------------------------------------------------------------
    // Internals; callers hold the store lock.
    // ---------------------------------------------------------------

    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().expect("blob store lock poisoned")
    }

    pub(crate) fn backend(&self) -> &dyn KvBackend {
        self.backend.as_ref()
    }

    /// Attribute row of an entry; an undecodable row counts as absent.
    fn read_attr_locked(&self, entry: &EntryKey) -> StoreResult<Option<AttributeRecord>> {
        let Some(bytes) = self.backend.get(Table::Attributes, &entry.encode()?)? else {
            return Ok(None);
        };
        match AttributeRecord::from_bytes(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(entry = %entry, error = %e, "corrupt attribute row; treating as absent");
                Ok(None)
            }
        }
    }

    /// All attribute rows of `key`, ascending by version.
    pub(crate) fn family_locked(&self, key: &str) -> StoreResult<Vec<AttributeRecord>> {
        self.scan_locked(&family_prefix(key)?)
    }

    /// Attribute rows under `prefix`. Corrupt rows are dropped as found.
    pub(crate) fn scan_locked(&self, prefix: &[u8]) -> StoreResult<Vec<AttributeRecord>> {
        let rows = self.backend.scan_prefix(Table::Attributes, prefix)?;
        let mut records = Vec::with_capacity(rows.len());
        for (raw_key, value) in rows {
            match AttributeRecord::from_bytes(&value) {
                Ok(record) => records.push(record),
                Err(e) => match EntryKey::decode(&raw_key) {
                    Ok(entry) => {
                        warn!(entry = %entry, error = %e, "corrupt attribute row; dropping entry");
                        self.drop_entry_locked(&entry)?;
                    }
                    Err(_) => {
                        warn!(error = %e, "undecodable attribute row; deleting");
                        self.backend.delete(Table::Attributes, &raw_key)?;
                        self.backend.delete(Table::Payloads, &raw_key)?;
                    }
                },
            }
        }
        Ok(records)
    }

    /// Delete the overflow file, inline row and attribute row of an entry.
    ///
    /// The overflow file is removed first so that a failure never leaves
    /// an attribute row pointing at a half-deleted payload.
    pub(crate) fn drop_entry_locked(&self, entry: &EntryKey) -> StoreResult<()> {
        let encoded = entry.encode()?;
        remove_file_if_exists(&overflow_path(self.root(), entry))?;
        self.backend.delete(Table::Payloads, &encoded)?;
        self.backend.delete(Table::Attributes, &encoded)?;
        Ok(())
    }

    /// Drop other versions of the entry's key as the retention policy says.
    fn apply_keep_policy_locked(&self, entry: &EntryKey) -> StoreResult<()> {
        let policy = self.config.keep_versions;
        if policy == KeepVersions::KeepAll {
            return Ok(());
        }
        for record in self.family_locked(&entry.key)? {
            let superseded = match policy {
                KeepVersions::DropOlder => record.version < entry.version,
                KeepVersions::DropAll => record.version != entry.version,
                KeepVersions::KeepAll => false,
            };
            if superseded {
                debug!(entry = %record.entry_key(), ?policy, "dropping superseded version");
                self.drop_entry_locked(&record.entry_key())?;
            }
        }
        Ok(())
    }
}

pub(crate) fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("root", &self.config.path)
            .field("name", &self.config.name)
            .field("inline_threshold", &self.config.inline_threshold)
            .finish()
    }
}
