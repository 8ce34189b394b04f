//! Eviction: full reset, access-time cutoff, and per-key version policy.
//!
//! There is no access-time index, so time-based purges scan every attribute
//! row. Each purge runs under the store lock from start to finish.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::backend::Table;
use crate::config::KeepVersions;
use crate::entry::AttributeRecord;
use crate::error::StoreResult;
use crate::overflow::{list_overflow_files, list_staging_files};
use crate::store::{remove_file_if_exists, BlobStore};

/// Summary of a purge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Entries (attribute rows) removed.
    pub entries_removed: usize,
    /// Overflow files deleted.
    pub overflow_files_removed: usize,
}

impl BlobStore {
    /// Remove everything: truncate both tables and delete every overflow
    /// and staging file under the store root.
    pub fn purge_all(&self) -> StoreResult<PurgeReport> {
        let _guard = self.lock();

        let entries_removed = self.backend().scan_prefix(Table::Attributes, &[])?.len();
        for table in Table::ALL {
            self.backend().truncate(table)?;
        }

        let mut overflow_files_removed = 0;
        for path in list_overflow_files(self.root())? {
            if remove_file_if_exists(&path)? {
                overflow_files_removed += 1;
            }
        }
        for path in list_staging_files(self.root())? {
            remove_file_if_exists(&path)?;
        }

        let report = PurgeReport {
            entries_removed,
            overflow_files_removed,
        };
        info!(
            root = %self.root().display(),
            entries = report.entries_removed,
            overflow_files = report.overflow_files_removed,
            "truncated blob store"
        );
        Ok(report)
    }

    /// Remove every entry last accessed before `cutoff`.
    ///
    /// With `keep_last_version`, entries at the newest version of their key
    /// survive regardless of age.
    pub fn purge_older_than(&self, cutoff: u64, keep_last_version: bool) -> StoreResult<PurgeReport> {
        let _guard = self.lock();
        let records = self.scan_locked(&[])?;

        let newest = if keep_last_version {
            newest_versions(&records)
        } else {
            HashMap::new()
        };

        let mut report = PurgeReport::default();
        for record in &records {
            if record.last_access >= cutoff {
                continue;
            }
            if newest.get(record.key.as_str()) == Some(&record.version) {
                continue;
            }
            self.purge_record_locked(record, &mut report)?;
        }

        debug!(
            cutoff,
            keep_last_version,
            removed = report.entries_removed,
            "purged entries by access time"
        );
        Ok(report)
    }

    /// Purge one key's version family.
    ///
    /// `DropAll` removes the whole family regardless of `cutoff`. `DropOlder`
    /// removes entries accessed before `cutoff` except those at the newest
    /// version. `KeepAll` removes entries accessed before `cutoff`.
    pub fn purge_key(&self, key: &str, cutoff: u64, policy: KeepVersions) -> StoreResult<PurgeReport> {
        let _guard = self.lock();
        let records = self.family_locked(key)?;
        let newest = records.iter().map(|r| r.version).max();

        let mut report = PurgeReport::default();
        for record in &records {
            let purge = match policy {
                KeepVersions::DropAll => true,
                KeepVersions::DropOlder => {
                    record.last_access < cutoff && Some(record.version) != newest
                }
                KeepVersions::KeepAll => record.last_access < cutoff,
            };
            if purge {
                self.purge_record_locked(record, &mut report)?;
            }
        }

        debug!(key, cutoff, ?policy, removed = report.entries_removed, "purged key");
        Ok(report)
    }

    /// Remove entries not accessed within the configured timeout.
    ///
    /// Under `DropOlder` the newest version of every key is kept.
    pub fn purge_expired(&self) -> StoreResult<PurgeReport> {
        let cutoff = self.now().saturating_sub(self.config().timeout_secs);
        let keep_last_version = self.config().keep_versions == KeepVersions::DropOlder;
        let report = self.purge_older_than(cutoff, keep_last_version)?;
        if report.entries_removed > 0 {
            info!(
                cutoff,
                removed = report.entries_removed,
                "purged expired entries"
            );
        }
        Ok(report)
    }

    fn purge_record_locked(&self, record: &AttributeRecord, report: &mut PurgeReport) -> StoreResult<()> {
        if record.overflow {
            report.overflow_files_removed += 1;
        }
        self.drop_entry_locked(&record.entry_key())?;
        report.entries_removed += 1;
        Ok(())
    }
}

/// Highest stored version per key.
fn newest_versions(records: &[AttributeRecord]) -> HashMap<&str, i32> {
    let mut newest: HashMap<&str, i32> = HashMap::new();
    for record in records {
        newest
            .entry(record.key.as_str())
            .and_modify(|v| *v = (*v).max(record.version))
            .or_insert(record.version);
    }
    newest
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::StoreConfig;

    const THRESHOLD: usize = 32;

    fn open_store(root: &Path, clock: Arc<ManualClock>) -> BlobStore {
        let config = StoreConfig {
            inline_threshold: THRESHOLD,
            ..StoreConfig::at(root)
        };
        BlobStore::open_with_clock(config, clock).unwrap()
    }

    // -----------------------------------------------------------------------
    // Access-time purge
    // -----------------------------------------------------------------------

    #[test]
    fn purge_older_than_removes_only_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(100));
        let store = open_store(dir.path(), clock.clone());

        store.store("t1", 1, "", b"a").unwrap();
        clock.set(200);
        store.store("t2", 1, "", b"b").unwrap();
        clock.set(300);
        store.store("t3", 1, "", b"c").unwrap();

        let report = store.purge_older_than(150, false).unwrap();
        assert_eq!(report.entries_removed, 1);
        assert!(!store.exists("t1", 1, "").unwrap());
        assert!(store.exists("t2", 1, "").unwrap());
        assert!(store.exists("t3", 1, "").unwrap());
    }

    #[test]
    fn purge_deletes_overflow_files() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(100));
        let store = open_store(dir.path(), clock.clone());
        store.store("big", 1, "", &[9u8; 4 * THRESHOLD]).unwrap();
        let path = store.overflow_path("big", 1, "");
        assert!(path.exists());

        let report = store.purge_older_than(101, false).unwrap();
        assert_eq!(report.overflow_files_removed, 1);
        assert!(!path.exists());
    }

    #[test]
    fn keep_last_version_spares_newest() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(100));
        let store = open_store(dir.path(), clock.clone());
        store.store("k", 1, "", b"old").unwrap();
        store.store("k", 2, "", b"new").unwrap();
        store.store("k", 2, "3", b"new-chunk").unwrap();
        clock.set(1_000);

        store.purge_older_than(500, true).unwrap();
        assert_eq!(store.versions("k").unwrap(), vec![2]);
        assert!(store.exists("k", 2, "3").unwrap());

        store.purge_older_than(500, false).unwrap();
        assert!(store.versions("k").unwrap().is_empty());
    }

    #[test]
    fn reads_protect_from_purge() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(100));
        let store = open_store(dir.path(), clock.clone());
        store.store("k", 1, "", b"x").unwrap();

        clock.set(400);
        store.load("k", 1, "").unwrap();
        store.purge_older_than(300, false).unwrap();
        assert!(store.exists("k", 1, "").unwrap());
    }

    #[test]
    fn purge_expired_uses_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let config = StoreConfig {
            timeout_secs: 60,
            ..StoreConfig::at(dir.path())
        };
        let store = BlobStore::open_with_clock(config, clock.clone()).unwrap();
        store.store("k", 1, "", b"x").unwrap();

        clock.advance(59);
        assert_eq!(store.purge_expired().unwrap().entries_removed, 0);
        clock.advance(2);
        assert_eq!(store.purge_expired().unwrap().entries_removed, 1);
    }

    #[test]
    fn purge_on_open_evicts_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let config = StoreConfig {
            timeout_secs: 60,
            ..StoreConfig::at(dir.path())
        };
        {
            let store = BlobStore::open_with_clock(config.clone(), clock.clone()).unwrap();
            store.store("k", 1, "", b"x").unwrap();
        }
        clock.advance(3_600);
        let config = StoreConfig {
            purge_on_open: true,
            ..config
        };
        let store = BlobStore::open_with_clock(config, clock).unwrap();
        assert!(!store.exists("k", 1, "").unwrap());
    }

    // -----------------------------------------------------------------------
    // Per-key purge
    // -----------------------------------------------------------------------

    fn seed_family(store: &BlobStore, clock: &ManualClock) {
        clock.set(100);
        store.store("k", 1, "", b"v1").unwrap();
        store.store("k", 2, "", b"v2").unwrap();
        store.store("other", 1, "", b"o").unwrap();
        clock.set(1_000);
    }

    #[test]
    fn purge_key_drop_all_removes_family() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let store = open_store(dir.path(), clock.clone());
        seed_family(&store, &clock);

        let report = store.purge_key("k", 0, KeepVersions::DropAll).unwrap();
        assert_eq!(report.entries_removed, 2);
        assert!(store.versions("k").unwrap().is_empty());
        assert!(store.exists("other", 1, "").unwrap());
    }

    #[test]
    fn purge_key_drop_older_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let store = open_store(dir.path(), clock.clone());
        seed_family(&store, &clock);

        store.purge_key("k", 500, KeepVersions::DropOlder).unwrap();
        assert_eq!(store.versions("k").unwrap(), vec![2]);
    }

    #[test]
    fn purge_key_keep_all_honors_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let store = open_store(dir.path(), clock.clone());
        seed_family(&store, &clock);

        assert_eq!(
            store.purge_key("k", 50, KeepVersions::KeepAll).unwrap(),
            PurgeReport::default()
        );
        store.purge_key("k", 500, KeepVersions::KeepAll).unwrap();
        assert!(store.versions("k").unwrap().is_empty());
        assert!(store.exists("other", 1, "").unwrap());
    }

    // -----------------------------------------------------------------------
    // Full reset
    // -----------------------------------------------------------------------

    #[test]
    fn purge_all_resets_store() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let store = open_store(dir.path(), clock);
        store.store("a", 1, "", b"x").unwrap();
        store.store("b", 1, "", &[1u8; 4 * THRESHOLD]).unwrap();
        std::fs::write(dir.path().join(".staging-left.ov_tmp"), b"partial").unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"unrelated").unwrap();

        let report = store.purge_all().unwrap();
        assert_eq!(
            report,
            PurgeReport {
                entries_removed: 2,
                overflow_files_removed: 1
            }
        );
        assert_eq!(store.stats().unwrap().entries, 0);
        assert!(list_overflow_files(dir.path()).unwrap().is_empty());
        assert!(list_staging_files(dir.path()).unwrap().is_empty());
        assert!(dir.path().join("keep.txt").exists());
        assert!(dir.path().join("blobs.redb").exists());

        // The store stays usable after a reset.
        store.store("a", 1, "", b"y").unwrap();
        assert_eq!(store.load("a", 1, "").unwrap().unwrap(), b"y");
    }
}
