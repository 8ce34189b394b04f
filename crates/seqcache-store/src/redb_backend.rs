//! Redb-backed persistent key-value backend.
//!
//! Both logical tables live in a single redb database file. Every mutating
//! call is its own write transaction; durability follows the `write_sync`
//! setting of the store configuration.

use std::ops::Bound;
use std::path::{Path, PathBuf};

use redb::{Database, Durability, ReadableTable, TableDefinition};
use tracing::debug;

use crate::backend::{prefix_upper_bound, KvBackend, Table};
use crate::error::{StoreError, StoreResult};

const ATTRIBUTES_TABLE: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new(Table::Attributes.name());
const PAYLOADS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new(Table::Payloads.name());

fn definition(table: Table) -> TableDefinition<'static, &'static [u8], &'static [u8]> {
    match table {
        Table::Attributes => ATTRIBUTES_TABLE,
        Table::Payloads => PAYLOADS_TABLE,
    }
}

fn backend<E: Into<redb::Error>>(e: E) -> StoreError {
    StoreError::Backend(e.into().to_string())
}

/// Persistent [`KvBackend`] on top of a redb database file.
pub struct RedbBackend {
    db: Database,
    path: PathBuf,
    durability: Durability,
}

impl RedbBackend {
    /// Create or open the database at `path`.
    ///
    /// Creates the parent directory and both tables if they don't exist.
    /// With `write_sync` every commit is made durable before returning;
    /// otherwise commits are flushed eventually by the engine.
    pub fn open(path: &Path, write_sync: bool) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path).map_err(backend)?;

        let write_txn = db.begin_write().map_err(backend)?;
        for table in Table::ALL {
            write_txn.open_table(definition(table)).map_err(backend)?;
        }
        write_txn.commit().map_err(backend)?;

        debug!(path = %path.display(), "opened redb backend");
        Ok(Self {
            db,
            path: path.to_path_buf(),
            durability: if write_sync {
                Durability::Immediate
            } else {
                Durability::Eventual
            },
        })
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn begin_write(&self) -> StoreResult<redb::WriteTransaction> {
        let mut write_txn = self.db.begin_write().map_err(backend)?;
        write_txn.set_durability(self.durability);
        Ok(write_txn)
    }
}

impl KvBackend for RedbBackend {
    fn get(&self, table: Table, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read().map_err(backend)?;
        let table = read_txn.open_table(definition(table)).map_err(backend)?;
        let value = table.get(key).map_err(backend)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn put(&self, table: Table, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(definition(table)).map_err(backend)?;
            table.insert(key, value).map_err(backend)?;
        }
        write_txn.commit().map_err(backend)?;
        Ok(())
    }

    fn delete(&self, table: Table, key: &[u8]) -> StoreResult<bool> {
        let write_txn = self.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(definition(table)).map_err(backend)?;
            let removed = table.remove(key).map_err(backend)?;
            removed.is_some()
        };
        write_txn.commit().map_err(backend)?;
        Ok(existed)
    }

    fn scan_prefix(&self, table: Table, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let read_txn = self.db.begin_read().map_err(backend)?;
        let table = read_txn.open_table(definition(table)).map_err(backend)?;

        let upper = prefix_upper_bound(prefix);
        let upper_bound = match upper.as_deref() {
            Some(bound) => Bound::Excluded(bound),
            None => Bound::Unbounded,
        };
        let range = table
            .range::<&[u8]>((Bound::Included(prefix), upper_bound))
            .map_err(backend)?;

        let mut rows = Vec::new();
        for item in range {
            let (key, value) = item.map_err(backend)?;
            rows.push((key.value().to_vec(), value.value().to_vec()));
        }
        Ok(rows)
    }

    fn truncate(&self, table: Table) -> StoreResult<()> {
        let write_txn = self.begin_write()?;
        write_txn.delete_table(definition(table)).map_err(backend)?;
        write_txn.open_table(definition(table)).map_err(backend)?;
        write_txn.commit().map_err(backend)?;
        Ok(())
    }

    fn value_len(&self, table: Table, key: &[u8]) -> StoreResult<Option<u64>> {
        let read_txn = self.db.begin_read().map_err(backend)?;
        let table = read_txn.open_table(definition(table)).map_err(backend)?;
        let value = table.get(key).map_err(backend)?;
        Ok(value.map(|v| v.value().len() as u64))
    }
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish()
    }
}
