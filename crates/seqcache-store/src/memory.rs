use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use crate::backend::{prefix_upper_bound, KvBackend, Table};
use crate::error::StoreResult;

type OrderedTable = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory, `BTreeMap`-based key-value backend.
///
/// Intended for tests and embedding. Each table is an ordered map behind a
/// `RwLock`; values are cloned on read and write. Data is lost when the
/// backend is dropped.
pub struct InMemoryBackend {
    attributes: RwLock<OrderedTable>,
    payloads: RwLock<OrderedTable>,
}

impl InMemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self {
            attributes: RwLock::new(BTreeMap::new()),
            payloads: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of rows in a table.
    pub fn len(&self, table: Table) -> usize {
        self.table(table).read().expect("lock poisoned").len()
    }

    /// Returns `true` if both tables are empty.
    pub fn is_empty(&self) -> bool {
        Table::ALL.iter().all(|t| self.len(*t) == 0)
    }

    fn table(&self, table: Table) -> &RwLock<OrderedTable> {
        match table {
            Table::Attributes => &self.attributes,
            Table::Payloads => &self.payloads,
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl KvBackend for InMemoryBackend {
    fn get(&self, table: Table, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let map = self.table(table).read().expect("lock poisoned");
        Ok(map.get(key).cloned())
    }

    fn put(&self, table: Table, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let mut map = self.table(table).write().expect("lock poisoned");
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, table: Table, key: &[u8]) -> StoreResult<bool> {
        let mut map = self.table(table).write().expect("lock poisoned");
        Ok(map.remove(key).is_some())
    }

    fn scan_prefix(&self, table: Table, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let map = self.table(table).read().expect("lock poisoned");
        let upper = match prefix_upper_bound(prefix) {
            Some(bound) => Bound::Excluded(bound),
            None => Bound::Unbounded,
        };
        Ok(map
            .range((Bound::Included(prefix.to_vec()), upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn truncate(&self, table: Table) -> StoreResult<()> {
        self.table(table).write().expect("lock poisoned").clear();
        Ok(())
    }

    fn value_len(&self, table: Table, key: &[u8]) -> StoreResult<Option<u64>> {
        let map = self.table(table).read().expect("lock poisoned");
        Ok(map.get(key).map(|v| v.len() as u64))
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("attributes", &self.len(Table::Attributes))
            .field("payloads", &self.len(Table::Payloads))
            .finish()
    }
}
