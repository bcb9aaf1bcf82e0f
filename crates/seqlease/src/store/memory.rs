use crate::{CounterStore, StoreError, Table};
use parking_lot::Mutex;
use portable_atomic::{AtomicU64, Ordering};
use std::collections::HashMap;

/// An in-process [`CounterStore`].
///
/// A single mutex plays the role of the row lock, which gives the same
/// serialization a transactional store provides. Rows outlive any
/// [`Allocator`](crate::Allocator) built on top of the store, so sharing one
/// `Arc<MemoryStore>` between successive allocators models a process restart
/// against a surviving database.
///
/// The store also counts successful [`fetch_add`](CounterStore::fetch_add)
/// calls per table.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<(Table, u64), u64>>,
    lease_fetches: AtomicU64,
    counter_fetches: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The value currently persisted for `key`, if the row exists.
    pub fn value(&self, table: Table, key: u64) -> Option<u64> {
        self.rows.lock().get(&(table, key)).copied()
    }

    /// Number of successful `fetch_add` calls made against `table`.
    pub fn fetches(&self, table: Table) -> u64 {
        self.counter(table).load(Ordering::Relaxed)
    }

    const fn counter(&self, table: Table) -> &AtomicU64 {
        match table {
            Table::Lease => &self.lease_fetches,
            Table::Counter => &self.counter_fetches,
        }
    }
}

impl CounterStore for MemoryStore {
    fn fetch_add(&self, table: Table, key: u64, delta: u64) -> Result<Option<u64>, StoreError> {
        let mut rows = self.rows.lock();
        let Some(value) = rows.get_mut(&(table, key)) else {
            return Ok(None);
        };
        let current = *value;
        *value = current
            .checked_add(delta)
            .ok_or(StoreError::Overflow { table, key, delta })?;
        self.counter(table).fetch_add(1, Ordering::Relaxed);
        Ok(Some(current))
    }

    fn insert_if_absent(&self, table: Table, key: u64, seed: u64) -> Result<(), StoreError> {
        self.rows.lock().entry((table, key)).or_insert(seed);
        Ok(())
    }
}
