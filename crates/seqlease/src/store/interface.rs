use crate::StoreError;
use core::fmt;

/// The two durable tables the allocators touch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    /// `lease_table(shard_id, next_value)`: the highest value ever leased
    /// per coarse shard.
    Lease,
    /// `counter_table(counter_class, next_value)`: the next value to hand out
    /// per global counter class.
    Counter,
}

impl Table {
    /// SQL table name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Lease => "lease_table",
            Self::Counter => "counter_table",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A durable, transactionally consistent row store of `u64` counters.
///
/// Each method is one transaction, committed before it returns. The row lock
/// taken by [`fetch_add`](Self::fetch_add) is what keeps two processes from
/// leasing the same numbers; in-process locks only avoid redundant calls.
pub trait CounterStore: Send + Sync {
    /// Locks the row for `key`, persists `value + delta` and returns the
    /// pre-increment `value`.
    ///
    /// Returns `Ok(None)` without writing anything when the row is absent.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Overflow`] if `value + delta` exceeds `u64::MAX`.
    /// - Any backend failure; see [`StoreError::is_transient`].
    fn fetch_add(&self, table: Table, key: u64, delta: u64) -> Result<Option<u64>, StoreError>;

    /// Creates the row for `key` holding `seed`, leaving an existing row
    /// untouched.
    ///
    /// # Errors
    ///
    /// Any backend failure.
    fn insert_if_absent(&self, table: Table, key: u64, seed: u64) -> Result<(), StoreError>;
}
