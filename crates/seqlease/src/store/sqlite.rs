use crate::{CounterStore, StoreError, Table};
use core::time::Duration;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::path::Path;

/// Default time a transaction waits on a locked database before failing
/// with [`StoreError::Busy`].
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS lease_table (
    shard_id   INTEGER PRIMARY KEY,
    next_value INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS counter_table (
    counter_class INTEGER PRIMARY KEY,
    next_value    INTEGER NOT NULL
);
";

/// A [`CounterStore`] persisted in a SQLite database.
///
/// Every `fetch_add` runs in a `BEGIN IMMEDIATE` transaction, which takes the
/// database write lock up front. That lock is SQLite's equivalent of
/// `SELECT ... FOR UPDATE`, and it is shared by every process that opens the
/// same file.
///
/// Writes go through a single connection. Callers on an async runtime should
/// run store-bound work on a blocking thread.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` in WAL mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot be
    /// created.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        Self::init(conn, busy_timeout)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, DEFAULT_BUSY_TIMEOUT)
    }

    fn init(conn: Connection, busy_timeout: Duration) -> Result<Self, StoreError> {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

const fn select_sql(table: Table) -> &'static str {
    match table {
        Table::Lease => "SELECT next_value FROM lease_table WHERE shard_id = ?1",
        Table::Counter => "SELECT next_value FROM counter_table WHERE counter_class = ?1",
    }
}

const fn update_sql(table: Table) -> &'static str {
    match table {
        Table::Lease => "UPDATE lease_table SET next_value = ?1 WHERE shard_id = ?2",
        Table::Counter => "UPDATE counter_table SET next_value = ?1 WHERE counter_class = ?2",
    }
}

const fn insert_sql(table: Table) -> &'static str {
    match table {
        Table::Lease => "INSERT OR IGNORE INTO lease_table (shard_id, next_value) VALUES (?1, ?2)",
        Table::Counter => {
            "INSERT OR IGNORE INTO counter_table (counter_class, next_value) VALUES (?1, ?2)"
        }
    }
}

// SQLite integers are signed 64-bit.
fn to_sql(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::OutOfRange {
        value: i128::from(value),
    })
}

fn from_sql(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::OutOfRange {
        value: i128::from(value),
    })
}

impl CounterStore for SqliteStore {
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip(self)))]
    fn fetch_add(&self, table: Table, key: u64, delta: u64) -> Result<Option<u64>, StoreError> {
        let key_sql = to_sql(key)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<i64> = tx
            .query_row(select_sql(table), params![key_sql], |row| row.get(0))
            .optional()?;
        // Dropping `tx` rolls back; nothing was written.
        let Some(current) = current else {
            return Ok(None);
        };
        let current = from_sql(current)?;
        let next = current
            .checked_add(delta)
            .ok_or(StoreError::Overflow { table, key, delta })?;

        tx.execute(update_sql(table), params![to_sql(next)?, key_sql])?;
        tx.commit()?;
        Ok(Some(current))
    }

    fn insert_if_absent(&self, table: Table, key: u64, seed: u64) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(insert_sql(table), params![to_sql(key)?, to_sql(seed)?])?;
        Ok(())
    }
}
