use crate::Table;

/// Failures reported by a [`CounterStore`](crate::CounterStore).
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// The row or database is locked by another transaction.
    #[error("store busy: {reason}")]
    Busy { reason: String },

    /// The backend cannot be reached.
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    /// Incrementing the row would overflow `u64`. Nothing was written.
    #[error("{table} row {key} overflows when adding {delta}")]
    Overflow { table: Table, key: u64, delta: u64 },

    /// A value does not fit the backend's integer column.
    #[error("value {value} is out of range for the store")]
    OutOfRange { value: i128 },

    /// Any other SQLite failure.
    #[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
    #[cfg(feature = "sqlite")]
    #[error("sqlite: {0}")]
    Sqlite(#[source] rusqlite::Error),
}

impl StoreError {
    /// Returns `true` for failures a later retry may not hit.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Busy { .. } | Self::Unavailable { .. })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => Self::Busy {
                reason: err.to_string(),
            },
            _ => Self::Sqlite(err),
        }
    }
}
