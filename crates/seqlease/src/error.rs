use crate::StoreError;

/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Boxed error returned by connection managers.
pub type BoxError = Box<dyn core::error::Error + Send + Sync + 'static>;

/// All errors the allocators and the pool can produce.
///
/// Errors fall into three groups:
///
/// - **Transient storage errors** ([`Error::Store`]) are always returned to
///   the caller. The allocators never retry them internally; see
///   [`Error::is_transient`].
/// - **Exhaustion errors** ([`Error::PoolExhausted`],
///   [`Error::SequenceOverflow`], [`Error::LeaseOverflow`]) are returned
///   immediately and never block.
/// - **Contract errors** ([`Error::ShardNotFound`], [`Error::InvalidRequest`],
///   [`Error::InvalidConfig`]) signal misuse and are returned, never panicked.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The durable counter store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A missing row could not be created and read back within the bounded
    /// number of attempts.
    #[error("gave up on {operation} for key {key} after {attempts} attempts")]
    RetriesExhausted {
        operation: &'static str,
        key: u64,
        attempts: usize,
    },

    /// A resync was requested for a shard that has never been leased.
    #[error("shard {shard_id} has no lease")]
    ShardNotFound { shard_id: u64 },

    /// Extending the lease for a shard would overflow `u64`.
    #[error("lease for shard {shard_id} cannot grow any further")]
    LeaseOverflow { shard_id: u64 },

    /// The entity's cursor has reached the end of the `u64` space.
    #[error("sequence space exhausted for entity {entity_key}")]
    SequenceOverflow { entity_key: u64 },

    /// The caller passed an argument outside the accepted domain.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// A configuration value failed validation.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The pool has been released.
    #[error("pool is closed")]
    PoolClosed,

    /// Every connection slot is in use.
    #[error("pool exhausted ({max_active} connections active)")]
    PoolExhausted { max_active: usize },

    /// The connection manager failed to open a connection.
    #[error("failed to open connection: {0}")]
    Connect(#[source] BoxError),

    /// The connection manager failed to close a connection.
    #[error("failed to close connection: {0}")]
    Disconnect(#[source] BoxError),
}

impl Error {
    /// Returns `true` when retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            Self::Connect(_) => true,
            _ => false,
        }
    }

    /// Returns `true` for errors caused by running out of a bounded resource.
    pub const fn is_exhausted(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted { .. } | Self::SequenceOverflow { .. } | Self::LeaseOverflow { .. }
        )
    }

    /// Returns `true` when the error was caused by the caller's input.
    pub const fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest { .. } | Self::ShardNotFound { .. } | Self::InvalidConfig { .. }
        )
    }
}
