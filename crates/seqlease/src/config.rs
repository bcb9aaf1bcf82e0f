use crate::{Error, Result};

/// Number of entity keys that share one shard lease by default.
pub const DEFAULT_SHARD_WIDTH: u64 = 100_000;

/// Numbers reserved from the store per lease extension by default.
pub const DEFAULT_BATCH_SIZE: u64 = 1_000;

/// Default bucket count of the shard-range table.
pub const DEFAULT_SECTION_BUCKETS: usize = 64;

/// Default bucket count of the entity-cursor table.
pub const DEFAULT_SESSION_BUCKETS: usize = 256;

/// Value a missing lease row is created with.
pub const DEFAULT_LEASE_SEED: u64 = 1;

/// Value a missing global counter row is created with.
pub const DEFAULT_COUNTER_SEED: u64 = 0;

/// Bound on the create-then-retry loop around a missing row.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Tuning knobs for an [`Allocator`](crate::Allocator).
///
/// Bucket counts only affect lock contention. `shard_width` and
/// `batch_size` decide how often the durable store is touched: every entity
/// key in `[n * shard_width, (n + 1) * shard_width)` draws from the same
/// lease, and each extension reserves `batch_size` more numbers.
///
/// # Example
/// ```
/// use seqlease::AllocatorConfig;
///
/// let config = AllocatorConfig::default()
///     .with_batch_size(10_000)
///     .with_session_buckets(1024);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocatorConfig {
    pub shard_width: u64,
    pub batch_size: u64,
    pub section_buckets: usize,
    pub session_buckets: usize,
    pub lease_seed: u64,
    pub counter_seed: u64,
    pub max_attempts: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            shard_width: DEFAULT_SHARD_WIDTH,
            batch_size: DEFAULT_BATCH_SIZE,
            section_buckets: DEFAULT_SECTION_BUCKETS,
            session_buckets: DEFAULT_SESSION_BUCKETS,
            lease_seed: DEFAULT_LEASE_SEED,
            counter_seed: DEFAULT_COUNTER_SEED,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl AllocatorConfig {
    #[must_use]
    pub const fn with_shard_width(mut self, shard_width: u64) -> Self {
        self.shard_width = shard_width;
        self
    }

    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub const fn with_section_buckets(mut self, buckets: usize) -> Self {
        self.section_buckets = buckets;
        self
    }

    #[must_use]
    pub const fn with_session_buckets(mut self, buckets: usize) -> Self {
        self.session_buckets = buckets;
        self
    }

    #[must_use]
    pub const fn with_lease_seed(mut self, seed: u64) -> Self {
        self.lease_seed = seed;
        self
    }

    #[must_use]
    pub const fn with_counter_seed(mut self, seed: u64) -> Self {
        self.counter_seed = seed;
        self
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Checks every field against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let reason = if self.shard_width == 0 {
            "shard_width must be greater than 0"
        } else if self.batch_size == 0 {
            "batch_size must be greater than 0"
        } else if self.section_buckets == 0 {
            "section_buckets must be greater than 0"
        } else if self.session_buckets == 0 {
            "session_buckets must be greater than 0"
        } else if self.max_attempts < 2 {
            // A missing row needs one attempt to create it and one to read it.
            "max_attempts must be at least 2"
        } else {
            return Ok(());
        };

        Err(Error::InvalidConfig {
            reason: reason.to_string(),
        })
    }
}
