use core::time::Duration;

/// Limits of a [`Pool`](crate::Pool).
///
/// - `max_idle`: idle connections kept for reuse; `0` keeps all of them.
/// - `max_active`: connections alive at once, idle or checked out; `0` means
///   unbounded.
/// - `idle_timeout`: idle connections older than this are closed on the next
///   [`get`](crate::Pool::get); [`Duration::ZERO`] disables eviction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_idle: usize,
    pub max_active: usize,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 16,
            max_active: 64,
            idle_timeout: Duration::from_secs(240),
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub const fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    #[must_use]
    pub const fn with_max_active(mut self, max_active: usize) -> Self {
        self.max_active = max_active;
        self
    }

    #[must_use]
    pub const fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}
