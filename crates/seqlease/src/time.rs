use std::time::Instant;

/// A source of monotonically non-decreasing milliseconds.
///
/// The pool stamps idle connections with this clock and compares the stamps
/// against its idle timeout, so tests can drive eviction with a mock clock
/// instead of sleeping.
pub trait TimeSource {
    /// Milliseconds elapsed since an arbitrary, fixed origin.
    fn current_millis(&self) -> u64;
}

/// A monotonic clock measuring milliseconds since its construction.
///
/// Backed by [`Instant`], so wall-clock adjustments never move it backward.
/// Clones share the same origin.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn current_millis(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}
