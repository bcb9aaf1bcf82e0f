//! Stores for exercising failure and contention paths.

use crate::{CounterStore, MemoryStore, StoreError, Table};
use core::time::Duration;
use portable_atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Wraps a [`MemoryStore`], optionally failing or stalling every call.
#[derive(Default)]
pub(crate) struct FlakyStore {
    pub(crate) inner: Arc<MemoryStore>,
    failing: AtomicBool,
    delay_ms: AtomicU64,
}

impl FlakyStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn before_call(&self) -> Result<(), StoreError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

impl CounterStore for FlakyStore {
    fn fetch_add(&self, table: Table, key: u64, delta: u64) -> Result<Option<u64>, StoreError> {
        self.before_call()?;
        self.inner.fetch_add(table, key, delta)
    }

    fn insert_if_absent(&self, table: Table, key: u64, seed: u64) -> Result<(), StoreError> {
        self.before_call()?;
        self.inner.insert_if_absent(table, key, seed)
    }
}

/// A store whose inserts are silently lost, so rows never appear.
#[derive(Default)]
pub(crate) struct ForgetfulStore {
    pub(crate) inserts: AtomicU64,
}

impl CounterStore for ForgetfulStore {
    fn fetch_add(&self, _: Table, _: u64, _: u64) -> Result<Option<u64>, StoreError> {
        Ok(None)
    }

    fn insert_if_absent(&self, _: Table, _: u64, _: u64) -> Result<(), StoreError> {
        self.inserts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
