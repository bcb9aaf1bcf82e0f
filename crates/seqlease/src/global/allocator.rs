use crate::{AllocatorConfig, CounterClass, CounterStore, Error, Result, Table};
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Hands out identifiers one at a time from a single durable row per
/// [`CounterClass`].
///
/// No batching: every call is one store transaction, which suits
/// identifiers minted a few times per second at most (new sessions, new
/// rooms). Values are unique and increasing across restarts because the row
/// is the only state.
pub struct GlobalAllocator<S: ?Sized> {
    seed: u64,
    max_attempts: usize,
    store: Arc<S>,
}

impl<S> GlobalAllocator<S>
where
    S: CounterStore + ?Sized,
{
    pub fn new(store: Arc<S>, config: &AllocatorConfig) -> Self {
        Self {
            seed: config.counter_seed,
            max_attempts: config.max_attempts,
            store,
        }
    }

    /// Returns the next identifier of `class`.
    ///
    /// The first identifier of a class is the configured seed.
    ///
    /// # Errors
    ///
    /// - The store's error, returned on first occurrence.
    /// - [`Error::RetriesExhausted`] if the row could not be created and read
    ///   back within `max_attempts` tries.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn next_global(&self, class: CounterClass) -> Result<u64> {
        let key = u64::from(class.get());

        for _ in 0..self.max_attempts {
            match self.store.fetch_add(Table::Counter, key, 1)? {
                Some(id) => return Ok(id),
                None => self.store.insert_if_absent(Table::Counter, key, self.seed)?,
            }
        }

        Err(Error::RetriesExhausted {
            operation: "global counter",
            key,
            attempts: self.max_attempts,
        })
    }
}
