use crate::{AllocatorConfig, CounterStore, Error, Result, ShardRange, Table, bucket::Buckets};
use parking_lot::{Mutex, RwLock};
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Cached lease state for one shard.
pub(crate) struct ShardSlot {
    range: RwLock<ShardRange>,
    // Held across the store round-trip of an extension so that concurrent
    // exhaustion of one shard costs a single durable lease.
    extend: Mutex<()>,
}

impl ShardSlot {
    fn new(range: ShardRange) -> Self {
        Self {
            range: RwLock::new(range),
            extend: Mutex::new(()),
        }
    }
}

/// A sharded, in-process cache of the ranges leased for each shard.
///
/// The first access to a shard leases `batch_size` numbers from the store;
/// later accesses are served from memory. Shards are never evicted, so memory
/// grows with the number of distinct shards touched.
///
/// ## Locking
///
/// Shards live in `section_buckets` independently locked maps. A miss is
/// handled with double-checked locking: the bucket's shared lock is dropped,
/// the lease is taken from the store with no lock held, and the result is
/// inserted under the bucket's exclusive lock, or merged into whatever entry
/// a racing caller inserted first. Bucket locks are never held across store
/// I/O.
///
/// Extensions of an existing lease ([`resync`](Self::resync)) are serialized
/// per shard and re-check coverage before touching the store.
pub struct SectionTable<S: ?Sized> {
    slots: Buckets<ShardSlot>,
    batch_size: u64,
    lease_seed: u64,
    max_attempts: usize,
    leases: AtomicU64,
    extensions: AtomicU64,
    store: Arc<S>,
}

impl<S> SectionTable<S>
where
    S: CounterStore + ?Sized,
{
    pub fn new(store: Arc<S>, config: &AllocatorConfig) -> Self {
        Self {
            slots: Buckets::new(config.section_buckets),
            batch_size: config.batch_size,
            lease_seed: config.lease_seed,
            max_attempts: config.max_attempts,
            leases: AtomicU64::new(0),
            extensions: AtomicU64::new(0),
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Makes sure a lease is cached for `shard_id`, leasing one on a miss.
    ///
    /// Idempotent: racing callers may each lease, but their results are
    /// merged into one entry.
    ///
    /// # Errors
    ///
    /// Returns the store's error if leasing fails. The table is left
    /// untouched, so a retry is safe.
    pub fn ensure_shard(&self, shard_id: u64) -> Result<()> {
        self.slot(shard_id).map(|_| ())
    }

    /// Returns the current lease window of `shard_id`, leasing one on first
    /// access.
    ///
    /// # Errors
    ///
    /// Same as [`ensure_shard`](Self::ensure_shard).
    pub fn read_shard(&self, shard_id: u64) -> Result<ShardRange> {
        let slot = self.slot(shard_id)?;
        Ok(*slot.range.read())
    }

    /// Returns the cached lease of `shard_id` without going to the store.
    pub fn lookup(&self, shard_id: u64) -> Option<ShardRange> {
        self.slots.get(shard_id).map(|slot| *slot.range.read())
    }

    /// Makes the lease of `shard_id` cover `requested`, i.e. `requested <
    /// max` afterwards.
    ///
    /// When the lease falls short it is extended by the smallest multiple of
    /// `batch_size` that covers `requested`, in a single store round-trip,
    /// and merged in place. Concurrent callers on the same shard wait for
    /// that extension instead of starting their own.
    ///
    /// If another process leased the shard since our last lease, the new
    /// lease starts above the old `max` and `floor` moves up to its `min`.
    /// Callers must not hand out values in `[old max, floor)`.
    ///
    /// # Errors
    ///
    /// - [`Error::ShardNotFound`] if the shard has never been leased.
    /// - [`Error::LeaseOverflow`] if the extension would overflow `u64`.
    /// - The store's error if the extension fails; the cached lease is then
    ///   unchanged.
    pub fn resync(&self, shard_id: u64, requested: u64) -> Result<ShardRange> {
        let slot = self
            .slots
            .get(shard_id)
            .ok_or(Error::ShardNotFound { shard_id })?;

        {
            let range = slot.range.read();
            if range.covers(requested) {
                return Ok(*range);
            }
        }

        let _extending = slot.extend.lock();

        // Another caller may have extended while we waited.
        let max = {
            let range = slot.range.read();
            if range.covers(requested) {
                return Ok(*range);
            }
            range.max
        };

        let shortfall = requested - max + 1;
        let span = shortfall
            .div_ceil(self.batch_size)
            .checked_mul(self.batch_size)
            .ok_or(Error::LeaseOverflow { shard_id })?;
        let leased = self.lease_from_store(shard_id, span)?;
        self.extensions.fetch_add(1, Ordering::Relaxed);

        let mut range = slot.range.write();
        range.merge(&leased);

        #[cfg(feature = "tracing")]
        {
            if leased.min > max {
                tracing::debug!(
                    shard_id,
                    skipped_from = max,
                    skipped_to = leased.min,
                    "shard leased elsewhere, skipping gap"
                );
            }
        }

        Ok(*range)
    }

    /// Leases `span` fresh numbers for `shard_id` from the store.
    ///
    /// A missing lease row is created with the configured seed and the lease
    /// retried, up to `max_attempts` reads in total.
    ///
    /// # Errors
    ///
    /// - The store's error, returned on first occurrence.
    /// - [`Error::RetriesExhausted`] if the row never became readable.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn lease_from_store(&self, shard_id: u64, span: u64) -> Result<ShardRange> {
        for _ in 0..self.max_attempts {
            match self.store.fetch_add(Table::Lease, shard_id, span)? {
                Some(min) => {
                    let max = min
                        .checked_add(span)
                        .ok_or(Error::LeaseOverflow { shard_id })?;
                    self.leases.fetch_add(1, Ordering::Relaxed);

                    #[cfg(feature = "tracing")]
                    tracing::debug!(shard_id, min, max, "leased shard range");

                    return Ok(ShardRange::new(shard_id, min, max));
                }
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(shard_id, seed = self.lease_seed, "creating lease row");

                    self.store
                        .insert_if_absent(Table::Lease, shard_id, self.lease_seed)?;
                }
            }
        }

        Err(Error::RetriesExhausted {
            operation: "lease",
            key: shard_id,
            attempts: self.max_attempts,
        })
    }

    /// Number of shards with a cached lease.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful durable leases taken by this table, first leases
    /// included.
    pub fn leases(&self) -> u64 {
        self.leases.load(Ordering::Relaxed)
    }

    /// Number of times an existing lease was extended through
    /// [`resync`](Self::resync).
    pub fn extensions(&self) -> u64 {
        self.extensions.load(Ordering::Relaxed)
    }

    fn slot(&self, shard_id: u64) -> Result<Arc<ShardSlot>> {
        if let Some(slot) = self.slots.get(shard_id) {
            return Ok(slot);
        }

        let leased = self.lease_from_store(shard_id, self.batch_size)?;

        Ok(self.slots.upsert(
            shard_id,
            || ShardSlot::new(leased),
            |slot| slot.range.write().merge(&leased),
        ))
    }
}
