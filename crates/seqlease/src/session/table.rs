use crate::{
    AllocatorConfig, CounterStore, EntityCursor, Error, Result, SectionTable, bucket::Buckets,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Hands every entity its own strictly increasing sequence.
///
/// Each entity key belongs to the shard `entity_key / shard_width`. On first
/// use the entity's cursor is seeded at the shard lease's `floor`, which is at
/// or above every value any other process could have issued for the shard.
/// Every call then hands out the cursor and advances it, extending the shard
/// lease through the [`SectionTable`] once the cursor reaches it.
///
/// Cursors sit in `session_buckets` independently locked maps, and each
/// cursor has its own mutex, so two entities of one shard only contend when
/// the shard's lease has to be extended.
pub struct SessionTable<S: ?Sized> {
    cursors: Buckets<Mutex<EntityCursor>>,
    shard_width: u64,
    sections: Arc<SectionTable<S>>,
}

impl<S> SessionTable<S>
where
    S: CounterStore + ?Sized,
{
    pub fn new(sections: Arc<SectionTable<S>>, config: &AllocatorConfig) -> Self {
        Self {
            cursors: Buckets::new(config.session_buckets),
            shard_width: config.shard_width,
            sections,
        }
    }

    pub fn sections(&self) -> &Arc<SectionTable<S>> {
        &self.sections
    }

    /// The shard an entity key draws from.
    pub const fn shard_of(&self, entity_key: u64) -> u64 {
        entity_key / self.shard_width
    }

    /// Returns the next sequence number of `entity_key`.
    ///
    /// Values returned for one entity are strictly increasing and never
    /// repeat within the process. Across restarts, and against other
    /// processes sharing the store, they stay unique because a cursor only
    /// ever draws from this process's own leases.
    ///
    /// # Errors
    ///
    /// - The store's error if the shard lease cannot be taken or extended;
    ///   nothing is handed out, though the cursor may already have skipped
    ///   a range leased elsewhere.
    /// - [`Error::SequenceOverflow`] at the end of the `u64` space.
    pub fn next_for_entity(&self, entity_key: u64) -> Result<u64> {
        self.next_batch_for_entity(entity_key, 1)
    }

    /// Reserves `count` consecutive sequence numbers for `entity_key` and
    /// returns the first.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] if `count` is zero.
    /// - Otherwise as [`next_for_entity`](Self::next_for_entity).
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn next_batch_for_entity(&self, entity_key: u64, count: u64) -> Result<u64> {
        if count == 0 {
            return Err(Error::InvalidRequest {
                reason: "count must be greater than 0".to_string(),
            });
        }

        let cell = self.cursor(entity_key)?;
        let mut entry = cell.lock();
        let shard_id = self.shard_of(entity_key);

        let mut synced = false;
        loop {
            let first = entry.cursor;
            let last = first
                .checked_add(count - 1)
                .filter(|last| *last < u64::MAX)
                .ok_or(Error::SequenceOverflow { entity_key })?;

            if last < entry.lease_max {
                entry.cursor = last + 1;
                return Ok(first);
            }

            // Another entity may already have pushed the shard's lease. If
            // that lease skipped a gap the cursor jumps and the batch is
            // recomputed from there.
            let shard = if synced {
                self.sections.resync(shard_id, last)?
            } else {
                self.sections.read_shard(shard_id)?
            };
            entry.absorb(&shard);
            synced = true;
        }
    }

    /// Snapshot of the cursor of `entity_key`, if it has one.
    pub fn peek(&self, entity_key: u64) -> Option<EntityCursor> {
        self.cursors.get(entity_key).map(|cell| *cell.lock())
    }

    /// Number of entities holding a cursor.
    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cursor(&self, entity_key: u64) -> Result<Arc<Mutex<EntityCursor>>> {
        if let Some(cell) = self.cursors.get(entity_key) {
            return Ok(cell);
        }

        let shard = self.sections.read_shard(self.shard_of(entity_key))?;

        // A racing caller's cursor wins; ours was never handed out.
        Ok(self.cursors.upsert(
            entity_key,
            || Mutex::new(EntityCursor::new(entity_key, shard.floor, shard.max)),
            |_| {},
        ))
    }
}
