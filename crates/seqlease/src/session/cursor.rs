use crate::ShardRange;

/// One entity's draw-down position inside its shard's lease.
///
/// `cursor` is the next value to hand out and `lease_max` the shard's `max`
/// as of the last sync; `cursor <= lease_max` always holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityCursor {
    pub entity_key: u64,
    pub cursor: u64,
    pub lease_max: u64,
}

impl EntityCursor {
    pub const fn new(entity_key: u64, cursor: u64, lease_max: u64) -> Self {
        debug_assert!(cursor <= lease_max);
        Self {
            entity_key,
            cursor,
            lease_max,
        }
    }

    /// Catches up with the shard's lease after a sync.
    ///
    /// If the shard's unbroken run starts above everything this cursor was
    /// allowed to use, the values in between belong to another process and
    /// the cursor jumps to `floor`.
    pub fn absorb(&mut self, shard: &ShardRange) {
        if shard.floor > self.lease_max {
            self.cursor = shard.floor;
        }
        self.lease_max = self.lease_max.max(shard.max);
    }

    /// Values left before the cursor must resync with its shard.
    pub const fn remaining(&self) -> u64 {
        self.lease_max - self.cursor
    }
}
