/// The numbers leased from the store for one shard.
///
/// Leases taken by this process span `[min, max)`, but another process may
/// have leased the same shard in between, leaving holes. `[floor, max)` is
/// the unbroken run of this process's leases that ends at `max`; values
/// below `floor` may belong to someone else unless a cursor already held
/// them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShardRange {
    pub shard_id: u64,
    pub min: u64,
    pub floor: u64,
    pub max: u64,
}

impl ShardRange {
    /// A single contiguous lease `[min, max)`.
    pub const fn new(shard_id: u64, min: u64, max: u64) -> Self {
        debug_assert!(min <= max);
        Self {
            shard_id,
            min,
            floor: min,
            max,
        }
    }

    /// Returns `true` if `value` lies in the unbroken run `[floor, max)`.
    pub const fn contains(&self, value: u64) -> bool {
        self.floor <= value && value < self.max
    }

    /// Returns `true` if the lease reaches past `value`, i.e. `value < max`.
    pub const fn covers(&self, value: u64) -> bool {
        value < self.max
    }

    /// Returns `true` if `[min, max)` has holes leased by someone else.
    pub const fn has_gap(&self) -> bool {
        self.floor > self.min
    }

    /// Folds `other` into `self`, keeping the smaller `min` and the larger
    /// `max`.
    ///
    /// When the range reaching further does not touch the other one, the
    /// numbers between them were leased elsewhere and `floor` moves up to
    /// the start of the further range. The result does not depend on merge
    /// order, and merging the same lease twice is a no-op. `max` never
    /// decreases.
    pub fn merge(&mut self, other: &Self) {
        debug_assert_eq!(self.shard_id, other.shard_id);
        let (lo, hi) = if self.max <= other.max {
            (*self, *other)
        } else {
            (*other, *self)
        };

        self.min = lo.min.min(hi.min);
        self.max = hi.max;
        self.floor = if lo.max >= hi.floor {
            lo.floor.min(hi.floor)
        } else {
            hi.floor
        };
    }
}
