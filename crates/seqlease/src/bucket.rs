use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

#[cfg(feature = "cache-padded")]
type Bucket<V> = crossbeam_utils::CachePadded<RwLock<HashMap<u64, Arc<V>>>>;
#[cfg(not(feature = "cache-padded"))]
type Bucket<V> = RwLock<HashMap<u64, Arc<V>>>;

/// A fixed set of independently locked hash maps keyed by `u64`.
///
/// Entries are handed out as `Arc<V>` so callers can drop the bucket lock
/// before working on the entry itself. Entries are never removed.
pub(crate) struct Buckets<V> {
    buckets: Box<[Bucket<V>]>,
}

impl<V> Buckets<V> {
    pub(crate) fn new(count: usize) -> Self {
        let buckets = (0..count.max(1))
            .map(|_| Bucket::<V>::default())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { buckets }
    }

    fn bucket(&self, key: u64) -> &RwLock<HashMap<u64, Arc<V>>> {
        // Fits: the remainder is smaller than the bucket count.
        let idx = (key % self.buckets.len() as u64) as usize;
        &self.buckets[idx]
    }

    /// Looks the entry up under the bucket's shared lock.
    pub(crate) fn get(&self, key: u64) -> Option<Arc<V>> {
        self.bucket(key).read().get(&key).cloned()
    }

    /// Inserts `make()` unless an entry already exists, in which case
    /// `merge` is applied to the existing entry instead. Runs under the
    /// bucket's exclusive lock, so `make` and `merge` must not block.
    pub(crate) fn upsert(
        &self,
        key: u64,
        make: impl FnOnce() -> V,
        merge: impl FnOnce(&V),
    ) -> Arc<V> {
        let mut bucket = self.bucket(key).write();
        if let Some(existing) = bucket.get(&key) {
            merge(existing);
            return Arc::clone(existing);
        }
        let entry = Arc::new(make());
        bucket.insert(key, Arc::clone(&entry));
        entry
    }

    pub(crate) fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.read().len()).sum()
    }
}
