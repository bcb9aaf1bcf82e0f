use crate::{
    AllocatorConfig, CounterClass, CounterStore, GlobalAllocator, Result, SectionTable,
    SessionTable, ShardRange,
};
use std::sync::Arc;

/// The allocation context of one process.
///
/// Bundles the [`SectionTable`], [`SessionTable`] and [`GlobalAllocator`]
/// over a single store. Build one at startup and share it (behind an `Arc`)
/// with every request handler. All in-memory state lives here, so dropping
/// the allocator and building a new one over the same store behaves exactly
/// like a process restart.
///
/// # Example
/// ```
/// use seqlease::{Allocator, AllocatorConfig, CounterStore, MemoryStore};
/// use std::sync::Arc;
///
/// // Any store works behind a trait object.
/// let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
/// let allocator = Allocator::new(store, AllocatorConfig::default()).unwrap();
///
/// assert_eq!(allocator.next_for_entity(7).unwrap(), 1);
/// assert_eq!(allocator.next_for_entity(7).unwrap(), 2);
/// ```
pub struct Allocator<S: ?Sized> {
    config: AllocatorConfig,
    sessions: SessionTable<S>,
    globals: GlobalAllocator<S>,
}

impl<S> Allocator<S>
where
    S: CounterStore + ?Sized,
{
    /// Validates `config` and builds empty tables over `store`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if the
    /// configuration is rejected.
    pub fn new(store: Arc<S>, config: AllocatorConfig) -> Result<Self> {
        config.validate()?;

        let sections = Arc::new(SectionTable::new(Arc::clone(&store), &config));
        let sessions = SessionTable::new(sections, &config);
        let globals = GlobalAllocator::new(store, &config);

        Ok(Self {
            config,
            sessions,
            globals,
        })
    }

    pub const fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        self.sections().store()
    }

    pub fn sections(&self) -> &SectionTable<S> {
        self.sessions.sections()
    }

    pub const fn sessions(&self) -> &SessionTable<S> {
        &self.sessions
    }

    /// See [`SessionTable::next_for_entity`].
    pub fn next_for_entity(&self, entity_key: u64) -> Result<u64> {
        self.sessions.next_for_entity(entity_key)
    }

    /// See [`SessionTable::next_batch_for_entity`].
    pub fn next_batch_for_entity(&self, entity_key: u64, count: u64) -> Result<u64> {
        self.sessions.next_batch_for_entity(entity_key, count)
    }

    /// See [`GlobalAllocator::next_global`].
    pub fn next_global(&self, class: CounterClass) -> Result<u64> {
        self.globals.next_global(class)
    }

    /// See [`SectionTable::ensure_shard`].
    pub fn ensure_shard(&self, shard_id: u64) -> Result<()> {
        self.sections().ensure_shard(shard_id)
    }

    /// See [`SectionTable::read_shard`].
    pub fn read_shard(&self, shard_id: u64) -> Result<ShardRange> {
        self.sections().read_shard(shard_id)
    }

    /// See [`SectionTable::resync`].
    pub fn resync(&self, shard_id: u64, requested: u64) -> Result<ShardRange> {
        self.sections().resync(shard_id, requested)
    }
}
