//! [`Storage`]: cached, reference-counted access to milestones and messages.

use std::sync::Arc;

use tangle_types::{Message, MessageId, Milestone, MilestoneIndex};

use crate::cache::{CachedHandle, ObjectCache};
use crate::error::StoreError;
use crate::traits::TangleStore;

/// Handle to a cached [`Milestone`].
pub type CachedMilestone = CachedHandle<MilestoneIndex, Milestone>;

/// Handle to a cached [`Message`].
pub type CachedMessage = CachedHandle<MessageId, Message>;

/// Cache sizing for [`Storage`].
#[derive(Debug, Clone, Copy)]
pub struct StorageConfig {
    /// Unreferenced milestones kept in memory.
    pub milestone_cache_size: usize,
    /// Unreferenced messages kept in memory.
    pub message_cache_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            milestone_cache_size: 1_000,
            message_cache_size: 10_000,
        }
    }
}

/// Object store in front of a [`TangleStore`].
///
/// Every successful `acquire_*` call returns a handle holding one
/// reference; the caller must drop or release it when done.
pub struct Storage {
    store: Arc<dyn TangleStore>,
    milestones: ObjectCache<MilestoneIndex, Milestone>,
    messages: ObjectCache<MessageId, Message>,
}

impl Storage {
    /// Wrap a store with default cache sizes.
    pub fn new(store: Arc<dyn TangleStore>) -> Self {
        Self::with_config(store, StorageConfig::default())
    }

    /// Wrap a store with explicit cache sizes.
    pub fn with_config(store: Arc<dyn TangleStore>, config: StorageConfig) -> Self {
        Self {
            store,
            milestones: ObjectCache::new(config.milestone_cache_size),
            messages: ObjectCache::new(config.message_cache_size),
        }
    }

    /// The persistence layer behind the caches.
    pub fn store(&self) -> &Arc<dyn TangleStore> {
        &self.store
    }

    /// Acquire the milestone with the given index. `Ok(None)` if unknown.
    pub fn acquire_milestone(
        &self,
        index: MilestoneIndex,
    ) -> Result<Option<CachedMilestone>, StoreError> {
        self.milestones
            .acquire_with(index, |index| self.store.get_milestone(*index))
    }

    /// Acquire the message with the given id. `Ok(None)` if unknown.
    pub fn acquire_message(&self, id: &MessageId) -> Result<Option<CachedMessage>, StoreError> {
        self.messages
            .acquire_with(*id, |id| self.store.get_message(id))
    }

    /// Live handle references across both caches.
    pub fn outstanding_handles(&self) -> usize {
        self.milestones.outstanding() + self.messages.outstanding()
    }

    /// Live references to milestone handles only.
    pub fn outstanding_milestone_handles(&self) -> usize {
        self.milestones.outstanding()
    }

    /// Current reference count of one milestone.
    pub fn milestone_ref_count(&self, index: MilestoneIndex) -> usize {
        self.milestones.ref_count(&index)
    }
}
