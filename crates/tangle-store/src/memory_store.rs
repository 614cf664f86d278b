//! In-memory ledger storage backend.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use tangle_types::{
    Message, MessageId, MessageMetadata, Milestone, MilestoneIndex, Output, OutputId,
};
use tracing::debug;

use crate::error::StoreError;
use crate::traits::{LedgerMutation, Snapshot, TangleStore};

#[derive(Default)]
struct MemoryInner {
    messages: HashMap<MessageId, Message>,
    metadata: HashMap<MessageId, MessageMetadata>,
    milestones: HashMap<MilestoneIndex, Milestone>,
    solid_entry_points: HashSet<MessageId>,
    outputs: HashMap<OutputId, Output>,
    ledger_index: MilestoneIndex,
}

/// In-memory ledger store backed by a single `RwLock`.
///
/// Useful for testing and for nodes configured to run in memory-only mode.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    /// Create a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-loaded with the given snapshot.
    pub fn with_snapshot(snapshot: &Snapshot) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write().expect("lock poisoned");
            Self::load_snapshot_unlocked(&mut inner, snapshot);
        }
        store
    }

    /// Number of stored messages.
    pub fn message_count(&self) -> usize {
        self.inner.read().expect("lock poisoned").messages.len()
    }

    fn load_snapshot_unlocked(inner: &mut MemoryInner, snapshot: &Snapshot) {
        inner.ledger_index = snapshot.ledger_index;
        inner
            .solid_entry_points
            .extend(snapshot.solid_entry_points.iter().copied());
        inner.outputs.extend(snapshot.outputs.iter().copied());
    }
}

impl TangleStore for MemoryStore {
    fn put_message(&self, message: &Message) -> Result<MessageId, StoreError> {
        let id = message.id()?;
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.messages.insert(id, message.clone());
        inner.metadata.entry(id).or_default();
        debug!(%id, "stored message in memory");
        Ok(id)
    }

    fn get_message(&self, id: &MessageId) -> Result<Option<Message>, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.messages.get(id).cloned())
    }

    fn contains_message(&self, id: &MessageId) -> Result<bool, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.messages.contains_key(id))
    }

    fn get_metadata(&self, id: &MessageId) -> Result<Option<MessageMetadata>, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.metadata.get(id).copied())
    }

    fn put_metadata(&self, id: &MessageId, metadata: &MessageMetadata) -> Result<(), StoreError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.metadata.insert(*id, *metadata);
        Ok(())
    }

    fn put_milestone(&self, milestone: &Milestone) -> Result<(), StoreError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.milestones.insert(milestone.index, *milestone);
        debug!(index = %milestone.index, "stored milestone in memory");
        Ok(())
    }

    fn get_milestone(&self, index: MilestoneIndex) -> Result<Option<Milestone>, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.milestones.get(&index).copied())
    }

    fn is_solid_entry_point(&self, id: &MessageId) -> Result<bool, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.solid_entry_points.contains(id))
    }

    fn get_unspent_output(&self, id: &OutputId) -> Result<Option<Output>, StoreError> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.outputs.get(id).copied())
    }

    fn apply_ledger_mutation(&self, mutation: &LedgerMutation) -> Result<(), StoreError> {
        let mut inner = self.inner.write().expect("lock poisoned");

        if let Some(missing) = mutation
            .consumed
            .iter()
            .find(|id| !inner.outputs.contains_key(*id))
        {
            return Err(StoreError::OutputNotUnspent(*missing));
        }

        for id in &mutation.consumed {
            inner.outputs.remove(id);
        }
        inner.outputs.extend(mutation.created.iter().copied());
        inner.metadata.extend(mutation.metadata.iter().copied());
        inner.ledger_index = mutation.index;

        debug!(
            index = %mutation.index,
            referenced = mutation.metadata.len(),
            created = mutation.created.len(),
            consumed = mutation.consumed.len(),
            "applied ledger mutation"
        );
        Ok(())
    }

    fn ledger_index(&self) -> Result<MilestoneIndex, StoreError> {
        Ok(self.inner.read().expect("lock poisoned").ledger_index)
    }

    fn load_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut inner = self.inner.write().expect("lock poisoned");
        Self::load_snapshot_unlocked(&mut inner, snapshot);
        Ok(())
    }
}
