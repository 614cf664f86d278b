//! [`FjallStore`] implementation wrapping Fjall keyspaces.

use std::path::Path;

use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use tangle_types::{
    Message, MessageId, MessageMetadata, Milestone, MilestoneIndex, Output, OutputId,
};
use tempfile::TempDir;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::{LedgerMutation, Snapshot, TangleStore};

type Result<T> = std::result::Result<T, StoreError>;

const LEDGER_INDEX_KEY: &[u8] = b"ledger_index";

/// Persistent ledger store backed by Fjall.
pub struct FjallStore {
    /// The underlying Fjall database handle, used for atomic batches.
    db: Database,
    /// MessageId → serialized Message.
    messages: Keyspace,
    /// MessageId → serialized MessageMetadata.
    metadata: Keyspace,
    /// index (4 bytes BE) → serialized Milestone.
    milestones: Keyspace,
    /// OutputId key → serialized Output (unspent only).
    outputs: Keyspace,
    /// MessageId → empty.
    solid_entry_points: Keyspace,
    /// Singleton values (ledger index).
    ledger: Keyspace,
    /// Keeps the backing directory alive for temporary stores.
    _tmp: Option<TempDir>,
}

impl FjallStore {
    /// Open a persistent store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::builder(path).open()?;
        Self::init_keyspaces(db, None)
    }

    /// Open a temporary store that is cleaned up on drop.
    ///
    /// Useful for tests.
    pub fn open_temporary() -> Result<Self> {
        let tmp = tempfile::tempdir()?;
        let db = Database::builder(tmp.path()).temporary(true).open()?;
        Self::init_keyspaces(db, Some(tmp))
    }

    fn init_keyspaces(db: Database, tmp: Option<TempDir>) -> Result<Self> {
        let messages = db.keyspace("messages", KeyspaceCreateOptions::default)?;
        let metadata = db.keyspace("metadata", KeyspaceCreateOptions::default)?;
        let milestones = db.keyspace("milestones", KeyspaceCreateOptions::default)?;
        let outputs = db.keyspace("outputs", KeyspaceCreateOptions::default)?;
        let solid_entry_points = db.keyspace("solid_entry_points", KeyspaceCreateOptions::default)?;
        let ledger = db.keyspace("ledger", KeyspaceCreateOptions::default)?;
        Ok(Self {
            db,
            messages,
            metadata,
            milestones,
            outputs,
            solid_entry_points,
            ledger,
            _tmp: tmp,
        })
    }

    fn put_ledger_index(&self, index: MilestoneIndex) -> Result<()> {
        self.ledger
            .insert(LEDGER_INDEX_KEY, index.to_be_bytes().as_slice())?;
        Ok(())
    }
}

impl TangleStore for FjallStore {
    // ----- Messages -----

    fn put_message(&self, message: &Message) -> Result<MessageId> {
        let bytes = message.serialize()?;
        let id = MessageId::from_data(&bytes);
        self.messages.insert(id.as_bytes(), bytes.as_slice())?;
        if self.metadata.get(id.as_bytes())?.is_none() {
            self.put_metadata(&id, &MessageMetadata::default())?;
        }
        debug!(%id, "stored message");
        Ok(id)
    }

    fn get_message(&self, id: &MessageId) -> Result<Option<Message>> {
        match self.messages.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn contains_message(&self, id: &MessageId) -> Result<bool> {
        Ok(self.messages.get(id.as_bytes())?.is_some())
    }

    fn get_metadata(&self, id: &MessageId) -> Result<Option<MessageMetadata>> {
        match self.metadata.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_metadata(&self, id: &MessageId, metadata: &MessageMetadata) -> Result<()> {
        let value = postcard::to_allocvec(metadata)?;
        self.metadata.insert(id.as_bytes(), value.as_slice())?;
        Ok(())
    }

    // ----- Milestones -----

    fn put_milestone(&self, milestone: &Milestone) -> Result<()> {
        let value = postcard::to_allocvec(milestone)?;
        self.milestones
            .insert(milestone.index.to_be_bytes().as_slice(), value.as_slice())?;
        debug!(index = %milestone.index, "stored milestone");
        Ok(())
    }

    fn get_milestone(&self, index: MilestoneIndex) -> Result<Option<Milestone>> {
        match self.milestones.get(index.to_be_bytes().as_slice())? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    // ----- Ledger -----

    fn is_solid_entry_point(&self, id: &MessageId) -> Result<bool> {
        Ok(self.solid_entry_points.get(id.as_bytes())?.is_some())
    }

    fn get_unspent_output(&self, id: &OutputId) -> Result<Option<Output>> {
        match self.outputs.get(id.to_key().as_slice())? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn apply_ledger_mutation(&self, mutation: &LedgerMutation) -> Result<()> {
        for id in &mutation.consumed {
            if self.outputs.get(id.to_key().as_slice())?.is_none() {
                return Err(StoreError::OutputNotUnspent(*id));
            }
        }

        let mut batch = self.db.batch();
        for (id, meta) in &mutation.metadata {
            let value = postcard::to_allocvec(meta)?;
            batch.insert(&self.metadata, id.as_bytes(), value.as_slice());
        }
        for id in &mutation.consumed {
            batch.remove(&self.outputs, id.to_key().as_slice());
        }
        for (id, output) in &mutation.created {
            let value = postcard::to_allocvec(output)?;
            batch.insert(&self.outputs, id.to_key().as_slice(), value.as_slice());
        }
        batch.insert(
            &self.ledger,
            LEDGER_INDEX_KEY,
            mutation.index.to_be_bytes().as_slice(),
        );
        batch.commit()?;

        debug!(
            index = %mutation.index,
            referenced = mutation.metadata.len(),
            created = mutation.created.len(),
            consumed = mutation.consumed.len(),
            "applied ledger mutation"
        );
        Ok(())
    }

    fn ledger_index(&self) -> Result<MilestoneIndex> {
        match self.ledger.get(LEDGER_INDEX_KEY)? {
            Some(bytes) => {
                let raw = <[u8; 4]>::try_from(&bytes[..]).map_err(|_| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "corrupt ledger index entry",
                    )
                })?;
                Ok(MilestoneIndex(u32::from_be_bytes(raw)))
            }
            None => Ok(MilestoneIndex::default()),
        }
    }

    fn load_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        for id in &snapshot.solid_entry_points {
            self.solid_entry_points.insert(id.as_bytes(), b"".as_slice())?;
        }
        for (id, output) in &snapshot.outputs {
            let value = postcard::to_allocvec(output)?;
            self.outputs.insert(id.to_key().as_slice(), value.as_slice())?;
        }
        self.put_ledger_index(snapshot.ledger_index)?;
        debug!(
            ledger_index = %snapshot.ledger_index,
            outputs = snapshot.outputs.len(),
            "loaded snapshot"
        );
        Ok(())
    }
}
