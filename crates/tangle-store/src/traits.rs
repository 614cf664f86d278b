//! Core trait and types for ledger storage.

use tangle_types::{
    Message, MessageId, MessageMetadata, Milestone, MilestoneIndex, Output, OutputId,
};

use crate::error::StoreError;

/// Everything confirming one milestone writes: output changes and the
/// metadata of the referenced messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerMutation {
    /// Milestone whose confirmation produced these changes.
    pub index: MilestoneIndex,
    /// New metadata of every message the milestone referenced.
    pub metadata: Vec<(MessageId, MessageMetadata)>,
    /// Outputs created by applied transactions.
    pub created: Vec<(OutputId, Output)>,
    /// Outputs spent by applied transactions.
    pub consumed: Vec<OutputId>,
}

/// Initial ledger state a store is bootstrapped from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Confirmed milestone index the snapshot was taken at.
    pub ledger_index: MilestoneIndex,
    /// Messages treated as solid and already confirmed.
    pub solid_entry_points: Vec<MessageId>,
    /// Unspent outputs at `ledger_index`.
    pub outputs: Vec<(OutputId, Output)>,
}

/// Persistence interface for messages, milestones and the unspent-output set.
///
/// All implementations must be `Send + Sync` for use across async tasks.
/// Calls are synchronous: backends are expected to answer from local disk or
/// memory without network round trips.
pub trait TangleStore: Send + Sync {
    /// Store a message. Returns its content-addressed id.
    ///
    /// Creates default metadata for the message if none exists yet.
    fn put_message(&self, message: &Message) -> Result<MessageId, StoreError>;

    /// Retrieve a message by id. Returns `None` if not found.
    fn get_message(&self, id: &MessageId) -> Result<Option<Message>, StoreError>;

    /// Check whether a message exists.
    fn contains_message(&self, id: &MessageId) -> Result<bool, StoreError>;

    /// Retrieve the metadata of a message.
    fn get_metadata(&self, id: &MessageId) -> Result<Option<MessageMetadata>, StoreError>;

    /// Overwrite the metadata of a message.
    fn put_metadata(&self, id: &MessageId, metadata: &MessageMetadata) -> Result<(), StoreError>;

    /// Store a milestone record, keyed by its index.
    fn put_milestone(&self, milestone: &Milestone) -> Result<(), StoreError>;

    /// Retrieve a milestone record by index.
    fn get_milestone(&self, index: MilestoneIndex) -> Result<Option<Milestone>, StoreError>;

    /// Whether the message is a solid entry point of the loaded snapshot.
    fn is_solid_entry_point(&self, id: &MessageId) -> Result<bool, StoreError>;

    /// Retrieve an unspent output. Spent or unknown outputs return `None`.
    fn get_unspent_output(&self, id: &OutputId) -> Result<Option<Output>, StoreError>;

    /// Apply the output and metadata changes of a confirmed milestone and
    /// advance the ledger index, as one atomic write.
    ///
    /// Fails without changing anything if a consumed output is not unspent
    /// or the write itself fails.
    fn apply_ledger_mutation(&self, mutation: &LedgerMutation) -> Result<(), StoreError>;

    /// The index of the last milestone applied to the ledger.
    fn ledger_index(&self) -> Result<MilestoneIndex, StoreError>;

    /// Load the initial ledger state.
    fn load_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}
