//! Error types for the confirmation engine.

use tangle_types::{MessageId, MilestoneIndex};

/// Errors that can occur while computing or applying milestone confirmations.
#[derive(Debug, thiserror::Error)]
pub enum TangleError {
    /// The node has not caught up with the latest known milestone.
    #[error("node is not synced")]
    NodeNotSynced,

    /// A white-flag computation was requested without parents.
    #[error("no parents given")]
    ParentsNotGiven,

    /// An ancestor of the requested parents is not known locally yet.
    #[error("parents are not solid: message {missing} is missing")]
    ParentsNotSolid {
        /// First unresolved message found by the solidity walk.
        missing: MessageId,
    },

    /// The node is shutting down; the computation was abandoned.
    #[error("operation aborted")]
    OperationAborted,

    /// No milestone is stored under this index.
    #[error("milestone {0} not found")]
    MilestoneNotFound(MilestoneIndex),

    /// A message expected in the store is missing.
    #[error("message {0} not found")]
    MessageNotFound(MessageId),

    /// A message expected to carry a milestone payload does not.
    #[error("message {0} does not contain a milestone payload")]
    NotAMilestone(MessageId),

    /// Milestones must be confirmed one after the other.
    #[error("cannot confirm milestone {index}: ledger is at {ledger_index}")]
    OutOfOrder {
        /// The milestone that was asked for.
        index: MilestoneIndex,
        /// The ledger index at the time of the request.
        ledger_index: MilestoneIndex,
    },

    /// The recomputed merkle root differs from the one in the milestone.
    #[error("milestone {index}: {root} merkle root mismatch")]
    MerkleRootMismatch {
        /// The milestone being confirmed.
        index: MilestoneIndex,
        /// Which root disagreed (`confirmed` or `applied`).
        root: &'static str,
    },

    /// Ledger storage failure.
    #[error("store error: {0}")]
    Store(#[from] tangle_store::StoreError),

    /// Data model failure (serialization, id computation).
    #[error("types error: {0}")]
    Types(#[from] tangle_types::TypesError),
}
