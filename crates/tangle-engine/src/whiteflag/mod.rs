//! White-flag mutation computation.
//!
//! Given a candidate milestone, orders every unconfirmed message below its
//! parents, applies their transactions to a transient overlay of the
//! unspent-output set, and digests the result into two merkle roots:
//! `confirmed_merkle_root` over all referenced messages and
//! `applied_merkle_root` over the messages whose transaction was applied.
//!
//! The computation only reads ledger state. Applying the result is the
//! confirmation pipeline's job ([`crate::Tangle::confirm_milestone`]).

mod ledger;
pub mod merkle;
mod traversal;

use tangle_store::Storage;
use tangle_types::{
    ConflictReason, MerkleRoot, MessageId, MilestoneId, MilestoneIndex, Output, OutputId,
};
use tokio::sync::watch;
use tracing::debug;

use crate::error::TangleError;

use ledger::LedgerOverlay;
use traversal::Walker;

pub use merkle::merkle_root;

/// The milestone a white-flag computation is run for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhiteFlagCandidate {
    /// Index of the candidate milestone.
    pub index: MilestoneIndex,
    /// Candidate timestamp (unix seconds).
    pub timestamp: u32,
    /// Messages the candidate approves directly.
    pub parents: Vec<MessageId>,
    /// ID of the milestone the candidate builds on.
    pub previous_milestone_id: MilestoneId,
}

/// Result of a white-flag computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhiteFlagMutations {
    /// Index the mutations were computed for.
    pub index: MilestoneIndex,
    /// Timestamp echoed from the candidate.
    pub timestamp: u32,
    /// Previous milestone id echoed from the candidate.
    pub previous_milestone_id: MilestoneId,
    /// Every newly referenced message, in confirmation order.
    pub referenced: Vec<MessageId>,
    /// Messages whose transaction was applied.
    pub included: Vec<MessageId>,
    /// Messages without a transaction payload.
    pub excluded_without_transactions: Vec<MessageId>,
    /// Messages whose transaction conflicted, with the reason.
    pub excluded_conflicting: Vec<(MessageId, ConflictReason)>,
    /// Outputs created by the included transactions.
    pub created: Vec<(OutputId, Output)>,
    /// Persisted outputs consumed by the included transactions.
    pub consumed: Vec<OutputId>,
    /// Merkle root over `referenced`.
    pub confirmed_merkle_root: MerkleRoot,
    /// Merkle root over `included`.
    pub applied_merkle_root: MerkleRoot,
}

impl WhiteFlagMutations {
    /// The conflict outcome recorded for `id` (`None` if it did not conflict).
    pub fn conflict_of(&self, id: &MessageId) -> ConflictReason {
        self.excluded_conflicting
            .iter()
            .find(|(m, _)| m == id)
            .map_or(ConflictReason::None, |(_, reason)| *reason)
    }
}

/// Compute the white-flag mutations for `candidate` against the current
/// ledger state in `storage`.
///
/// Fails with [`TangleError::ParentsNotGiven`] for an empty parent list,
/// [`TangleError::ParentsNotSolid`] if any unconfirmed ancestor is unknown,
/// and [`TangleError::OperationAborted`] once `abort` turns `true`.
///
/// The caller must hold the ledger lock for reading (or writing) so that
/// the state does not change during the walk.
pub fn compute_white_flag_mutations(
    storage: &Storage,
    candidate: &WhiteFlagCandidate,
    abort: &watch::Receiver<bool>,
) -> Result<WhiteFlagMutations, TangleError> {
    if candidate.parents.is_empty() {
        return Err(TangleError::ParentsNotGiven);
    }

    let walker = Walker::new(storage, abort);
    walker.check_solidity(&candidate.parents)?;
    let ordered = walker.confirmation_order(&candidate.parents)?;

    let mut overlay = LedgerOverlay::new(storage.store().as_ref());
    let mut referenced = Vec::with_capacity(ordered.len());
    let mut included = Vec::new();
    let mut excluded_without_transactions = Vec::new();
    let mut excluded_conflicting = Vec::new();

    for message in &ordered {
        let id = *message.key();
        referenced.push(id);

        let Some(tx) = message.transaction() else {
            excluded_without_transactions.push(id);
            continue;
        };
        match overlay.apply(id, tx)? {
            ConflictReason::None => included.push(id),
            reason => excluded_conflicting.push((id, reason)),
        }
    }
    drop(ordered);

    let (created, consumed) = overlay.into_changes();
    let confirmed_merkle_root = merkle_root(&referenced);
    let applied_merkle_root = merkle_root(&included);

    debug!(
        index = %candidate.index,
        referenced = referenced.len(),
        included = included.len(),
        conflicting = excluded_conflicting.len(),
        "computed white-flag mutations"
    );

    Ok(WhiteFlagMutations {
        index: candidate.index,
        timestamp: candidate.timestamp,
        previous_milestone_id: candidate.previous_milestone_id,
        referenced,
        included,
        excluded_without_transactions,
        excluded_conflicting,
        created,
        consumed,
        confirmed_merkle_root,
        applied_merkle_root,
    })
}
