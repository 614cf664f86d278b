//! Shared test utilities for tangle-engine tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tangle_store::{LedgerMutation, MemoryStore, Snapshot, StoreError, TangleStore};
use tangle_types::{
    Message, MessageId, MessageMetadata, Milestone, MilestoneId, MilestoneIndex, MilestonePayload,
    Output, OutputId, Payload, TransactionPayload,
};

use crate::tangle::{Tangle, TangleConfig};
use crate::whiteflag::{self, WhiteFlagCandidate};

pub const GENESIS_AMOUNT: u64 = 1_000;

pub fn address(n: u8) -> [u8; 32] {
    [n; 32]
}

pub fn output(n: u8, amount: u64) -> Output {
    Output {
        address: address(n),
        amount,
    }
}

pub fn genesis_output_id() -> OutputId {
    OutputId::new(MessageId::from_data(b"genesis"), 0)
}

/// A tangle over an in-memory store whose snapshot holds one genesis output.
///
/// With a non-zero `ledger_index` the node starts out synced.
pub fn test_tangle(ledger_index: u32) -> Tangle {
    let store = Arc::new(MemoryStore::with_snapshot(&genesis_snapshot(ledger_index)));
    Tangle::new(store, TangleConfig::default()).unwrap()
}

pub fn genesis_snapshot(ledger_index: u32) -> Snapshot {
    Snapshot {
        ledger_index: MilestoneIndex(ledger_index),
        solid_entry_points: vec![],
        outputs: vec![(genesis_output_id(), output(0, GENESIS_AMOUNT))],
    }
}

// ---------------------------------------------------------------------------
// FlakyStore
// ---------------------------------------------------------------------------

/// A [`MemoryStore`] whose next `failures` ledger mutations fail with an
/// I/O error before anything is written.
pub struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(snapshot: &Snapshot, failures: usize) -> Self {
        Self {
            inner: MemoryStore::with_snapshot(snapshot),
            failures: AtomicUsize::new(failures),
        }
    }
}

impl TangleStore for FlakyStore {
    fn put_message(&self, message: &Message) -> Result<MessageId, StoreError> {
        self.inner.put_message(message)
    }

    fn get_message(&self, id: &MessageId) -> Result<Option<Message>, StoreError> {
        self.inner.get_message(id)
    }

    fn contains_message(&self, id: &MessageId) -> Result<bool, StoreError> {
        self.inner.contains_message(id)
    }

    fn get_metadata(&self, id: &MessageId) -> Result<Option<MessageMetadata>, StoreError> {
        self.inner.get_metadata(id)
    }

    fn put_metadata(&self, id: &MessageId, metadata: &MessageMetadata) -> Result<(), StoreError> {
        self.inner.put_metadata(id, metadata)
    }

    fn put_milestone(&self, milestone: &Milestone) -> Result<(), StoreError> {
        self.inner.put_milestone(milestone)
    }

    fn get_milestone(&self, index: MilestoneIndex) -> Result<Option<Milestone>, StoreError> {
        self.inner.get_milestone(index)
    }

    fn is_solid_entry_point(&self, id: &MessageId) -> Result<bool, StoreError> {
        self.inner.is_solid_entry_point(id)
    }

    fn get_unspent_output(&self, id: &OutputId) -> Result<Option<Output>, StoreError> {
        self.inner.get_unspent_output(id)
    }

    fn apply_ledger_mutation(&self, mutation: &LedgerMutation) -> Result<(), StoreError> {
        let failed = self
            .failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(std::io::Error::other("disk hiccup").into());
        }
        self.inner.apply_ledger_mutation(mutation)
    }

    fn ledger_index(&self) -> Result<MilestoneIndex, StoreError> {
        self.inner.ledger_index()
    }

    fn load_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.inner.load_snapshot(snapshot)
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Attach a message without ledger effect. `tag` keeps ids distinct.
pub fn data_message(tangle: &Tangle, parents: Vec<MessageId>, tag: &str) -> MessageId {
    tangle
        .attach_message(&Message::new(
            parents,
            Some(Payload::TaggedData {
                tag: tag.as_bytes().to_vec(),
                data: vec![],
            }),
        ))
        .unwrap()
}

/// Attach a transaction message.
pub fn tx_message(
    tangle: &Tangle,
    parents: Vec<MessageId>,
    inputs: Vec<OutputId>,
    outputs: Vec<Output>,
) -> MessageId {
    tangle
        .attach_message(&Message::new(
            parents,
            Some(Payload::Transaction(TransactionPayload { inputs, outputs })),
        ))
        .unwrap()
}

/// Build, attach and receive a milestone with correct merkle roots.
pub fn issue_milestone(tangle: &Tangle, index: u32, parents: Vec<MessageId>) -> MessageId {
    let id = attach_milestone(tangle, index, parents);
    tangle.receive_milestone(&id).unwrap();
    id
}

/// Build and attach a milestone with correct merkle roots without
/// receiving it.
pub fn attach_milestone(tangle: &Tangle, index: u32, parents: Vec<MessageId>) -> MessageId {
    let candidate = WhiteFlagCandidate {
        index: MilestoneIndex(index),
        timestamp: 1_700_000_000 + index,
        parents: parents.clone(),
        previous_milestone_id: MilestoneId::from([0u8; 32]),
    };
    let mutations = whiteflag::compute_white_flag_mutations(
        tangle.storage(),
        &candidate,
        &tangle.shutdown_signal(),
    )
    .unwrap();

    let payload = MilestonePayload {
        index: candidate.index,
        timestamp: candidate.timestamp,
        previous_milestone_id: candidate.previous_milestone_id,
        parents: parents.clone(),
        confirmed_merkle_root: mutations.confirmed_merkle_root,
        applied_merkle_root: mutations.applied_merkle_root,
        signatures: vec![],
    };
    tangle
        .attach_message(&Message::new(parents, Some(Payload::Milestone(payload))))
        .unwrap()
}
