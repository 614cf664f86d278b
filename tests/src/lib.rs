//! Shared test harness for tangle integration tests.
//!
//! Provides [`TestLedger`]: a [`Tangle`] over a bootstrapped store with
//! helpers to attach messages, issue milestones with correct merkle roots,
//! confirm them and serve the INX gateway on a local port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tangle_engine::{ConfirmationKind, Tangle, TangleConfig, WhiteFlagMutations};
use tangle_inx::InxServer;
use tangle_store::{MemoryStore, Snapshot, TangleStore};
use tangle_types::{
    Message, MessageId, MilestoneId, MilestoneIndex, MilestonePayload, Output, OutputId, Payload,
    TransactionPayload,
};
use tokio::net::TcpListener;
use tracing::debug;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Amount held by the single genesis output.
pub const GENESIS_AMOUNT: u64 = 1_000;

/// The unspent output every test ledger starts with.
pub fn genesis_output_id() -> OutputId {
    OutputId::new(MessageId::from_data(b"genesis"), 0)
}

/// An output of `amount` tokens to the address `[n; 32]`.
pub fn output(n: u8, amount: u64) -> Output {
    Output {
        address: [n; 32],
        amount,
    }
}

/// Snapshot at `ledger_index` holding the genesis output.
pub fn genesis_snapshot(ledger_index: u32) -> Snapshot {
    Snapshot {
        ledger_index: MilestoneIndex(ledger_index),
        solid_entry_points: vec![],
        outputs: vec![(genesis_output_id(), output(0, GENESIS_AMOUNT))],
    }
}

// =========================================================================
// TestLedger
// =========================================================================

/// A single node's ledger, driven directly by the test.
pub struct TestLedger {
    tangle: Arc<Tangle>,
}

impl TestLedger {
    /// In-memory ledger resuming at `ledger_index` (synced if non-zero).
    pub fn new(ledger_index: u32) -> Self {
        Self::with_config(ledger_index, TangleConfig::default())
    }

    /// In-memory ledger with explicit engine configuration.
    pub fn with_config(ledger_index: u32, config: TangleConfig) -> Self {
        let store = Arc::new(MemoryStore::with_snapshot(&genesis_snapshot(ledger_index)));
        Self::with_store(store, config)
    }

    /// Ledger over an already bootstrapped store.
    pub fn with_store(store: Arc<dyn TangleStore>, config: TangleConfig) -> Self {
        let tangle = Tangle::new(store, config).expect("tangle over test store");
        Self {
            tangle: Arc::new(tangle),
        }
    }

    /// The underlying tangle.
    pub fn tangle(&self) -> &Arc<Tangle> {
        &self.tangle
    }

    /// An in-process gateway over this ledger.
    pub fn server(&self) -> InxServer {
        InxServer::new(Arc::clone(&self.tangle))
    }

    /// Serve the gateway on an ephemeral local port.
    pub async fn serve(&self) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind local listener");
        let addr = listener.local_addr().expect("listener address");
        tokio::spawn(self.server().serve(listener));
        addr
    }

    /// Attach a message without ledger effect. `tag` keeps ids distinct.
    pub fn attach_data(&self, parents: Vec<MessageId>, tag: &str) -> MessageId {
        self.tangle
            .attach_message(&Message::new(
                parents,
                Some(Payload::TaggedData {
                    tag: tag.as_bytes().to_vec(),
                    data: vec![],
                }),
            ))
            .expect("attach data message")
    }

    /// Attach a transaction message.
    pub fn attach_tx(
        &self,
        parents: Vec<MessageId>,
        inputs: Vec<OutputId>,
        outputs: Vec<Output>,
    ) -> MessageId {
        self.tangle
            .attach_message(&Message::new(
                parents,
                Some(Payload::Transaction(TransactionPayload { inputs, outputs })),
            ))
            .expect("attach transaction message")
    }

    /// Compute the roots for the next milestone over `parents`, then
    /// attach and receive it. The milestone is not confirmed.
    pub async fn issue_milestone(&self, parents: Vec<MessageId>) -> MilestoneIndex {
        let index = self.tangle.confirmed_milestone_index().next();
        let timestamp = 1_700_000_000 + index.0;
        let previous_milestone_id = MilestoneId::from([0u8; 32]);

        let mutations = self
            .tangle
            .check_solidity_and_compute_white_flag_mutations(
                index,
                timestamp,
                parents.clone(),
                previous_milestone_id,
            )
            .await
            .expect("white-flag over test parents");

        let payload = MilestonePayload {
            index,
            timestamp,
            previous_milestone_id,
            parents: parents.clone(),
            confirmed_merkle_root: mutations.confirmed_merkle_root,
            applied_merkle_root: mutations.applied_merkle_root,
            signatures: vec![],
        };
        let id = self
            .tangle
            .attach_message(&Message::new(parents, Some(Payload::Milestone(payload))))
            .expect("attach milestone message");
        self.tangle
            .receive_milestone(&id)
            .expect("receive milestone");
        debug!(%index, "issued milestone");
        index
    }

    /// Confirm a received milestone.
    pub async fn confirm(&self, index: MilestoneIndex) -> WhiteFlagMutations {
        self.tangle
            .confirm_milestone(index)
            .await
            .expect("confirm milestone")
    }

    /// Attach one data message and confirm a milestone on top of it.
    pub async fn advance(&self, tag: &str) -> MilestoneIndex {
        let parent = self.attach_data(vec![MessageId::EMPTY], tag);
        let index = self.issue_milestone(vec![parent]).await;
        self.confirm(index).await;
        index
    }

    /// Wait until exactly `count` subscribers of `kind` are registered.
    pub async fn wait_for_subscribers(&self, kind: ConfirmationKind, count: usize) {
        tokio::time::timeout(WAIT, async {
            while self.tangle.events().subscriber_count(kind) != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscriber count never reached");
    }
}
