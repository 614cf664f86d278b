//! [`Tangle`]: sync state, ledger lock and the milestone confirmation
//! pipeline feeding the [`ConfirmationEventBus`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tangle_store::{CachedMilestone, LedgerMutation, Storage, StorageConfig, TangleStore};
use tangle_types::{
    Message, MessageId, MessageMetadata, Milestone, MilestoneId, MilestoneIndex,
};
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use crate::error::TangleError;
use crate::events::{ConfirmationEventBus, ConfirmationKind, DEFAULT_QUEUE_CAPACITY};
use crate::whiteflag::{self, WhiteFlagCandidate, WhiteFlagMutations};

/// Configuration for a [`Tangle`].
#[derive(Debug, Clone, Copy)]
pub struct TangleConfig {
    /// Cache sizing of the object store.
    pub storage: StorageConfig,
    /// Per-subscriber event queue capacity.
    pub subscriber_queue_capacity: usize,
}

impl Default for TangleConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            subscriber_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Snapshot of the node's milestone pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStatus {
    /// Whether the confirmed milestone has caught up with the latest one.
    pub is_synced: bool,
    /// Highest milestone index seen.
    pub latest_milestone_index: MilestoneIndex,
    /// Highest milestone index applied to the ledger.
    pub confirmed_milestone_index: MilestoneIndex,
}

/// The node's ledger: storage, sync state and confirmation pipeline.
///
/// White-flag computations hold the ledger lock for reading and may run
/// concurrently; confirming a milestone holds it for writing.
///
/// Pointer updates and the matching event are published under one lock,
/// so subscribers see milestone indices in increasing order.
pub struct Tangle {
    storage: Storage,
    events: ConfirmationEventBus,
    ledger_lock: RwLock<()>,
    /// Serializes raising `latest` with publishing the event.
    latest_lock: Mutex<()>,
    latest: AtomicU32,
    confirmed: AtomicU32,
    shutdown: watch::Sender<bool>,
}

impl Tangle {
    /// Create a tangle over `store`, resuming from its ledger index.
    pub fn new(store: Arc<dyn TangleStore>, config: TangleConfig) -> Result<Self, TangleError> {
        let ledger_index = store.ledger_index()?;
        let (shutdown, _) = watch::channel(false);
        info!(%ledger_index, "tangle initialised");

        Ok(Self {
            storage: Storage::with_config(store, config.storage),
            events: ConfirmationEventBus::new(config.subscriber_queue_capacity),
            ledger_lock: RwLock::new(()),
            latest_lock: Mutex::new(()),
            latest: AtomicU32::new(ledger_index.0),
            confirmed: AtomicU32::new(ledger_index.0),
            shutdown,
        })
    }

    /// The cached object store.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// The confirmation event bus.
    pub fn events(&self) -> &ConfirmationEventBus {
        &self.events
    }

    // ----- Sync state -----

    /// Highest milestone index received.
    pub fn latest_milestone_index(&self) -> MilestoneIndex {
        MilestoneIndex(self.latest.load(Ordering::Acquire))
    }

    /// Highest milestone index confirmed.
    pub fn confirmed_milestone_index(&self) -> MilestoneIndex {
        MilestoneIndex(self.confirmed.load(Ordering::Acquire))
    }

    /// Synced iff a milestone is known and the ledger has caught up with it.
    pub fn is_node_synced(&self) -> bool {
        self.sync_status().is_synced
    }

    /// Current milestone pointers.
    pub fn sync_status(&self) -> SyncStatus {
        let latest = self.latest_milestone_index();
        let confirmed = self.confirmed_milestone_index();
        SyncStatus {
            is_synced: latest.0 != 0 && confirmed >= latest,
            latest_milestone_index: latest,
            confirmed_milestone_index: confirmed,
        }
    }

    // ----- Shutdown -----

    /// Raise the shutdown signal. Running computations abort and live
    /// streams end.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        info!("tangle shutdown requested");
    }

    /// A receiver that observes the shutdown signal.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    // ----- Ingestion -----

    /// Store a message received from the network.
    ///
    /// The message is flagged solid when every parent is a solid entry
    /// point or itself solid.
    pub fn attach_message(&self, message: &Message) -> Result<MessageId, TangleError> {
        let store = self.storage.store();
        let id = store.put_message(message)?;

        let mut solid = true;
        for parent in &message.parents {
            let parent_solid = *parent == MessageId::EMPTY
                || store.is_solid_entry_point(parent)?
                || store.get_metadata(parent)?.is_some_and(|m| m.solid);
            if !parent_solid {
                solid = false;
                break;
            }
        }

        if solid {
            let mut meta = store.get_metadata(&id)?.unwrap_or_default();
            if !meta.solid {
                meta.solid = true;
                store.put_metadata(&id, &meta)?;
            }
        }
        debug!(%id, solid, "attached message");
        Ok(id)
    }

    /// Register the milestone carried by `message_id`.
    ///
    /// Persists the milestone record and, if it is newer than every
    /// milestone seen so far, publishes
    /// [`ConfirmationKind::LatestMilestoneChanged`]. Receiving a known
    /// index again is a no-op.
    pub fn receive_milestone(&self, message_id: &MessageId) -> Result<MilestoneIndex, TangleError> {
        let message = self
            .storage
            .acquire_message(message_id)?
            .ok_or(TangleError::MessageNotFound(*message_id))?;
        let payload = message
            .milestone()
            .ok_or(TangleError::NotAMilestone(*message_id))?;
        let index = payload.index;
        let store = self.storage.store();

        if store.get_milestone(index)?.is_some() {
            debug!(%index, "milestone already known");
            return Ok(index);
        }

        store.put_milestone(&Milestone {
            index,
            timestamp: payload.timestamp,
            message_id: *message_id,
        })?;
        message.release();

        let milestone = self.acquire_milestone(index)?;
        self.raise_latest(&milestone);
        Ok(index)
    }

    /// Raise the latest pointer to `milestone` and publish the change.
    /// Does nothing if a newer milestone is already known.
    fn raise_latest(&self, milestone: &CachedMilestone) {
        let index = milestone.index;
        let _guard = self.latest_lock.lock().expect("latest lock poisoned");
        if index.0 > self.latest.load(Ordering::Acquire) {
            self.latest.store(index.0, Ordering::Release);
            info!(%index, "latest milestone changed");
            self.events
                .publish(ConfirmationKind::LatestMilestoneChanged, milestone);
        }
    }

    // ----- White flag -----

    /// Compute the white-flag mutations for a candidate milestone.
    ///
    /// Requires a synced node. Holds the ledger lock for reading for the
    /// whole walk, so concurrent computations do not block each other but
    /// do wait for a running confirmation.
    pub async fn check_solidity_and_compute_white_flag_mutations(
        &self,
        index: MilestoneIndex,
        timestamp: u32,
        parents: Vec<MessageId>,
        previous_milestone_id: MilestoneId,
    ) -> Result<WhiteFlagMutations, TangleError> {
        if !self.is_node_synced() {
            return Err(TangleError::NodeNotSynced);
        }
        if parents.is_empty() {
            return Err(TangleError::ParentsNotGiven);
        }

        let candidate = WhiteFlagCandidate {
            index,
            timestamp,
            parents,
            previous_milestone_id,
        };
        let abort = self.shutdown_signal();

        let _guard = self.ledger_lock.read().await;
        if *abort.borrow() {
            return Err(TangleError::OperationAborted);
        }
        whiteflag::compute_white_flag_mutations(&self.storage, &candidate, &abort)
    }

    // ----- Confirmation -----

    /// Confirm the milestone at `index` and apply its mutations.
    ///
    /// Milestones are confirmed strictly in order. The white-flag result is
    /// recomputed under the write lock and must match both roots of the
    /// milestone payload. The ledger update is atomic; once it is written,
    /// [`ConfirmationKind::ConfirmedMilestoneChanged`] is published before
    /// the write lock is released.
    pub async fn confirm_milestone(
        &self,
        index: MilestoneIndex,
    ) -> Result<WhiteFlagMutations, TangleError> {
        let milestone = self.acquire_milestone(index)?;
        let abort = self.shutdown_signal();

        let mutations = {
            let _guard = self.ledger_lock.write().await;
            let store = self.storage.store();

            let ledger_index = store.ledger_index()?;
            if index != ledger_index.next() {
                return Err(TangleError::OutOfOrder {
                    index,
                    ledger_index,
                });
            }

            let message = self
                .storage
                .acquire_message(&milestone.message_id)?
                .ok_or(TangleError::MessageNotFound(milestone.message_id))?;
            let payload = message
                .milestone()
                .ok_or(TangleError::NotAMilestone(milestone.message_id))?;

            let candidate = WhiteFlagCandidate {
                index,
                timestamp: payload.timestamp,
                parents: payload.parents.clone(),
                previous_milestone_id: payload.previous_milestone_id,
            };
            let mutations =
                whiteflag::compute_white_flag_mutations(&self.storage, &candidate, &abort)?;

            if mutations.confirmed_merkle_root != payload.confirmed_merkle_root {
                warn!(%index, "confirmed merkle root mismatch");
                return Err(TangleError::MerkleRootMismatch {
                    index,
                    root: "confirmed",
                });
            }
            if mutations.applied_merkle_root != payload.applied_merkle_root {
                warn!(%index, "applied merkle root mismatch");
                return Err(TangleError::MerkleRootMismatch {
                    index,
                    root: "applied",
                });
            }

            let mut metadata = Vec::with_capacity(mutations.referenced.len());
            for id in &mutations.referenced {
                let mut meta: MessageMetadata = store.get_metadata(id)?.unwrap_or_default();
                meta.solid = true;
                meta.referenced_by = Some(index);
                meta.conflict = mutations.conflict_of(id);
                metadata.push((*id, meta));
            }

            // Metadata, outputs and the ledger index land in one write.
            store.apply_ledger_mutation(&LedgerMutation {
                index,
                metadata,
                created: mutations.created.clone(),
                consumed: mutations.consumed.clone(),
            })?;
            self.confirmed.store(index.0, Ordering::Release);
            self.raise_latest(&milestone);

            info!(
                %index,
                referenced = mutations.referenced.len(),
                included = mutations.included.len(),
                conflicting = mutations.excluded_conflicting.len(),
                "milestone confirmed"
            );
            // Published while the write lock is held: confirmations are
            // observed in ledger order.
            self.events
                .publish(ConfirmationKind::ConfirmedMilestoneChanged, &milestone);
            mutations
        };

        Ok(mutations)
    }

    fn acquire_milestone(&self, index: MilestoneIndex) -> Result<CachedMilestone, TangleError> {
        self.storage
            .acquire_milestone(index)?
            .ok_or(TangleError::MilestoneNotFound(index))
    }
}

impl std::fmt::Debug for Tangle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tangle")
            .field("status", &self.sync_status())
            .finish_non_exhaustive()
    }
}
