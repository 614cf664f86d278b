//! Confirmation event bus: fan-out of milestone changes to live subscribers.
//!
//! The confirmation pipeline calls [`ConfirmationEventBus::publish`] when the
//! latest or confirmed milestone changes. Each registered [`Subscription`]
//! owns a private bounded queue; publishing retains the milestone handle
//! once per matching subscriber and enqueues it with `try_send`, so the
//! publisher never waits on a slow consumer. A full queue drops the event
//! for that subscriber only.
//!
//! Register/unregister are the only mutations of the registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tangle_store::CachedMilestone;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Which milestone pointer changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConfirmationKind {
    /// A newer milestone was received (not yet confirmed).
    LatestMilestoneChanged,
    /// A milestone was confirmed and applied to the ledger.
    ConfirmedMilestoneChanged,
}

/// One event in a subscriber queue.
///
/// Owns one reference to the milestone; whoever dequeues the event owns
/// that reference and releases it by dropping the event.
#[derive(Debug)]
pub struct ConfirmationEvent {
    /// What changed.
    pub kind: ConfirmationKind,
    /// The milestone the event is about.
    pub milestone: CachedMilestone,
}

/// Identifies one registration on the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ConfirmationEventBus
// ---------------------------------------------------------------------------

struct Subscriber {
    kind: ConfirmationKind,
    tx: mpsc::Sender<ConfirmationEvent>,
}

struct BusInner {
    next_id: u64,
    subscribers: HashMap<SubscriptionId, Subscriber>,
}

/// Process-wide publish point for milestone changes.
///
/// Clonable (`Arc` inside). Thread-safe. Publishing never blocks on
/// subscribers.
#[derive(Clone)]
pub struct ConfirmationEventBus {
    inner: Arc<Mutex<BusInner>>,
    queue_capacity: usize,
}

impl ConfirmationEventBus {
    /// Create a bus whose subscribers get queues of `queue_capacity` events.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                next_id: 0,
                subscribers: HashMap::new(),
            })),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new subscriber for `kind`.
    ///
    /// Only events published after this call are delivered.
    pub fn register(&self, kind: ConfirmationKind) -> Subscription {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let mut inner = self.inner.lock().expect("event bus lock poisoned");
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.subscribers.insert(id, Subscriber { kind, tx });
        debug!(%id, ?kind, "subscriber registered");

        Subscription {
            id,
            kind,
            bus: self.clone(),
            rx,
            detached: false,
        }
    }

    /// Remove a registration. Returns `false` if it was already gone.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        let removed = self
            .inner
            .lock()
            .expect("event bus lock poisoned")
            .subscribers
            .remove(&id)
            .is_some();
        if removed {
            debug!(%id, "subscriber unregistered");
        }
        removed
    }

    /// Publish a milestone change to every subscriber of `kind`.
    ///
    /// Each enqueued event holds its own retained handle; the caller keeps
    /// (and later releases) the handle it passed in. Returns the number of
    /// subscribers the event was enqueued for.
    pub fn publish(&self, kind: ConfirmationKind, milestone: &CachedMilestone) -> usize {
        let mut inner = self.inner.lock().expect("event bus lock poisoned");
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, sub) in inner.subscribers.iter().filter(|(_, s)| s.kind == kind) {
            let event = ConfirmationEvent {
                kind,
                milestone: milestone.retain(),
            };
            match sub.tx.try_send(event) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_event)) => {
                    warn!(
                        %id,
                        ?kind,
                        index = %milestone.key(),
                        "subscriber queue full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_event)) => closed.push(*id),
            }
        }

        for id in closed {
            inner.subscribers.remove(&id);
            debug!(%id, "removed subscriber with closed queue");
        }

        delivered
    }

    /// Number of registered subscribers for `kind`.
    pub fn subscriber_count(&self, kind: ConfirmationKind) -> usize {
        self.inner
            .lock()
            .expect("event bus lock poisoned")
            .subscribers
            .values()
            .filter(|s| s.kind == kind)
            .count()
    }
}

impl Default for ConfirmationEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl fmt::Debug for ConfirmationEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().expect("event bus lock poisoned");
        f.debug_struct("ConfirmationEventBus")
            .field("subscribers", &inner.subscribers.len())
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A registration plus its private event queue.
///
/// Dropping the subscription detaches it: it is unregistered from the bus
/// first, then every queued event (and its milestone handle) is released.
pub struct Subscription {
    id: SubscriptionId,
    kind: ConfirmationKind,
    bus: ConfirmationEventBus,
    rx: mpsc::Receiver<ConfirmationEvent>,
    detached: bool,
}

impl Subscription {
    /// This subscription's id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The event kind this subscription receives.
    pub fn kind(&self) -> ConfirmationKind {
        self.kind
    }

    /// Wait for the next event, in publish order.
    ///
    /// Returns `None` once the subscription has been detached.
    pub async fn recv(&mut self) -> Option<ConfirmationEvent> {
        self.rx.recv().await
    }

    /// Number of events waiting in the queue.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Unregister and release every queued event.
    ///
    /// Returns how many queued events were discarded.
    pub fn detach(mut self) -> usize {
        self.detach_inner()
    }

    fn detach_inner(&mut self) -> usize {
        if self.detached {
            return 0;
        }
        self.detached = true;

        self.bus.unregister(self.id);
        self.rx.close();

        let mut drained = 0;
        while let Ok(event) = self.rx.try_recv() {
            drop(event);
            drained += 1;
        }
        if drained > 0 {
            debug!(id = %self.id, drained, "released queued events on detach");
        }
        drained
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach_inner();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("pending", &self.rx.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
