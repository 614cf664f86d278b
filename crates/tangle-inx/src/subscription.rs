//! Streaming subscriptions: one fan-out worker per streaming call.
//!
//! A session goes through three states:
//!
//! - attached: a [`Subscription`] is registered on the event bus for the
//!   requested kind and the worker task is spawned;
//! - streaming: the worker dequeues one event at a time, materializes it
//!   and writes it to the caller's [`MilestoneSink`];
//! - detached: on cancellation (caller gone, node shutdown) or on a
//!   materialize/send error the worker unregisters from the bus, releases
//!   every queued event and ends the call.
//!
//! The bus only ever enqueues, so a slow sink delays nobody but its own
//! session.

use std::sync::Arc;

use tangle_engine::{ConfirmationKind, Subscription, Tangle};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::InxError;
use crate::materialize::milestone_for_cached_milestone;
use crate::message::InxMilestone;

/// Outbound side of a milestone stream.
#[async_trait::async_trait]
pub trait MilestoneSink: Send {
    /// Deliver one milestone. An error ends the stream.
    async fn send(&mut self, milestone: InxMilestone) -> Result<(), InxError>;
}

#[async_trait::async_trait]
impl MilestoneSink for mpsc::Sender<InxMilestone> {
    async fn send(&mut self, milestone: InxMilestone) -> Result<(), InxError> {
        mpsc::Sender::send(self, milestone)
            .await
            .map_err(|_| InxError::ConnectionClosed)
    }
}

/// Aborts the worker if the calling future is dropped mid-stream.
struct WorkerGuard(JoinHandle<Result<(), InxError>>);

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Serve one streaming call: stream milestones of `kind` into `sink`
/// until `cancel` turns `true` (or its sender is dropped), the node shuts
/// down, or delivery fails.
///
/// Cancellation ends the call with `Ok(())`; a materialize or send
/// failure ends it with that error. In every case no milestone handle
/// taken for this call outlives it.
pub async fn stream_milestones<S>(
    tangle: Arc<Tangle>,
    kind: ConfirmationKind,
    sink: S,
    cancel: watch::Receiver<bool>,
) -> Result<(), InxError>
where
    S: MilestoneSink + 'static,
{
    if *cancel.borrow() {
        return Ok(());
    }

    let subscription = tangle.events().register(kind);
    info!(id = %subscription.id(), ?kind, "subscriber attached");

    let mut guard = WorkerGuard(tokio::spawn(fan_out_worker(
        tangle,
        subscription,
        sink,
        cancel,
    )));

    match (&mut guard.0).await {
        Ok(result) => result,
        Err(e) => Err(InxError::Internal(format!("fan-out worker failed: {e}"))),
    }
}

async fn fan_out_worker<S>(
    tangle: Arc<Tangle>,
    mut subscription: Subscription,
    mut sink: S,
    mut cancel: watch::Receiver<bool>,
) -> Result<(), InxError>
where
    S: MilestoneSink,
{
    let mut shutdown = tangle.shutdown_signal();
    let id = subscription.id();
    let mut sent = 0u64;

    let result = loop {
        if *cancel.borrow() || *shutdown.borrow() {
            break Ok(());
        }

        let event = tokio::select! {
            biased;
            changed = cancel.changed() => match changed {
                Ok(()) => continue,
                Err(_) => break Ok(()),
            },
            changed = shutdown.changed() => match changed {
                Ok(()) => continue,
                Err(_) => break Ok(()),
            },
            event = subscription.recv() => event,
        };
        let Some(event) = event else {
            break Ok(());
        };

        let milestone = match milestone_for_cached_milestone(tangle.storage(), event.milestone) {
            Ok(milestone) => milestone,
            Err(e) => {
                warn!(%id, error = %e, "failed to materialize milestone");
                break Err(e);
            }
        };
        let index = milestone.milestone_info.milestone_index;

        // Only a raised (or dropped) signal abandons an in-flight send.
        tokio::select! {
            biased;
            _ = cancel.wait_for(|cancelled| *cancelled) => break Ok(()),
            _ = shutdown.wait_for(|stopping| *stopping) => break Ok(()),
            sent_result = sink.send(milestone) => {
                if let Err(e) = sent_result {
                    warn!(%id, %index, error = %e, "failed to send milestone");
                    break Err(e);
                }
                sent += 1;
                debug!(%id, %index, "milestone sent");
            }
        }
    };

    let released = subscription.detach();
    info!(%id, sent, released, ok = result.is_ok(), "subscriber detached");
    result
}
