//! A stalled or cancelled subscriber never holds up the node or its peers.

use std::time::Duration;

use tangle_engine::{ConfirmationKind, TangleConfig};
use tangle_inx::{InxMilestone, stream_milestones};
use tangle_integration_tests::{TestLedger, WAIT};
use tangle_types::MilestoneIndex;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

#[tokio::test]
async fn test_stalled_subscriber_does_not_delay_delivery() {
    let ledger = TestLedger::new(1);
    let kind = ConfirmationKind::ConfirmedMilestoneChanged;

    // Never read: the worker blocks on its second send.
    let (stalled_tx, _stalled_rx) = mpsc::channel::<InxMilestone>(1);
    let (stalled_cancel, stalled_cancel_rx) = watch::channel(false);
    let stalled = tokio::spawn(stream_milestones(
        ledger.tangle().clone(),
        kind,
        stalled_tx,
        stalled_cancel_rx,
    ));

    let (live_tx, mut live_rx) = mpsc::channel::<InxMilestone>(64);
    let (live_cancel, live_cancel_rx) = watch::channel(false);
    let live = tokio::spawn(stream_milestones(
        ledger.tangle().clone(),
        kind,
        live_tx,
        live_cancel_rx,
    ));
    ledger.wait_for_subscribers(kind, 2).await;

    for n in 0..20 {
        // Confirmation itself must not wait on the stalled subscriber.
        timeout(WAIT, ledger.advance(&format!("m{n}"))).await.unwrap();
    }
    for expected in 2..=21 {
        let got = timeout(WAIT, live_rx.recv()).await.unwrap().unwrap();
        assert_eq!(got.milestone_info.milestone_index, MilestoneIndex(expected));
    }

    live_cancel.send(true).unwrap();
    stalled_cancel.send(true).unwrap();
    timeout(WAIT, live).await.unwrap().unwrap().unwrap();
    timeout(WAIT, stalled).await.unwrap().unwrap().unwrap();
    assert_eq!(ledger.tangle().events().subscriber_count(kind), 0);
    assert_eq!(ledger.tangle().storage().outstanding_milestone_handles(), 0);
}

#[tokio::test]
async fn test_full_queue_drops_events_for_that_subscriber_only() {
    let config = TangleConfig {
        subscriber_queue_capacity: 2,
        ..TangleConfig::default()
    };
    let ledger = TestLedger::with_config(1, config);
    let kind = ConfirmationKind::ConfirmedMilestoneChanged;

    let (stalled_tx, mut stalled_rx) = mpsc::channel::<InxMilestone>(1);
    let (stalled_cancel, stalled_cancel_rx) = watch::channel(false);
    let stalled = tokio::spawn(stream_milestones(
        ledger.tangle().clone(),
        kind,
        stalled_tx,
        stalled_cancel_rx,
    ));

    let (live_tx, mut live_rx) = mpsc::channel::<InxMilestone>(1);
    let (live_cancel, live_cancel_rx) = watch::channel(false);
    let live = tokio::spawn(stream_milestones(
        ledger.tangle().clone(),
        kind,
        live_tx,
        live_cancel_rx,
    ));
    ledger.wait_for_subscribers(kind, 2).await;

    // The live subscriber is drained after each confirmation and so never
    // overflows its two-slot queue.
    for n in 0..10 {
        let index = ledger.advance(&format!("m{n}")).await;
        let got = timeout(WAIT, live_rx.recv()).await.unwrap().unwrap();
        assert_eq!(got.milestone_info.milestone_index, index);
    }

    live_cancel.send(true).unwrap();
    stalled_cancel.send(true).unwrap();
    timeout(WAIT, live).await.unwrap().unwrap().unwrap();
    timeout(WAIT, stalled).await.unwrap().unwrap().unwrap();

    // The stalled subscriber got its first milestone and then fell behind.
    let first = stalled_rx.try_recv().unwrap();
    assert_eq!(first.milestone_info.milestone_index, MilestoneIndex(2));
    assert_eq!(ledger.tangle().storage().outstanding_milestone_handles(), 0);
}

#[tokio::test]
async fn test_cancel_mid_stream_leaves_no_handles() {
    let ledger = TestLedger::new(1);
    let kind = ConfirmationKind::LatestMilestoneChanged;

    for round in 0..5 {
        let (tx, mut rx) = mpsc::channel::<InxMilestone>(1);
        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(stream_milestones(
            ledger.tangle().clone(),
            kind,
            tx,
            cancel_rx,
        ));
        ledger.wait_for_subscribers(kind, 1).await;

        ledger.advance(&format!("r{round}-a")).await;
        ledger.advance(&format!("r{round}-b")).await;
        ledger.advance(&format!("r{round}-c")).await;
        let _ = timeout(Duration::from_millis(50), rx.recv()).await;

        cancel.send(true).unwrap();
        timeout(WAIT, task).await.unwrap().unwrap().unwrap();
        ledger.wait_for_subscribers(kind, 0).await;
        assert_eq!(ledger.tangle().storage().outstanding_handles(), 0);
    }
}
