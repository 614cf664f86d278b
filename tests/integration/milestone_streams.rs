//! Milestone streams over TCP with several concurrent subscribers.

use tangle_engine::ConfirmationKind;
use tangle_inx::InxClient;
use tangle_integration_tests::{TestLedger, WAIT};
use tangle_types::{MilestoneId, MilestoneIndex};
use tokio::time::timeout;

#[tokio::test]
async fn test_two_confirmed_subscribers_receive_index_100() {
    let ledger = TestLedger::new(99);
    let addr = ledger.serve().await;
    let kind = ConfirmationKind::ConfirmedMilestoneChanged;

    let mut first = InxClient::connect(addr)
        .await
        .unwrap()
        .listen_to_confirmed_milestone()
        .await
        .unwrap();
    let mut second = InxClient::connect(addr)
        .await
        .unwrap()
        .listen_to_confirmed_milestone()
        .await
        .unwrap();
    ledger.wait_for_subscribers(kind, 2).await;

    let index = ledger.advance("hundred").await;
    assert_eq!(index, MilestoneIndex(100));

    for stream in [&mut first, &mut second] {
        let got = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(got.milestone_info.milestone_index, MilestoneIndex(100));
        assert_eq!(got.milestone_info.milestone_id, MilestoneId::from_data(&got.raw));
    }

    // One subscriber leaves mid-stream; the other keeps receiving.
    first.close().await.unwrap();
    ledger.wait_for_subscribers(kind, 1).await;

    ledger.advance("hundred-and-one").await;
    let got = timeout(WAIT, second.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(got.milestone_info.milestone_index, MilestoneIndex(101));

    // Exactly one event per confirmation: nothing else is queued.
    assert!(
        timeout(std::time::Duration::from_millis(100), second.next())
            .await
            .is_err()
    );

    second.close().await.unwrap();
    ledger.wait_for_subscribers(kind, 0).await;
    assert_eq!(ledger.tangle().storage().outstanding_milestone_handles(), 0);
}

#[tokio::test]
async fn test_latest_and_confirmed_streams_are_separate() {
    let ledger = TestLedger::new(1);
    let addr = ledger.serve().await;

    let mut latest = InxClient::connect(addr)
        .await
        .unwrap()
        .listen_to_latest_milestone()
        .await
        .unwrap();
    let mut confirmed = InxClient::connect(addr)
        .await
        .unwrap()
        .listen_to_confirmed_milestone()
        .await
        .unwrap();
    ledger
        .wait_for_subscribers(ConfirmationKind::LatestMilestoneChanged, 1)
        .await;
    ledger
        .wait_for_subscribers(ConfirmationKind::ConfirmedMilestoneChanged, 1)
        .await;

    // Received but not yet confirmed: only the latest stream sees it.
    let parent = ledger.attach_data(vec![tangle_types::MessageId::EMPTY], "a");
    let index = ledger.issue_milestone(vec![parent]).await;
    let got = timeout(WAIT, latest.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(got.milestone_info.milestone_index, index);
    assert!(
        timeout(std::time::Duration::from_millis(100), confirmed.next())
            .await
            .is_err()
    );

    ledger.confirm(index).await;
    let got = timeout(WAIT, confirmed.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(got.milestone_info.milestone_index, index);

    latest.close().await.unwrap();
    confirmed.close().await.unwrap();
}

#[tokio::test]
async fn test_node_shutdown_ends_streams() {
    let ledger = TestLedger::new(1);
    let addr = ledger.serve().await;

    let mut stream = InxClient::connect(addr)
        .await
        .unwrap()
        .listen_to_confirmed_milestone()
        .await
        .unwrap();
    ledger
        .wait_for_subscribers(ConfirmationKind::ConfirmedMilestoneChanged, 1)
        .await;

    ledger.tangle().shutdown();
    assert!(timeout(WAIT, stream.next()).await.unwrap().is_none());
    ledger
        .wait_for_subscribers(ConfirmationKind::ConfirmedMilestoneChanged, 0)
        .await;
}
