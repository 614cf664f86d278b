//! `ReadMilestone` and `ReadNodeStatus` against in-memory and on-disk
//! ledgers.

use std::sync::Arc;

use tangle_engine::TangleConfig;
use tangle_inx::{InxClient, StatusCode};
use tangle_integration_tests::{TestLedger, genesis_snapshot};
use tangle_store::{FjallStore, TangleStore};
use tangle_types::{MessageId, MilestoneId, MilestoneIndex, MilestonePayload};

#[tokio::test]
async fn test_read_milestone_matches_confirmation_state() {
    let ledger = TestLedger::new(10);
    for n in 0..5 {
        ledger.advance(&format!("m{n}")).await;
    }
    // Received, not confirmed.
    let pending = ledger.attach_data(vec![MessageId::EMPTY], "pending");
    let unconfirmed = ledger.issue_milestone(vec![pending]).await;
    assert_eq!(unconfirmed, MilestoneIndex(16));

    let addr = ledger.serve().await;
    let mut client = InxClient::connect(addr).await.unwrap();

    for index in 0..=20u32 {
        let result = client.read_milestone(MilestoneIndex(index)).await;
        if (11..=15).contains(&index) {
            let milestone = result.unwrap();
            assert_eq!(milestone.milestone_info.milestone_index, MilestoneIndex(index));
            assert_eq!(
                milestone.milestone_info.milestone_id,
                MilestoneId::from_data(&milestone.raw)
            );
            let payload = MilestonePayload::deserialize(&milestone.raw).unwrap();
            assert_eq!(payload.index, MilestoneIndex(index));
            assert_eq!(payload.timestamp, milestone.milestone_info.milestone_timestamp);
        } else {
            assert_eq!(result.unwrap_err().code(), StatusCode::NotFound, "index {index}");
        }
    }

    let status = client.read_node_status().await.unwrap();
    assert!(!status.is_synced);
    assert_eq!(status.latest_milestone_index, MilestoneIndex(16));
    assert_eq!(status.confirmed_milestone_index, MilestoneIndex(15));
    assert_eq!(ledger.tangle().storage().outstanding_handles(), 0);
}

#[tokio::test]
async fn test_materialization_is_byte_identical() {
    let ledger = TestLedger::new(1);
    let index = ledger.advance("once").await;
    let addr = ledger.serve().await;

    let mut a = InxClient::connect(addr).await.unwrap();
    let mut b = InxClient::connect(addr).await.unwrap();
    let first = a.read_milestone(index).await.unwrap();
    let second = b.read_milestone(index).await.unwrap();
    assert_eq!(first.raw, second.raw);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_fjall_ledger_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger");

    let read_before = {
        let store = FjallStore::open(&path).unwrap();
        store.load_snapshot(&genesis_snapshot(1)).unwrap();
        let ledger = TestLedger::with_store(Arc::new(store), TangleConfig::default());
        ledger.advance("a").await;
        let index = ledger.advance("b").await;
        ledger.server().read_milestone(index).unwrap()
    };

    let store = FjallStore::open(&path).unwrap();
    let ledger = TestLedger::with_store(Arc::new(store), TangleConfig::default());
    let status = ledger.server().read_node_status();
    assert!(status.is_synced);
    assert_eq!(status.confirmed_milestone_index, MilestoneIndex(3));

    let read_after = ledger
        .server()
        .read_milestone(MilestoneIndex(3))
        .unwrap();
    assert_eq!(read_before, read_after);

    // And the reopened node keeps confirming.
    let index = ledger.advance("c").await;
    assert_eq!(index, MilestoneIndex(4));
}
