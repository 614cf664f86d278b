//! White-flag computation through the gateway, and its agreement with
//! milestone confirmation.

use tangle_engine::whiteflag::merkle_root;
use tangle_inx::{InxClient, StatusCode, WhiteFlagRequest};
use tangle_integration_tests::{GENESIS_AMOUNT, TestLedger, genesis_output_id, output};
use tangle_store::TangleStore;
use tangle_types::{ConflictReason, MessageId, MilestoneId, MilestoneIndex, OutputId};

fn request(index: u32, parents: Vec<MessageId>) -> WhiteFlagRequest {
    WhiteFlagRequest {
        milestone_index: MilestoneIndex(index),
        milestone_timestamp: 1_700_000_000 + index,
        parents,
        previous_milestone_id: MilestoneId::from([7u8; 32]),
    }
}

#[tokio::test]
async fn test_conflicting_spends_first_in_order_wins() {
    let ledger = TestLedger::new(1);
    let addr = ledger.serve().await;

    let tx_a = ledger.attach_tx(
        vec![MessageId::EMPTY],
        vec![genesis_output_id()],
        vec![output(1, GENESIS_AMOUNT)],
    );
    let tx_b = ledger.attach_tx(
        vec![MessageId::EMPTY],
        vec![genesis_output_id()],
        vec![output(2, GENESIS_AMOUNT)],
    );
    let tip = ledger.attach_data(vec![tx_a, tx_b], "tip");

    let mut client = InxClient::connect(addr).await.unwrap();
    let roots = client
        .compute_white_flag(request(2, vec![tip]))
        .await
        .unwrap();
    assert_eq!(roots.confirmed_merkle_root, merkle_root(&[tx_a, tx_b, tip]));
    assert_eq!(roots.applied_merkle_root, merkle_root(&[tx_a]));

    // Parent order decides which spend comes first.
    let swapped = client
        .compute_white_flag(request(2, vec![tx_b, tx_a]))
        .await
        .unwrap();
    assert_eq!(swapped.confirmed_merkle_root, merkle_root(&[tx_b, tx_a]));
    assert_eq!(swapped.applied_merkle_root, merkle_root(&[tx_b]));
}

#[tokio::test]
async fn test_confirmation_applies_the_computed_mutations() {
    let ledger = TestLedger::new(1);

    let tx_a = ledger.attach_tx(
        vec![MessageId::EMPTY],
        vec![genesis_output_id()],
        vec![output(1, 600), output(2, 400)],
    );
    let tx_b = ledger.attach_tx(
        vec![MessageId::EMPTY],
        vec![genesis_output_id()],
        vec![output(3, GENESIS_AMOUNT)],
    );

    let index = ledger.issue_milestone(vec![tx_a, tx_b]).await;
    let mutations = ledger.confirm(index).await;
    assert_eq!(mutations.included, vec![tx_a]);
    assert_eq!(
        mutations.conflict_of(&tx_b),
        ConflictReason::InputAlreadySpentInThisMilestone
    );

    let store = ledger.tangle().storage().store();
    assert_eq!(store.ledger_index().unwrap(), index);
    assert!(store.get_unspent_output(&genesis_output_id()).unwrap().is_none());
    assert_eq!(
        store
            .get_unspent_output(&OutputId::new(tx_a, 1))
            .unwrap()
            .map(|o| o.amount),
        Some(400)
    );
    assert!(store.get_unspent_output(&OutputId::new(tx_b, 0)).unwrap().is_none());

    let meta = store.get_metadata(&tx_b).unwrap().unwrap();
    assert_eq!(meta.referenced_by, Some(index));
    assert_eq!(meta.conflict, ConflictReason::InputAlreadySpentInThisMilestone);

    // The winner's outputs are spendable by the next milestone.
    let spend = ledger.attach_tx(
        vec![MessageId::EMPTY],
        vec![OutputId::new(tx_a, 0)],
        vec![output(4, 600)],
    );
    let next = ledger.issue_milestone(vec![spend]).await;
    let mutations = ledger.confirm(next).await;
    assert_eq!(mutations.included, vec![spend]);
}

#[tokio::test]
async fn test_compute_white_flag_is_deterministic() {
    let ledger = TestLedger::new(1);
    let server = ledger.server();

    let tx = ledger.attach_tx(
        vec![MessageId::EMPTY],
        vec![genesis_output_id()],
        vec![output(1, GENESIS_AMOUNT)],
    );
    let data = ledger.attach_data(vec![tx], "data");

    let first = server.compute_white_flag(request(2, vec![data])).await.unwrap();
    let second = server.compute_white_flag(request(2, vec![data])).await.unwrap();
    assert_eq!(first, second);

    // Computing does not touch the ledger.
    let store = ledger.tangle().storage().store();
    assert!(store.get_unspent_output(&genesis_output_id()).unwrap().is_some());
    assert_eq!(store.ledger_index().unwrap(), MilestoneIndex(1));
}

#[tokio::test]
async fn test_compute_white_flag_failures_over_tcp() {
    let ledger = TestLedger::new(1);
    let addr = ledger.serve().await;
    let mut client = InxClient::connect(addr).await.unwrap();

    let err = client.compute_white_flag(request(2, vec![])).await.unwrap_err();
    assert_eq!(err.code(), StatusCode::InvalidArgument);

    let unknown = ledger.attach_data(vec![MessageId::from_data(b"missing")], "orphan");
    let err = client
        .compute_white_flag(request(2, vec![unknown]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::Unavailable);
    assert!(err.is_retryable());

    let unsynced = TestLedger::new(0);
    let addr = unsynced.serve().await;
    let mut client = InxClient::connect(addr).await.unwrap();
    let err = client
        .compute_white_flag(request(1, vec![MessageId::EMPTY]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), StatusCode::Unavailable);
}
