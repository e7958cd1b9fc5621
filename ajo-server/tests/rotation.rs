mod common;

use std::sync::Arc;

use ajo_server::store::LedgerStore;
use chrono::Duration;
use common::{ESCROW, Harness, d, t0, wallet};
use shared::error::ErrorCode;
use shared::models::{PoolStatus, SettlementKind, SettlementStatus};

#[tokio::test]
async fn three_member_pool_runs_to_completion() {
    let h = Harness::new();
    let members = ["alice", "bob", "carol"];
    let pool = h.create_pool("alice", 3).await;
    assert_eq!(pool.status, PoolStatus::Pending);
    assert_eq!(pool.next_payout_member_id.as_deref(), Some("alice"));

    let bob = h
        .state
        .pools
        .join_pool(pool.id, "bob", Some(&wallet("bob")), Some(2))
        .await
        .unwrap();
    assert_eq!(bob.position, 2);
    h.state
        .pools
        .join_pool(pool.id, "carol", Some(&wallet("carol")), Some(3))
        .await
        .unwrap();

    let detail = h.state.pools.pool_detail(pool.id, Some("carol")).await.unwrap();
    assert_eq!(detail.pool.status, PoolStatus::Active);
    assert_eq!(detail.pool.current_members, 3);
    assert_eq!(detail.pool.next_payout_date, t0() + Duration::days(7));
    assert!(detail.is_member);
    assert!(!detail.is_creator);

    for (cycle, recipient) in members.iter().enumerate() {
        let cycle = cycle + 1;
        for user in members {
            h.contribute(pool.id, user, &format!("c{cycle}-{user}"), d("10"))
                .await
                .unwrap();
        }

        let quote = h.state.pools.prepare_payout(pool.id, "alice").await.unwrap();
        assert_eq!(quote.recipient_id, *recipient);
        assert_eq!(quote.transfer.amount, d("30"));
        assert_eq!(quote.transfer.to, wallet(recipient));
        assert_eq!(quote.cycle, cycle as i32);

        let sig = format!("p{cycle}");
        h.rail.record_transfer(&sig, ESCROW, &wallet(recipient), d("30"));
        let receipt = h
            .state
            .pools
            .execute_payout(pool.id, "alice", &sig)
            .await
            .unwrap();
        assert_eq!(receipt.payout.recipient_id, *recipient);
        assert_eq!(receipt.payout_amount, d("30"));
        assert_eq!(receipt.payout.cycle, cycle as i32);
    }

    let agg = h.state.store.load_pool(pool.id).await.unwrap().unwrap();
    assert_eq!(agg.pool.status, PoolStatus::Completed);
    assert_eq!(agg.pool.next_payout_member_id, None);
    assert_eq!(agg.pool.total_contributed, d("90"));
    assert!(agg.members.iter().all(|m| m.has_received_payout));
    assert_eq!(h.state.store.payouts(pool.id).await.unwrap().len(), 3);
    assert_eq!(h.rail.balance_of(ESCROW), rust_decimal::Decimal::ZERO);

    let err = h
        .state
        .pools
        .prepare_payout(pool.id, "alice")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PoolNotActive);
}

#[tokio::test]
async fn payout_requires_creator_and_active_pool() {
    let h = Harness::new();
    let pool = h.create_pool("alice", 3).await;

    let err = h.state.pools.prepare_payout(pool.id, "alice").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::PoolNotActive);

    h.state
        .pools
        .join_pool(pool.id, "bob", Some(&wallet("bob")), None)
        .await
        .unwrap();
    h.state
        .pools
        .join_pool(pool.id, "carol", Some(&wallet("carol")), None)
        .await
        .unwrap();

    let err = h.state.pools.prepare_payout(pool.id, "bob").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotPoolCreator);

    // nothing has been paid in yet
    let err = h.state.pools.prepare_payout(pool.id, "alice").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InsufficientPoolBalance);
}

#[tokio::test]
async fn payout_to_wrong_wallet_is_not_recorded() {
    let h = Harness::new();
    let pool = h.full_pool(&["alice", "bob"]).await;
    h.rail.set_balance(ESCROW, d("100"));

    h.rail.record_transfer("stray", ESCROW, &wallet("bob"), d("20"));
    let err = h
        .state
        .pools
        .execute_payout(pool.id, "alice", "stray")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::SettlementVerificationFailed);

    h.rail.record_transfer("short", ESCROW, &wallet("alice"), d("5"));
    let err = h
        .state
        .pools
        .execute_payout(pool.id, "alice", "short")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::SettlementAmountMismatch);

    let agg = h.state.store.load_pool(pool.id).await.unwrap().unwrap();
    assert_eq!(agg.pool.current_cycle, 1);
    assert!(h.state.store.payouts(pool.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn server_signed_payout_submits_and_records() {
    let h = Harness::new();
    let pool = h.full_pool(&["alice", "bob"]).await;
    h.contribute(pool.id, "alice", "c-alice", d("10")).await.unwrap();
    h.contribute(pool.id, "bob", "c-bob", d("10")).await.unwrap();

    let receipt = h.state.pools.submit_payout(pool.id, "alice").await.unwrap();
    assert_eq!(receipt.payout.recipient_id, "alice");
    assert_eq!(receipt.pool.next_payout_member_id.as_deref(), Some("bob"));
    assert_eq!(receipt.pool.current_cycle, 2);
    assert_eq!(h.rail.balance_of(&wallet("alice")), d("1010"));

    let err = h
        .state
        .pools
        .execute_payout(pool.id, "alice", &receipt.transaction_signature)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DuplicateSettlement);
}

#[tokio::test]
async fn concurrent_payouts_advance_rotation_once() {
    let h = Harness::new();
    let pool = h.full_pool(&["alice", "bob", "carol"]).await;
    h.rail.set_balance(ESCROW, d("100"));
    h.rail.record_transfer("p-a", ESCROW, &wallet("alice"), d("30"));
    h.rail.record_transfer("p-b", ESCROW, &wallet("alice"), d("30"));

    let pools = Arc::clone(&h.state.pools);
    let other = Arc::clone(&h.state.pools);
    let (a, b) = tokio::join!(
        pools.execute_payout(pool.id, "alice", "p-a"),
        other.execute_payout(pool.id, "alice", "p-b"),
    );
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);

    let agg = h.state.store.load_pool(pool.id).await.unwrap().unwrap();
    assert_eq!(agg.pool.current_cycle, 2);
    assert_eq!(agg.pool.next_payout_member_id.as_deref(), Some("bob"));
    assert_eq!(h.state.store.payouts(pool.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn timed_out_payout_is_parked_for_reconciliation() {
    let h = Harness::new();
    let pool = h.full_pool(&["alice", "bob"]).await;
    h.rail.set_balance(ESCROW, d("100"));
    h.rail.record_pending("slow", ESCROW, &wallet("alice"), d("20"));

    let err = h
        .state
        .pools
        .execute_payout(pool.id, "alice", "slow")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConfirmationTimeout);

    let pending = h.state.store.pending_settlements(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, SettlementKind::Payout);
    assert_eq!(pending[0].status, SettlementStatus::Pending);
    assert_eq!(pending[0].settlement_ref, "slow");
}
