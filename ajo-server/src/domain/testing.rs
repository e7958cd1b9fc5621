//! Fixtures for unit tests

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use shared::models::{Frequency, Member, MemberStatus, Pool, PoolStatus, User};

use super::PoolAggregate;

pub fn sample_pool() -> Pool {
    let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    Pool {
        id: 42,
        name: "Sample Pool".into(),
        slug: "sample-pool".into(),
        description: None,
        creator_id: "user-1".into(),
        contribution_amount: Decimal::from(10),
        contribution_token: "SOL".into(),
        contribution_token_symbol: "SOL".into(),
        frequency: Frequency::Weekly,
        total_members: 4,
        current_members: 1,
        start_date: start,
        end_date: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        total_contributed: Decimal::ZERO,
        next_payout_date: Utc.with_ymd_and_hms(2025, 1, 8, 0, 0, 0).unwrap(),
        next_payout_member_id: Some("user-1".into()),
        current_cycle: 1,
        status: PoolStatus::Pending,
        yield_enabled: false,
        pool_address: Some("escrow".into()),
        premium_until: None,
        created_at: start,
        updated_at: start,
    }
}

pub fn sample_member(pool_id: i64, user_id: &str, position: i32) -> Member {
    Member {
        id: i64::from(position),
        pool_id,
        user_id: user_id.into(),
        position,
        has_received_payout: false,
        total_contributed: Decimal::ZERO,
        last_contribution_date: None,
        last_contribution_cycle: None,
        status: MemberStatus::Active,
        joined_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    }
}

/// Pool with `members` joined as `user-1..=user-N` at positions `1..=N`
pub fn sample_aggregate(members: i32) -> PoolAggregate {
    let mut pool = sample_pool();
    pool.current_members = members;
    pool.total_members = pool.total_members.max(members);
    let members = (1..=members)
        .map(|p| sample_member(pool.id, &format!("user-{p}"), p))
        .collect();
    PoolAggregate::new(pool, members)
}

pub fn sample_user(id: &str) -> User {
    User {
        id: id.into(),
        wallet_address: Some(format!("{id}-wallet")),
        display_name: None,
        premium_until: None,
        created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    }
}
