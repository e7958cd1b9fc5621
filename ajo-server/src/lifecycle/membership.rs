//! Joining a pool

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};
use shared::models::{Member, MemberStatus, PoolStatus};
use shared::util::snowflake_id;

use super::PoolManager;
use crate::domain::PoolAggregate;
use crate::error::ServiceResult;
use crate::store::LedgerStore;

/// Seat `user_id` in the pool, activating it when the last seat fills
pub fn admit_member(
    agg: &mut PoolAggregate,
    user_id: &str,
    desired_position: Option<i32>,
    member_id: i64,
    now: DateTime<Utc>,
) -> Result<Member, AppError> {
    let pool = &agg.pool;
    if pool.status.is_terminal() {
        return Err(AppError::new(ErrorCode::PoolClosed));
    }
    if let Some(existing) = agg.member(user_id) {
        return Err(match existing.status {
            MemberStatus::Removed => AppError::with_message(
                ErrorCode::MemberRemoved,
                "Removed members cannot rejoin this pool",
            ),
            MemberStatus::Active => AppError::new(ErrorCode::MemberExists),
        });
    }
    if pool.current_members >= pool.total_members {
        return Err(AppError::new(ErrorCode::PoolFull));
    }

    let position = match desired_position {
        Some(p) if !(1..=pool.total_members).contains(&p) => {
            return Err(AppError::with_message(
                ErrorCode::ValueOutOfRange,
                format!("Position must be between 1 and {}", pool.total_members),
            ));
        }
        Some(p) if agg.position_taken(p) => {
            return Err(AppError::with_message(
                ErrorCode::PositionTaken,
                format!("Position {p} is already taken"),
            ));
        }
        Some(p) => p,
        None => agg.next_free_position(),
    };

    let member = Member {
        id: member_id,
        pool_id: pool.id,
        user_id: user_id.to_string(),
        position,
        has_received_payout: false,
        total_contributed: Decimal::ZERO,
        last_contribution_date: None,
        last_contribution_cycle: None,
        status: MemberStatus::Active,
        joined_at: now,
    };
    agg.members.push(member.clone());

    let pool = &mut agg.pool;
    pool.current_members += 1;
    if pool.current_members == pool.total_members && pool.status == PoolStatus::Pending {
        pool.status = PoolStatus::Active;
        tracing::info!(pool_id = pool.id, members = pool.current_members, "Pool is full and now active");
    }
    pool.updated_at = now;
    Ok(member)
}

impl PoolManager {
    pub async fn join_pool(
        &self,
        pool_id: i64,
        user_id: &str,
        wallet_address: Option<&str>,
        desired_position: Option<i32>,
    ) -> ServiceResult<Member> {
        self.store.ensure_user(user_id, wallet_address).await?;
        let now = self.clock.now();
        let member_id = snowflake_id();
        let member = self
            .store
            .apply(pool_id, |agg, _| {
                Ok(admit_member(agg, user_id, desired_position, member_id, now)?)
            })
            .await?;
        tracing::info!(pool_id, user_id, position = member.position, "Member joined pool");
        Ok(member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::sample_aggregate;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn last_join_activates_pool() {
        let mut agg = sample_aggregate(3);
        let member = admit_member(&mut agg, "user-4", None, 7, now()).unwrap();
        assert_eq!(member.position, 4);
        assert_eq!(agg.pool.current_members, 4);
        assert_eq!(agg.pool.status, PoolStatus::Active);

        let err = admit_member(&mut agg, "user-5", None, 8, now()).unwrap_err();
        assert_eq!(err.code, ErrorCode::PoolFull);
    }

    #[test]
    fn partial_pool_stays_pending() {
        let mut agg = sample_aggregate(1);
        admit_member(&mut agg, "user-2", None, 2, now()).unwrap();
        assert_eq!(agg.pool.status, PoolStatus::Pending);
        assert_eq!(agg.pool.current_members, 2);
    }

    #[test]
    fn desired_position() {
        let mut agg = sample_aggregate(1);
        let m = admit_member(&mut agg, "user-9", Some(4), 9, now()).unwrap();
        assert_eq!(m.position, 4);

        let err = admit_member(&mut agg, "user-8", Some(4), 8, now()).unwrap_err();
        assert_eq!(err.code, ErrorCode::PositionTaken);

        let err = admit_member(&mut agg, "user-8", Some(5), 8, now()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValueOutOfRange);

        // default slot falls back to a free one
        let m = admit_member(&mut agg, "user-7", None, 7, now()).unwrap();
        assert_eq!(m.position, 3);
    }

    #[test]
    fn duplicate_and_removed_members_rejected() {
        let mut agg = sample_aggregate(2);
        let err = admit_member(&mut agg, "user-2", None, 5, now()).unwrap_err();
        assert_eq!(err.code, ErrorCode::MemberExists);

        agg.member_mut("user-2").unwrap().status = MemberStatus::Removed;
        agg.pool.current_members -= 1;
        let err = admit_member(&mut agg, "user-2", None, 5, now()).unwrap_err();
        assert_eq!(err.code, ErrorCode::MemberRemoved);
    }

    #[test]
    fn closed_pool_rejects_joins() {
        let mut agg = sample_aggregate(1);
        agg.pool.status = PoolStatus::Cancelled;
        let err = admit_member(&mut agg, "user-2", None, 5, now()).unwrap_err();
        assert_eq!(err.code, ErrorCode::PoolClosed);
    }
}
