//! Pool creation, editing, cancellation and read views

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    FeeBreakdown, Member, MemberPosition, MemberStatus, Pool, PoolCreate, PoolDetail, PoolStatus,
    PoolUpdate,
};
use shared::util::snowflake_id;

use super::PoolManager;
use crate::domain::{PoolAggregate, access, fees, premium, schedule, slug};
use crate::error::ServiceResult;
use crate::store::LedgerStore;
use crate::settlement;
use crate::validation::{
    MAX_DESCRIPTION_LEN, MAX_NAME_LEN, MAX_SHORT_TEXT_LEN, validate_amount,
    validate_optional_text, validate_required_text,
};

fn ordered_dates(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), AppError> {
    if start >= end {
        return Err(AppError::validation("Start date must be before end date"));
    }
    Ok(())
}

/// Validate creation terms and build the pending pool with its creator at position 1
pub fn build_pool(
    req: PoolCreate,
    creator_id: &str,
    creator_is_premium: bool,
    default_escrow: Option<&str>,
    now: DateTime<Utc>,
) -> Result<PoolAggregate, AppError> {
    validate_required_text(&req.name, "name", MAX_NAME_LEN)?;
    validate_optional_text(&req.description, "description", MAX_DESCRIPTION_LEN)?;
    validate_required_text(&req.contribution_token, "contributionToken", MAX_SHORT_TEXT_LEN)?;
    validate_optional_text(
        &req.contribution_token_symbol,
        "contributionTokenSymbol",
        MAX_SHORT_TEXT_LEN,
    )?;
    validate_optional_text(&req.pool_address, "poolAddress", MAX_SHORT_TEXT_LEN)?;
    let contribution_token = settlement::native_token(&req.contribution_token).ok_or_else(|| {
        AppError::validation(format!(
            "Unsupported contribution token {}: only native SOL can be settled",
            req.contribution_token.trim()
        ))
    })?;
    validate_amount(req.contribution_amount, "Contribution amount")?;
    let frequency = schedule::parse_frequency(&req.frequency)?;
    ordered_dates(req.start_date, req.end_date)?;
    if req.start_date.date_naive() < now.date_naive() {
        return Err(AppError::validation("Start date cannot be in the past"));
    }
    premium::check_capacity(req.total_members, creator_is_premium)?;

    let pool_id = snowflake_id();
    let name = req.name.trim().to_string();
    let pool = Pool {
        id: pool_id,
        slug: slug::generate_slug(&name),
        name,
        description: req.description,
        creator_id: creator_id.to_string(),
        contribution_amount: req.contribution_amount,
        contribution_token_symbol: req
            .contribution_token_symbol
            .unwrap_or_else(|| contribution_token.to_string()),
        contribution_token: contribution_token.to_string(),
        frequency,
        total_members: req.total_members,
        current_members: 1,
        start_date: req.start_date,
        end_date: req.end_date,
        total_contributed: Decimal::ZERO,
        next_payout_date: schedule::next_payout_date(req.start_date, frequency, 1),
        next_payout_member_id: Some(creator_id.to_string()),
        current_cycle: 1,
        status: PoolStatus::Pending,
        yield_enabled: req.yield_enabled,
        pool_address: req.pool_address.or_else(|| default_escrow.map(String::from)),
        premium_until: None,
        created_at: now,
        updated_at: now,
    };
    let creator = Member {
        id: snowflake_id(),
        pool_id,
        user_id: creator_id.to_string(),
        position: 1,
        has_received_payout: false,
        total_contributed: Decimal::ZERO,
        last_contribution_date: None,
        last_contribution_cycle: None,
        status: MemberStatus::Active,
        joined_at: now,
    };
    Ok(PoolAggregate::new(pool, vec![creator]))
}

fn require_editable(agg: &PoolAggregate, user_id: &str) -> Result<(), AppError> {
    if !access::is_creator(Some(user_id), agg) {
        return Err(AppError::new(ErrorCode::NotPoolCreator));
    }
    if agg.pool.status.is_terminal() {
        return Err(AppError::new(ErrorCode::PoolClosed));
    }
    if !access::can_edit(Some(user_id), agg) {
        return Err(AppError::with_message(
            ErrorCode::PoolLocked,
            "Pool terms are locked once another member has joined",
        ));
    }
    Ok(())
}

/// Apply a creator's edit to a pool nobody else has joined yet
pub fn apply_update(
    agg: &mut PoolAggregate,
    user_id: &str,
    update: &PoolUpdate,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    require_editable(agg, user_id)?;
    let pool = &mut agg.pool;
    let mut reschedule = false;

    if let Some(name) = &update.name {
        validate_required_text(name, "name", MAX_NAME_LEN)?;
        pool.name = name.trim().to_string();
        pool.slug = slug::generate_slug(&pool.name);
    }
    if let Some(description) = &update.description {
        pool.description = Some(description.clone());
    }
    if let Some(amount) = update.contribution_amount {
        validate_amount(amount, "Contribution amount")?;
        pool.contribution_amount = amount;
    }
    if let Some(frequency) = &update.frequency {
        pool.frequency = schedule::parse_frequency(frequency)?;
        reschedule = true;
    }
    if let Some(total) = update.total_members {
        premium::check_capacity(total, pool.is_premium_at(now))?;
        if total < pool.current_members {
            return Err(AppError::with_message(
                ErrorCode::ValueOutOfRange,
                "Pool size cannot be below the current member count",
            ));
        }
        pool.total_members = total;
    }
    if let Some(start) = update.start_date {
        if start.date_naive() < now.date_naive() {
            return Err(AppError::validation("Start date cannot be in the past"));
        }
        pool.start_date = start;
        reschedule = true;
    }
    if let Some(end) = update.end_date {
        pool.end_date = end;
    }
    ordered_dates(pool.start_date, pool.end_date)?;
    if let Some(yield_enabled) = update.yield_enabled {
        pool.yield_enabled = yield_enabled;
    }

    if reschedule {
        pool.next_payout_date = schedule::next_payout_date(pool.start_date, pool.frequency, 1);
    }
    pool.updated_at = now;
    Ok(())
}

pub fn apply_cancel(
    agg: &mut PoolAggregate,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    require_editable(agg, user_id)?;
    if !agg.pool.status.can_transition_to(PoolStatus::Cancelled) {
        return Err(AppError::new(ErrorCode::PoolClosed));
    }
    agg.pool.status = PoolStatus::Cancelled;
    agg.pool.next_payout_member_id = None;
    agg.pool.updated_at = now;
    Ok(())
}

impl PoolManager {
    pub async fn create_pool(
        &self,
        creator_id: &str,
        wallet_address: Option<&str>,
        req: PoolCreate,
    ) -> ServiceResult<Pool> {
        let now = self.clock.now();
        let creator = self.store.ensure_user(creator_id, wallet_address).await?;
        let agg = build_pool(
            req,
            creator_id,
            premium::is_premium_user(Some(&creator), now),
            self.policy.default_escrow.as_deref(),
            now,
        )?;

        self.store.insert_pool(&agg).await?;
        tracing::info!(
            pool_id = agg.pool.id,
            creator_id,
            total_members = agg.pool.total_members,
            frequency = agg.pool.frequency.as_db(),
            "Pool created"
        );
        Ok(agg.pool)
    }

    pub async fn update_pool(
        &self,
        pool_id: i64,
        user_id: &str,
        update: PoolUpdate,
    ) -> ServiceResult<Pool> {
        validate_optional_text(&update.description, "description", MAX_DESCRIPTION_LEN)?;
        let now = self.clock.now();
        let pool = self
            .store
            .apply(pool_id, |agg, _| {
                apply_update(agg, user_id, &update, now)?;
                Ok(agg.pool.clone())
            })
            .await?;
        tracing::info!(pool_id, user_id, "Pool terms updated");
        Ok(pool)
    }

    pub async fn cancel_pool(&self, pool_id: i64, user_id: &str) -> ServiceResult<Pool> {
        let now = self.clock.now();
        let pool = self
            .store
            .apply(pool_id, |agg, _| {
                apply_cancel(agg, user_id, now)?;
                Ok(agg.pool.clone())
            })
            .await?;
        tracing::info!(pool_id, user_id, "Pool cancelled");
        Ok(pool)
    }

    /// Pool with membership, plus the caller's own contributions and penalties
    pub async fn pool_detail(&self, pool_id: i64, caller: Option<&str>) -> ServiceResult<PoolDetail> {
        let agg = self.load(pool_id).await?;
        let (contributions, penalties) = match caller {
            Some(user_id) if agg.member(user_id).is_some() => (
                self.store.contributions(pool_id, Some(user_id)).await?,
                self.store.penalties(pool_id, Some(user_id)).await?,
            ),
            _ => (Vec::new(), Vec::new()),
        };
        let payouts = self.store.payouts(pool_id).await?;

        Ok(PoolDetail {
            is_member: access::is_member(caller, &agg),
            is_creator: access::is_creator(caller, &agg),
            can_edit: access::can_edit(caller, &agg),
            pool: agg.pool,
            members: agg.members,
            contributions,
            penalties,
            payouts,
        })
    }

    pub async fn user_pools(&self, user_id: &str) -> ServiceResult<Vec<Pool>> {
        self.store.list_pools_for_user(user_id).await
    }

    pub async fn user_position(&self, pool_id: i64, user_id: &str) -> ServiceResult<MemberPosition> {
        let agg = self.load(pool_id).await?;
        let member = agg
            .active_member(user_id)
            .ok_or_else(|| AppError::new(ErrorCode::NotPoolMember))?;
        Ok(MemberPosition {
            position: member.position,
            has_received_payout: member.has_received_payout,
            projected_payout_date: schedule::next_payout_date(
                agg.pool.start_date,
                agg.pool.frequency,
                member.position,
            ),
            is_next_recipient: agg.pool.next_payout_member_id.as_deref() == Some(user_id),
        })
    }

    /// Fees the caller would pay contributing `amount` (default: the pool's amount) now
    pub async fn fee_preview(
        &self,
        pool_id: i64,
        user_id: &str,
        amount: Option<Decimal>,
    ) -> ServiceResult<FeeBreakdown> {
        let agg = self.load(pool_id).await?;
        let amount = amount.unwrap_or(agg.pool.contribution_amount);
        validate_amount(amount, "Amount")?;
        let now = self.clock.now();
        let user = self.store.get_user(user_id).await?;
        Ok(fees::fee_breakdown(
            amount,
            &agg.pool,
            premium::is_premium_user(user.as_ref(), now),
            now,
            self.policy.grace_period_days,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::{sample_aggregate, sample_pool};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()
    }

    fn terms() -> PoolCreate {
        PoolCreate {
            name: "  Market Women Ajo ".into(),
            description: Some("weekly".into()),
            contribution_amount: Decimal::from(50),
            contribution_token: "SOL".into(),
            contribution_token_symbol: None,
            frequency: "weekly".into(),
            total_members: 3,
            start_date: now() + Duration::days(1),
            end_date: now() + Duration::days(60),
            yield_enabled: false,
            pool_address: None,
        }
    }

    #[test]
    fn build_pool_sets_creator_as_first_recipient() {
        let agg = build_pool(terms(), "alice", false, Some("escrow"), now()).unwrap();
        let pool = &agg.pool;
        assert_eq!(pool.name, "Market Women Ajo");
        assert_eq!(pool.slug, "market-women-ajo");
        assert_eq!(pool.status, PoolStatus::Pending);
        assert_eq!(pool.current_members, 1);
        assert_eq!(pool.next_payout_member_id.as_deref(), Some("alice"));
        assert_eq!(pool.next_payout_date, pool.start_date + Duration::days(7));
        assert_eq!(pool.contribution_token_symbol, "SOL");
        assert_eq!(pool.pool_address.as_deref(), Some("escrow"));
        assert_eq!(agg.members.len(), 1);
        assert_eq!(agg.members[0].position, 1);
        assert_eq!(agg.members[0].pool_id, pool.id);
    }

    #[test]
    fn build_pool_validation() {
        let mut bad = terms();
        bad.contribution_amount = Decimal::ZERO;
        assert_eq!(
            build_pool(bad, "a", false, None, now()).unwrap_err().code,
            ErrorCode::ValueOutOfRange
        );

        let mut bad = terms();
        bad.contribution_amount = Decimal::from_scientific("5e28").unwrap();
        assert_eq!(
            build_pool(bad, "a", false, None, now()).unwrap_err().code,
            ErrorCode::ValueOutOfRange
        );

        let mut bad = terms();
        bad.end_date = bad.start_date;
        assert_eq!(
            build_pool(bad, "a", false, None, now()).unwrap_err().code,
            ErrorCode::ValidationFailed
        );

        let mut bad = terms();
        bad.start_date = now() - Duration::days(1);
        assert!(build_pool(bad, "a", false, None, now()).is_err());

        let mut bad = terms();
        bad.frequency = "yearly".into();
        assert_eq!(
            build_pool(bad, "a", false, None, now()).unwrap_err().code,
            ErrorCode::InvalidFrequency
        );

        let mut big = terms();
        big.total_members = 50;
        assert_eq!(
            build_pool(big.clone(), "a", false, None, now()).unwrap_err().code,
            ErrorCode::PremiumRequired
        );
        assert!(build_pool(big, "a", true, None, now()).is_ok());
    }

    #[test]
    fn only_native_sol_is_accepted() {
        let mut usdc = terms();
        usdc.contribution_token = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".into();
        usdc.contribution_token_symbol = Some("USDC".into());
        assert_eq!(
            build_pool(usdc, "a", false, None, now()).unwrap_err().code,
            ErrorCode::ValidationFailed
        );

        let mut wrapped = terms();
        wrapped.contribution_token = settlement::solana::NATIVE_MINT.into();
        let agg = build_pool(wrapped, "a", false, None, now()).unwrap();
        assert_eq!(agg.pool.contribution_token, "SOL");
        assert_eq!(agg.pool.contribution_token_symbol, "SOL");
    }

    #[test]
    fn start_later_today_is_allowed() {
        let mut t = terms();
        t.start_date = now() - Duration::hours(2);
        assert!(build_pool(t, "a", false, None, now()).is_ok());
    }

    #[test]
    fn update_regenerates_slug_and_schedule() {
        let mut agg = sample_aggregate(1);
        let update = PoolUpdate {
            name: Some("Renamed Circle".into()),
            frequency: Some("daily".into()),
            ..Default::default()
        };
        let when = sample_pool().start_date - Duration::days(1);
        apply_update(&mut agg, "user-1", &update, when).unwrap();
        assert_eq!(agg.pool.slug, "renamed-circle");
        assert_eq!(
            agg.pool.next_payout_date,
            agg.pool.start_date + Duration::days(1)
        );
        assert_eq!(agg.pool.updated_at, when);
    }

    #[test]
    fn update_locked_after_second_member() {
        let mut agg = sample_aggregate(2);
        let update = PoolUpdate {
            name: Some("x".into()),
            ..Default::default()
        };
        let err = apply_update(&mut agg, "user-1", &update, now()).unwrap_err();
        assert_eq!(err.code, ErrorCode::PoolLocked);

        let mut agg = sample_aggregate(1);
        let err = apply_update(&mut agg, "user-2", &update, now()).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotPoolCreator);
    }

    #[test]
    fn update_rejects_inverted_dates() {
        let mut agg = sample_aggregate(1);
        let update = PoolUpdate {
            end_date: Some(agg.pool.start_date - Duration::days(1)),
            ..Default::default()
        };
        assert!(apply_update(&mut agg, "user-1", &update, now()).is_err());
    }

    #[test]
    fn cancel_is_terminal() {
        let mut agg = sample_aggregate(1);
        apply_cancel(&mut agg, "user-1", now()).unwrap();
        assert_eq!(agg.pool.status, PoolStatus::Cancelled);
        assert_eq!(
            apply_cancel(&mut agg, "user-1", now()).unwrap_err().code,
            ErrorCode::PoolClosed
        );
    }
}
