//! PostgreSQL ledger store
//!
//! `apply` takes `SELECT ... FOR UPDATE` on the pool row, so mutations of one
//! pool are serialized while other pools proceed in parallel. Statuses are
//! stored as lowercase TEXT and converted with `from_db` / `as_db`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    Contribution, Frequency, Member, MemberStatus, Payout, PayoutKind, PendingSettlement, Penalty,
    PenaltyReason, PenaltyStatus, Pool, PoolStatus, Proposal, ProposalStatus, SettlementKind,
    SettlementStatus, User, Vote, VoteChoice,
};
use sqlx::{PgConnection, PgPool};

use super::{Changeset, LedgerStore};
use crate::domain::PoolAggregate;
use crate::error::{ServiceError, ServiceResult};

/// Attempts for a pool mutation that hits a serialization failure or deadlock
const MAX_APPLY_ATTEMPTS: u32 = 3;

const POOL_COLUMNS: &str = "id, name, slug, description, creator_id, contribution_amount,
    contribution_token, contribution_token_symbol, frequency, total_members, current_members,
    start_date, end_date, total_contributed, next_payout_date, next_payout_member_id,
    current_cycle, status, yield_enabled, pool_address, premium_until, created_at, updated_at";

const MEMBER_COLUMNS: &str = "id, pool_id, user_id, position, has_received_payout,
    total_contributed, last_contribution_date, last_contribution_cycle, status, joined_at";

const CONTRIBUTION_COLUMNS: &str = "id, pool_id, user_id, amount, token, token_symbol,
    settlement_ref, status, is_late, penalty_amount, cycle, created_at";

const PAYOUT_COLUMNS: &str =
    "id, pool_id, recipient_id, amount, settlement_ref, status, kind, cycle, payout_date";

const PROPOSAL_COLUMNS: &str = "id, pool_id, proposer_id, title, description, kind, status,
    ends_at, execution_data, target_user_id, created_at, executed_at";

fn corrupt(column: &str, value: &str) -> ServiceError {
    ServiceError::Db(format!("unexpected {column} value in database: {value}").into())
}

// ========== Row types ==========

#[derive(sqlx::FromRow)]
struct PoolRow {
    id: i64,
    name: String,
    slug: String,
    description: Option<String>,
    creator_id: String,
    contribution_amount: Decimal,
    contribution_token: String,
    contribution_token_symbol: String,
    frequency: String,
    total_members: i32,
    current_members: i32,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    total_contributed: Decimal,
    next_payout_date: DateTime<Utc>,
    next_payout_member_id: Option<String>,
    current_cycle: i32,
    status: String,
    yield_enabled: bool,
    pool_address: Option<String>,
    premium_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PoolRow> for Pool {
    type Error = ServiceError;

    fn try_from(r: PoolRow) -> Result<Self, Self::Error> {
        Ok(Pool {
            frequency: Frequency::from_db(&r.frequency)
                .ok_or_else(|| corrupt("pools.frequency", &r.frequency))?,
            status: PoolStatus::from_db(&r.status)
                .ok_or_else(|| corrupt("pools.status", &r.status))?,
            id: r.id,
            name: r.name,
            slug: r.slug,
            description: r.description,
            creator_id: r.creator_id,
            contribution_amount: r.contribution_amount,
            contribution_token: r.contribution_token,
            contribution_token_symbol: r.contribution_token_symbol,
            total_members: r.total_members,
            current_members: r.current_members,
            start_date: r.start_date,
            end_date: r.end_date,
            total_contributed: r.total_contributed,
            next_payout_date: r.next_payout_date,
            next_payout_member_id: r.next_payout_member_id,
            current_cycle: r.current_cycle,
            yield_enabled: r.yield_enabled,
            pool_address: r.pool_address,
            premium_until: r.premium_until,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    id: i64,
    pool_id: i64,
    user_id: String,
    position: i32,
    has_received_payout: bool,
    total_contributed: Decimal,
    last_contribution_date: Option<DateTime<Utc>>,
    last_contribution_cycle: Option<i32>,
    status: String,
    joined_at: DateTime<Utc>,
}

impl TryFrom<MemberRow> for Member {
    type Error = ServiceError;

    fn try_from(r: MemberRow) -> Result<Self, Self::Error> {
        Ok(Member {
            status: MemberStatus::from_db(&r.status)
                .ok_or_else(|| corrupt("pool_members.status", &r.status))?,
            id: r.id,
            pool_id: r.pool_id,
            user_id: r.user_id,
            position: r.position,
            has_received_payout: r.has_received_payout,
            total_contributed: r.total_contributed,
            last_contribution_date: r.last_contribution_date,
            last_contribution_cycle: r.last_contribution_cycle,
            joined_at: r.joined_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ContributionRow {
    id: i64,
    pool_id: i64,
    user_id: String,
    amount: Decimal,
    token: String,
    token_symbol: String,
    settlement_ref: String,
    status: String,
    is_late: bool,
    penalty_amount: Option<Decimal>,
    cycle: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<ContributionRow> for Contribution {
    type Error = ServiceError;

    fn try_from(r: ContributionRow) -> Result<Self, Self::Error> {
        Ok(Contribution {
            status: SettlementStatus::from_db(&r.status)
                .ok_or_else(|| corrupt("contributions.status", &r.status))?,
            id: r.id,
            pool_id: r.pool_id,
            user_id: r.user_id,
            amount: r.amount,
            token: r.token,
            token_symbol: r.token_symbol,
            settlement_ref: r.settlement_ref,
            is_late: r.is_late,
            penalty_amount: r.penalty_amount,
            cycle: r.cycle,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PayoutRow {
    id: i64,
    pool_id: i64,
    recipient_id: String,
    amount: Decimal,
    settlement_ref: String,
    status: String,
    kind: String,
    cycle: i32,
    payout_date: DateTime<Utc>,
}

impl TryFrom<PayoutRow> for Payout {
    type Error = ServiceError;

    fn try_from(r: PayoutRow) -> Result<Self, Self::Error> {
        Ok(Payout {
            status: SettlementStatus::from_db(&r.status)
                .ok_or_else(|| corrupt("payouts.status", &r.status))?,
            kind: PayoutKind::from_db(&r.kind).ok_or_else(|| corrupt("payouts.kind", &r.kind))?,
            id: r.id,
            pool_id: r.pool_id,
            recipient_id: r.recipient_id,
            amount: r.amount,
            settlement_ref: r.settlement_ref,
            cycle: r.cycle,
            payout_date: r.payout_date,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PenaltyRow {
    id: i64,
    pool_id: i64,
    user_id: String,
    contribution_id: Option<i64>,
    amount: Decimal,
    reason: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<PenaltyRow> for Penalty {
    type Error = ServiceError;

    fn try_from(r: PenaltyRow) -> Result<Self, Self::Error> {
        Ok(Penalty {
            reason: PenaltyReason::from_db(&r.reason)
                .ok_or_else(|| corrupt("penalties.reason", &r.reason))?,
            status: PenaltyStatus::from_db(&r.status)
                .ok_or_else(|| corrupt("penalties.status", &r.status))?,
            id: r.id,
            pool_id: r.pool_id,
            user_id: r.user_id,
            contribution_id: r.contribution_id,
            amount: r.amount,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProposalRow {
    id: i64,
    pool_id: i64,
    proposer_id: String,
    title: String,
    description: String,
    kind: String,
    status: String,
    ends_at: DateTime<Utc>,
    execution_data: serde_json::Value,
    target_user_id: Option<String>,
    created_at: DateTime<Utc>,
    executed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ProposalRow> for Proposal {
    type Error = ServiceError;

    fn try_from(r: ProposalRow) -> Result<Self, Self::Error> {
        Ok(Proposal {
            status: ProposalStatus::from_db(&r.status)
                .ok_or_else(|| corrupt("proposals.status", &r.status))?,
            id: r.id,
            pool_id: r.pool_id,
            proposer_id: r.proposer_id,
            title: r.title,
            description: r.description,
            kind: r.kind,
            ends_at: r.ends_at,
            execution_data: r.execution_data,
            target_user_id: r.target_user_id,
            created_at: r.created_at,
            executed_at: r.executed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VoteRow {
    proposal_id: i64,
    user_id: String,
    vote: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<VoteRow> for Vote {
    type Error = ServiceError;

    fn try_from(r: VoteRow) -> Result<Self, Self::Error> {
        Ok(Vote {
            vote: VoteChoice::from_db(&r.vote).ok_or_else(|| corrupt("votes.vote", &r.vote))?,
            proposal_id: r.proposal_id,
            user_id: r.user_id,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    wallet_address: Option<String>,
    display_name: Option<String>,
    premium_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: r.id,
            wallet_address: r.wallet_address,
            display_name: r.display_name,
            premium_until: r.premium_until,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PendingRow {
    settlement_ref: String,
    kind: String,
    pool_id: i64,
    user_id: String,
    amount: Decimal,
    status: String,
    attempts: i32,
    created_at: DateTime<Utc>,
    last_checked_at: Option<DateTime<Utc>>,
}

impl TryFrom<PendingRow> for PendingSettlement {
    type Error = ServiceError;

    fn try_from(r: PendingRow) -> Result<Self, Self::Error> {
        Ok(PendingSettlement {
            kind: SettlementKind::from_db(&r.kind)
                .ok_or_else(|| corrupt("pending_settlements.kind", &r.kind))?,
            status: SettlementStatus::from_db(&r.status)
                .ok_or_else(|| corrupt("pending_settlements.status", &r.status))?,
            settlement_ref: r.settlement_ref,
            pool_id: r.pool_id,
            user_id: r.user_id,
            amount: r.amount,
            attempts: r.attempts,
            created_at: r.created_at,
            last_checked_at: r.last_checked_at,
        })
    }
}

fn convert<R, T>(rows: Vec<R>) -> ServiceResult<Vec<T>>
where
    T: TryFrom<R, Error = ServiceError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Name of the violated unique constraint, if `e` is a unique violation
fn unique_violation(e: &sqlx::Error) -> Option<String> {
    e.as_database_error()
        .filter(|d| d.is_unique_violation())
        .map(|d| d.constraint().unwrap_or_default().to_string())
}

fn is_retryable(e: &ServiceError) -> bool {
    let ServiceError::Db(err) = e else {
        return false;
    };
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .and_then(|d| d.code())
        .is_some_and(|code| code == "40001" || code == "40P01")
}

// ========== Queries ==========

async fn load_aggregate(
    conn: &mut PgConnection,
    pool_id: i64,
    for_update: bool,
) -> ServiceResult<Option<PoolAggregate>> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let row: Option<PoolRow> =
        sqlx::query_as(&format!("SELECT {POOL_COLUMNS} FROM pools WHERE id = $1{lock}"))
            .bind(pool_id)
            .fetch_optional(&mut *conn)
            .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let members: Vec<MemberRow> = sqlx::query_as(&format!(
        "SELECT {MEMBER_COLUMNS} FROM pool_members WHERE pool_id = $1 ORDER BY position"
    ))
    .bind(pool_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(PoolAggregate::new(row.try_into()?, convert(members)?)))
}

async fn insert_member(conn: &mut PgConnection, m: &Member) -> ServiceResult<()> {
    sqlx::query(
        "INSERT INTO pool_members (id, pool_id, user_id, position, has_received_payout,
            total_contributed, last_contribution_date, last_contribution_cycle, status, joined_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(m.id)
    .bind(m.pool_id)
    .bind(&m.user_id)
    .bind(m.position)
    .bind(m.has_received_payout)
    .bind(m.total_contributed)
    .bind(m.last_contribution_date)
    .bind(m.last_contribution_cycle)
    .bind(m.status.as_db())
    .bind(m.joined_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| match unique_violation(&e).as_deref() {
        Some("pool_members_pool_id_user_id_key") => ErrorCode::MemberExists.into(),
        Some("pool_members_active_position_idx") => ErrorCode::PositionTaken.into(),
        _ => ServiceError::from(e),
    })?;
    Ok(())
}

async fn update_member(conn: &mut PgConnection, m: &Member) -> ServiceResult<()> {
    sqlx::query(
        "UPDATE pool_members SET position = $1, has_received_payout = $2, total_contributed = $3,
            last_contribution_date = $4, last_contribution_cycle = $5, status = $6
         WHERE id = $7",
    )
    .bind(m.position)
    .bind(m.has_received_payout)
    .bind(m.total_contributed)
    .bind(m.last_contribution_date)
    .bind(m.last_contribution_cycle)
    .bind(m.status.as_db())
    .bind(m.id)
    .execute(&mut *conn)
    .await
    .map_err(|e| match unique_violation(&e) {
        Some(_) => ErrorCode::PositionTaken.into(),
        None => ServiceError::from(e),
    })?;
    Ok(())
}

async fn insert_pool_row(conn: &mut PgConnection, p: &Pool) -> ServiceResult<()> {
    sqlx::query(
        "INSERT INTO pools (id, name, slug, description, creator_id, contribution_amount,
            contribution_token, contribution_token_symbol, frequency, total_members,
            current_members, start_date, end_date, total_contributed, next_payout_date,
            next_payout_member_id, current_cycle, status, yield_enabled, pool_address,
            premium_until, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
            $18, $19, $20, $21, $22, $23)",
    )
    .bind(p.id)
    .bind(&p.name)
    .bind(&p.slug)
    .bind(&p.description)
    .bind(&p.creator_id)
    .bind(p.contribution_amount)
    .bind(&p.contribution_token)
    .bind(&p.contribution_token_symbol)
    .bind(p.frequency.as_db())
    .bind(p.total_members)
    .bind(p.current_members)
    .bind(p.start_date)
    .bind(p.end_date)
    .bind(p.total_contributed)
    .bind(p.next_payout_date)
    .bind(&p.next_payout_member_id)
    .bind(p.current_cycle)
    .bind(p.status.as_db())
    .bind(p.yield_enabled)
    .bind(&p.pool_address)
    .bind(p.premium_until)
    .bind(p.created_at)
    .bind(p.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn update_pool_row(conn: &mut PgConnection, p: &Pool) -> ServiceResult<()> {
    sqlx::query(
        "UPDATE pools SET name = $1, slug = $2, description = $3, contribution_amount = $4,
            frequency = $5, total_members = $6, current_members = $7, start_date = $8,
            end_date = $9, total_contributed = $10, next_payout_date = $11,
            next_payout_member_id = $12, current_cycle = $13, status = $14,
            yield_enabled = $15, premium_until = $16, updated_at = $17
         WHERE id = $18",
    )
    .bind(&p.name)
    .bind(&p.slug)
    .bind(&p.description)
    .bind(p.contribution_amount)
    .bind(p.frequency.as_db())
    .bind(p.total_members)
    .bind(p.current_members)
    .bind(p.start_date)
    .bind(p.end_date)
    .bind(p.total_contributed)
    .bind(p.next_payout_date)
    .bind(&p.next_payout_member_id)
    .bind(p.current_cycle)
    .bind(p.status.as_db())
    .bind(p.yield_enabled)
    .bind(p.premium_until)
    .bind(p.updated_at)
    .bind(p.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn settlement_exists(conn: &mut PgConnection, settlement_ref: &str) -> ServiceResult<bool> {
    let (exists,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM contributions WHERE settlement_ref = $1)
             OR EXISTS (SELECT 1 FROM payouts WHERE settlement_ref = $1)",
    )
    .bind(settlement_ref)
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists)
}

async fn insert_contribution(conn: &mut PgConnection, c: &Contribution) -> ServiceResult<()> {
    if settlement_exists(conn, &c.settlement_ref).await? {
        return Err(ErrorCode::DuplicateSettlement.into());
    }
    let result = sqlx::query(
        "INSERT INTO contributions (id, pool_id, user_id, amount, token, token_symbol,
            settlement_ref, status, is_late, penalty_amount, cycle, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         ON CONFLICT DO NOTHING",
    )
    .bind(c.id)
    .bind(c.pool_id)
    .bind(&c.user_id)
    .bind(c.amount)
    .bind(&c.token)
    .bind(&c.token_symbol)
    .bind(&c.settlement_ref)
    .bind(c.status.as_db())
    .bind(c.is_late)
    .bind(c.penalty_amount)
    .bind(c.cycle)
    .bind(c.created_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        // Lost a race on the settlement ref, or the member already paid this cycle
        if settlement_exists(conn, &c.settlement_ref).await? {
            return Err(ErrorCode::DuplicateSettlement.into());
        }
        return Err(ErrorCode::ContributionAlreadyMade.into());
    }
    Ok(())
}

async fn insert_payout(conn: &mut PgConnection, p: &Payout) -> ServiceResult<()> {
    if settlement_exists(conn, &p.settlement_ref).await? {
        return Err(ErrorCode::DuplicateSettlement.into());
    }
    let result = sqlx::query(
        "INSERT INTO payouts (id, pool_id, recipient_id, amount, settlement_ref, status, kind,
            cycle, payout_date)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT DO NOTHING",
    )
    .bind(p.id)
    .bind(p.pool_id)
    .bind(&p.recipient_id)
    .bind(p.amount)
    .bind(&p.settlement_ref)
    .bind(p.status.as_db())
    .bind(p.kind.as_db())
    .bind(p.cycle)
    .bind(p.payout_date)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::with_message(
            ErrorCode::DuplicateSettlement,
            format!("Cycle {} has already been paid out", p.cycle),
        )
        .into());
    }
    Ok(())
}

/// Write the diff between `before` and `after` plus the changeset rows
async fn persist(
    conn: &mut PgConnection,
    before: &PoolAggregate,
    after: &PoolAggregate,
    changes: &Changeset,
) -> ServiceResult<()> {
    if after.pool != before.pool {
        update_pool_row(conn, &after.pool).await?;
    }

    let previous: HashMap<i64, &Member> = before.members.iter().map(|m| (m.id, m)).collect();

    // Park re-ordered members on negative positions first so a swap never
    // collides with the active-position unique index mid-update.
    let moved: Vec<&Member> = after
        .members
        .iter()
        .filter(|m| previous.get(&m.id).is_some_and(|old| old.position != m.position))
        .collect();
    for (i, m) in moved.iter().enumerate() {
        sqlx::query("UPDATE pool_members SET position = $1 WHERE id = $2")
            .bind(-(i as i32) - 1)
            .bind(m.id)
            .execute(&mut *conn)
            .await?;
    }

    for m in &after.members {
        match previous.get(&m.id) {
            None => insert_member(conn, m).await?,
            Some(old) if *old != m || moved.iter().any(|x| x.id == m.id) => {
                update_member(conn, m).await?
            }
            Some(_) => {}
        }
    }

    for c in &changes.contributions {
        insert_contribution(conn, c).await?;
    }
    for p in &changes.payouts {
        insert_payout(conn, p).await?;
    }

    if let Some(t) = &changes.proposal {
        let result = sqlx::query(
            "UPDATE proposals SET status = $1, executed_at = $2
             WHERE id = $3 AND status = 'active'",
        )
        .bind(t.to.as_db())
        .bind(t.at)
        .bind(t.proposal_id)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ErrorCode::ProposalAlreadyFinalized.into());
        }
    }

    if let Some(settlement_ref) = &changes.resolved_settlement {
        sqlx::query(
            "UPDATE pending_settlements SET status = 'confirmed', last_checked_at = now()
             WHERE settlement_ref = $1",
        )
        .bind(settlement_ref)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and run pending migrations
    pub async fn connect(database_url: &str) -> ServiceResult<Self> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| ServiceError::Db(e.into()))?;
        Ok(Self { pool })
    }

    async fn try_apply<T, F>(&self, pool_id: i64, f: &F) -> ServiceResult<T>
    where
        F: Fn(&mut PoolAggregate, &mut Changeset) -> ServiceResult<T>,
    {
        let mut tx = self.pool.begin().await?;
        let before = load_aggregate(&mut tx, pool_id, true)
            .await?
            .ok_or_else(|| ServiceError::from(ErrorCode::PoolNotFound))?;

        let mut after = before.clone();
        let mut changes = Changeset::default();
        let out = f(&mut after, &mut changes)?;

        persist(&mut tx, &before, &after, &changes).await?;
        tx.commit().await?;
        Ok(out)
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn insert_pool(&self, agg: &PoolAggregate) -> ServiceResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_pool_row(&mut tx, &agg.pool).await?;
        for m in &agg.members {
            insert_member(&mut tx, m).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn apply<T, F>(&self, pool_id: i64, f: F) -> ServiceResult<T>
    where
        T: Send,
        F: Fn(&mut PoolAggregate, &mut Changeset) -> ServiceResult<T> + Send + Sync,
    {
        let mut attempt = 1;
        loop {
            match self.try_apply(pool_id, &f).await {
                Err(e) if attempt < MAX_APPLY_ATTEMPTS && is_retryable(&e) => {
                    tracing::warn!(pool_id, attempt, error = %e, "Retrying pool mutation");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn load_pool(&self, pool_id: i64) -> ServiceResult<Option<PoolAggregate>> {
        let mut conn = self.pool.acquire().await?;
        load_aggregate(&mut conn, pool_id, false).await
    }

    async fn list_pools(&self) -> ServiceResult<Vec<Pool>> {
        let rows: Vec<PoolRow> = sqlx::query_as(&format!(
            "SELECT {POOL_COLUMNS} FROM pools ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn list_pools_for_user(&self, user_id: &str) -> ServiceResult<Vec<Pool>> {
        let rows: Vec<PoolRow> = sqlx::query_as(&format!(
            "SELECT {POOL_COLUMNS} FROM pools
             WHERE id IN (SELECT pool_id FROM pool_members WHERE user_id = $1 AND status = 'active')
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn set_pool_premium(&self, pool_id: i64, until: DateTime<Utc>) -> ServiceResult<bool> {
        let result = sqlx::query("UPDATE pools SET premium_until = $1 WHERE id = $2")
            .bind(until)
            .bind(pool_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn contributions(
        &self,
        pool_id: i64,
        user_id: Option<&str>,
    ) -> ServiceResult<Vec<Contribution>> {
        let rows: Vec<ContributionRow> = sqlx::query_as(&format!(
            "SELECT {CONTRIBUTION_COLUMNS} FROM contributions
             WHERE pool_id = $1 AND ($2::TEXT IS NULL OR user_id = $2)
             ORDER BY created_at"
        ))
        .bind(pool_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn payouts(&self, pool_id: i64) -> ServiceResult<Vec<Payout>> {
        let rows: Vec<PayoutRow> = sqlx::query_as(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM payouts WHERE pool_id = $1 ORDER BY payout_date"
        ))
        .bind(pool_id)
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn settlement_recorded(&self, settlement_ref: &str) -> ServiceResult<bool> {
        let mut conn = self.pool.acquire().await?;
        settlement_exists(&mut conn, settlement_ref).await
    }

    async fn insert_penalty(&self, p: &Penalty) -> ServiceResult<()> {
        sqlx::query(
            "INSERT INTO penalties (id, pool_id, user_id, contribution_id, amount, reason, status,
                created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(p.id)
        .bind(p.pool_id)
        .bind(&p.user_id)
        .bind(p.contribution_id)
        .bind(p.amount)
        .bind(p.reason.as_db())
        .bind(p.status.as_db())
        .bind(p.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn penalties(&self, pool_id: i64, user_id: Option<&str>) -> ServiceResult<Vec<Penalty>> {
        let rows: Vec<PenaltyRow> = sqlx::query_as(
            "SELECT id, pool_id, user_id, contribution_id, amount, reason, status, created_at
             FROM penalties
             WHERE pool_id = $1 AND ($2::TEXT IS NULL OR user_id = $2)
             ORDER BY created_at",
        )
        .bind(pool_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn get_user(&self, user_id: &str) -> ServiceResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, wallet_address, display_name, premium_until, created_at
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn ensure_user(&self, user_id: &str, wallet_address: Option<&str>) -> ServiceResult<User> {
        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (id, wallet_address, created_at) VALUES ($1, $2, now())
             ON CONFLICT (id) DO UPDATE
                SET wallet_address = COALESCE(EXCLUDED.wallet_address, users.wallet_address)
             RETURNING id, wallet_address, display_name, premium_until, created_at",
        )
        .bind(user_id)
        .bind(wallet_address)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn set_user_premium(&self, user_id: &str, until: DateTime<Utc>) -> ServiceResult<bool> {
        let result = sqlx::query("UPDATE users SET premium_until = $1 WHERE id = $2")
            .bind(until)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_proposal(&self, p: &Proposal) -> ServiceResult<()> {
        sqlx::query(
            "INSERT INTO proposals (id, pool_id, proposer_id, title, description, kind, status,
                ends_at, execution_data, target_user_id, created_at, executed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(p.id)
        .bind(p.pool_id)
        .bind(&p.proposer_id)
        .bind(&p.title)
        .bind(&p.description)
        .bind(&p.kind)
        .bind(p.status.as_db())
        .bind(p.ends_at)
        .bind(&p.execution_data)
        .bind(&p.target_user_id)
        .bind(p.created_at)
        .bind(p.executed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_proposal(&self, proposal_id: i64) -> ServiceResult<Option<Proposal>> {
        let row: Option<ProposalRow> = sqlx::query_as(&format!(
            "SELECT {PROPOSAL_COLUMNS} FROM proposals WHERE id = $1"
        ))
        .bind(proposal_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Proposal::try_from).transpose()
    }

    async fn list_proposals(&self, pool_id: i64) -> ServiceResult<Vec<Proposal>> {
        let rows: Vec<ProposalRow> = sqlx::query_as(&format!(
            "SELECT {PROPOSAL_COLUMNS} FROM proposals WHERE pool_id = $1 ORDER BY created_at DESC"
        ))
        .bind(pool_id)
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn upsert_vote(&self, v: &Vote) -> ServiceResult<()> {
        sqlx::query(
            "INSERT INTO votes (proposal_id, user_id, vote, created_at) VALUES ($1, $2, $3, $4)
             ON CONFLICT (proposal_id, user_id) DO UPDATE
                SET vote = EXCLUDED.vote, created_at = EXCLUDED.created_at",
        )
        .bind(v.proposal_id)
        .bind(&v.user_id)
        .bind(v.vote.as_db())
        .bind(v.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn votes(&self, proposal_id: i64) -> ServiceResult<Vec<Vote>> {
        let rows: Vec<VoteRow> = sqlx::query_as(
            "SELECT proposal_id, user_id, vote, created_at FROM votes WHERE proposal_id = $1",
        )
        .bind(proposal_id)
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn record_pending_settlement(&self, p: &PendingSettlement) -> ServiceResult<()> {
        sqlx::query(
            "INSERT INTO pending_settlements (settlement_ref, kind, pool_id, user_id, amount,
                status, attempts, created_at, last_checked_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (settlement_ref) DO NOTHING",
        )
        .bind(&p.settlement_ref)
        .bind(p.kind.as_db())
        .bind(p.pool_id)
        .bind(&p.user_id)
        .bind(p.amount)
        .bind(p.status.as_db())
        .bind(p.attempts)
        .bind(p.created_at)
        .bind(p.last_checked_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending_settlements(&self, limit: i64) -> ServiceResult<Vec<PendingSettlement>> {
        let rows: Vec<PendingRow> = sqlx::query_as(
            "SELECT settlement_ref, kind, pool_id, user_id, amount, status, attempts, created_at,
                last_checked_at
             FROM pending_settlements
             WHERE status = 'pending'
             ORDER BY created_at
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn update_pending_settlement(
        &self,
        settlement_ref: &str,
        status: SettlementStatus,
        checked_at: DateTime<Utc>,
    ) -> ServiceResult<()> {
        sqlx::query(
            "UPDATE pending_settlements
             SET status = $1, attempts = attempts + 1, last_checked_at = $2
             WHERE settlement_ref = $3",
        )
        .bind(status.as_db())
        .bind(checked_at)
        .bind(settlement_ref)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
