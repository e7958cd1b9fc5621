//! Datastore layer
//!
//! Every pool mutation goes through [`LedgerStore::apply`]: the pool row is
//! locked, the aggregate (pool + members) is loaded, pure domain logic runs
//! against it, and the resulting diff plus the rows collected in a
//! [`Changeset`] are persisted in one transaction. Nothing outside `apply`
//! writes to `pools` or `pool_members`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::models::{
    Contribution, Payout, PendingSettlement, Penalty, Pool, Proposal, ProposalStatus,
    SettlementStatus, User, Vote,
};

use crate::domain::PoolAggregate;
use crate::error::ServiceResult;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Compare-and-swap of a proposal out of `active`
#[derive(Debug, Clone)]
pub struct ProposalTransition {
    pub proposal_id: i64,
    pub to: ProposalStatus,
    pub at: DateTime<Utc>,
}

/// Rows inserted alongside a pool mutation
///
/// Changes to the pool row and to existing members are detected by diffing
/// the aggregate; only new dependent rows are listed here.
#[derive(Debug, Default)]
pub struct Changeset {
    pub contributions: Vec<Contribution>,
    pub payouts: Vec<Payout>,
    pub proposal: Option<ProposalTransition>,
    /// Pending settlement resolved by this mutation
    pub resolved_settlement: Option<String>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.contributions.is_empty()
            && self.payouts.is_empty()
            && self.proposal.is_none()
            && self.resolved_settlement.is_none()
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a new pool together with its founding member
    async fn insert_pool(&self, pool: &PoolAggregate) -> ServiceResult<()>;

    /// Run `f` against the locked aggregate and persist its effects atomically.
    /// An `Err` from `f` leaves the store untouched.
    async fn apply<T, F>(&self, pool_id: i64, f: F) -> ServiceResult<T>
    where
        T: Send,
        F: Fn(&mut PoolAggregate, &mut Changeset) -> ServiceResult<T> + Send + Sync;

    async fn load_pool(&self, pool_id: i64) -> ServiceResult<Option<PoolAggregate>>;
    async fn list_pools(&self) -> ServiceResult<Vec<Pool>>;
    /// Pools where `user_id` is an active member
    async fn list_pools_for_user(&self, user_id: &str) -> ServiceResult<Vec<Pool>>;
    async fn set_pool_premium(&self, pool_id: i64, until: DateTime<Utc>) -> ServiceResult<bool>;

    async fn contributions(
        &self,
        pool_id: i64,
        user_id: Option<&str>,
    ) -> ServiceResult<Vec<Contribution>>;
    async fn payouts(&self, pool_id: i64) -> ServiceResult<Vec<Payout>>;
    /// Whether a contribution or payout already carries `settlement_ref`
    async fn settlement_recorded(&self, settlement_ref: &str) -> ServiceResult<bool>;

    /// Standalone write; callers treat failures as non-fatal
    async fn insert_penalty(&self, penalty: &Penalty) -> ServiceResult<()>;
    async fn penalties(&self, pool_id: i64, user_id: Option<&str>) -> ServiceResult<Vec<Penalty>>;

    async fn get_user(&self, user_id: &str) -> ServiceResult<Option<User>>;
    /// Insert the user if missing, otherwise fill in a newly known wallet address
    async fn ensure_user(&self, user_id: &str, wallet_address: Option<&str>) -> ServiceResult<User>;
    async fn set_user_premium(&self, user_id: &str, until: DateTime<Utc>) -> ServiceResult<bool>;

    async fn insert_proposal(&self, proposal: &Proposal) -> ServiceResult<()>;
    async fn get_proposal(&self, proposal_id: i64) -> ServiceResult<Option<Proposal>>;
    async fn list_proposals(&self, pool_id: i64) -> ServiceResult<Vec<Proposal>>;
    async fn upsert_vote(&self, vote: &Vote) -> ServiceResult<()>;
    async fn votes(&self, proposal_id: i64) -> ServiceResult<Vec<Vote>>;

    /// Record a transfer whose confirmation timed out; replays are no-ops
    async fn record_pending_settlement(&self, pending: &PendingSettlement) -> ServiceResult<()>;
    async fn pending_settlements(&self, limit: i64) -> ServiceResult<Vec<PendingSettlement>>;
    async fn update_pending_settlement(
        &self,
        settlement_ref: &str,
        status: SettlementStatus,
        checked_at: DateTime<Utc>,
    ) -> ServiceResult<()>;
}

/// Concrete store selected at startup
pub enum Store {
    Postgres(PgStore),
    Memory(MemoryStore),
}

macro_rules! delegate {
    ($self:ident, $s:ident => $call:expr) => {
        match $self {
            Store::Postgres($s) => $call,
            Store::Memory($s) => $call,
        }
    };
}

#[async_trait]
impl LedgerStore for Store {
    async fn insert_pool(&self, pool: &PoolAggregate) -> ServiceResult<()> {
        delegate!(self, s => s.insert_pool(pool).await)
    }

    async fn apply<T, F>(&self, pool_id: i64, f: F) -> ServiceResult<T>
    where
        T: Send,
        F: Fn(&mut PoolAggregate, &mut Changeset) -> ServiceResult<T> + Send + Sync,
    {
        delegate!(self, s => s.apply(pool_id, f).await)
    }

    async fn load_pool(&self, pool_id: i64) -> ServiceResult<Option<PoolAggregate>> {
        delegate!(self, s => s.load_pool(pool_id).await)
    }

    async fn list_pools(&self) -> ServiceResult<Vec<Pool>> {
        delegate!(self, s => s.list_pools().await)
    }

    async fn list_pools_for_user(&self, user_id: &str) -> ServiceResult<Vec<Pool>> {
        delegate!(self, s => s.list_pools_for_user(user_id).await)
    }

    async fn set_pool_premium(&self, pool_id: i64, until: DateTime<Utc>) -> ServiceResult<bool> {
        delegate!(self, s => s.set_pool_premium(pool_id, until).await)
    }

    async fn contributions(
        &self,
        pool_id: i64,
        user_id: Option<&str>,
    ) -> ServiceResult<Vec<Contribution>> {
        delegate!(self, s => s.contributions(pool_id, user_id).await)
    }

    async fn payouts(&self, pool_id: i64) -> ServiceResult<Vec<Payout>> {
        delegate!(self, s => s.payouts(pool_id).await)
    }

    async fn settlement_recorded(&self, settlement_ref: &str) -> ServiceResult<bool> {
        delegate!(self, s => s.settlement_recorded(settlement_ref).await)
    }

    async fn insert_penalty(&self, penalty: &Penalty) -> ServiceResult<()> {
        delegate!(self, s => s.insert_penalty(penalty).await)
    }

    async fn penalties(&self, pool_id: i64, user_id: Option<&str>) -> ServiceResult<Vec<Penalty>> {
        delegate!(self, s => s.penalties(pool_id, user_id).await)
    }

    async fn get_user(&self, user_id: &str) -> ServiceResult<Option<User>> {
        delegate!(self, s => s.get_user(user_id).await)
    }

    async fn ensure_user(&self, user_id: &str, wallet_address: Option<&str>) -> ServiceResult<User> {
        delegate!(self, s => s.ensure_user(user_id, wallet_address).await)
    }

    async fn set_user_premium(&self, user_id: &str, until: DateTime<Utc>) -> ServiceResult<bool> {
        delegate!(self, s => s.set_user_premium(user_id, until).await)
    }

    async fn insert_proposal(&self, proposal: &Proposal) -> ServiceResult<()> {
        delegate!(self, s => s.insert_proposal(proposal).await)
    }

    async fn get_proposal(&self, proposal_id: i64) -> ServiceResult<Option<Proposal>> {
        delegate!(self, s => s.get_proposal(proposal_id).await)
    }

    async fn list_proposals(&self, pool_id: i64) -> ServiceResult<Vec<Proposal>> {
        delegate!(self, s => s.list_proposals(pool_id).await)
    }

    async fn upsert_vote(&self, vote: &Vote) -> ServiceResult<()> {
        delegate!(self, s => s.upsert_vote(vote).await)
    }

    async fn votes(&self, proposal_id: i64) -> ServiceResult<Vec<Vote>> {
        delegate!(self, s => s.votes(proposal_id).await)
    }

    async fn record_pending_settlement(&self, pending: &PendingSettlement) -> ServiceResult<()> {
        delegate!(self, s => s.record_pending_settlement(pending).await)
    }

    async fn pending_settlements(&self, limit: i64) -> ServiceResult<Vec<PendingSettlement>> {
        delegate!(self, s => s.pending_settlements(limit).await)
    }

    async fn update_pending_settlement(
        &self,
        settlement_ref: &str,
        status: SettlementStatus,
        checked_at: DateTime<Utc>,
    ) -> ServiceResult<()> {
        delegate!(self, s => s.update_pending_settlement(settlement_ref, status, checked_at).await)
    }
}
