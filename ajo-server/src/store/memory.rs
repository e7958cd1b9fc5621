//! In-process ledger store
//!
//! Used by tests and `memory://` deployments. A single lock guards the whole
//! ledger, so `apply` is serialized across pools; the unique constraints of
//! the SQL schema are re-checked on commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    Contribution, Member, Payout, PayoutKind, PendingSettlement, Penalty, Pool, Proposal,
    ProposalStatus, SettlementStatus, User, Vote,
};

use super::{Changeset, LedgerStore};
use crate::domain::PoolAggregate;
use crate::error::{ServiceError, ServiceResult};

#[derive(Default)]
struct Ledger {
    pools: BTreeMap<i64, Pool>,
    members: BTreeMap<i64, Vec<Member>>,
    contributions: Vec<Contribution>,
    payouts: Vec<Payout>,
    penalties: Vec<Penalty>,
    users: HashMap<String, User>,
    proposals: BTreeMap<i64, Proposal>,
    votes: BTreeMap<(i64, String), Vote>,
    pending: BTreeMap<String, PendingSettlement>,
}

impl Ledger {
    fn aggregate(&self, pool_id: i64) -> Option<PoolAggregate> {
        let pool = self.pools.get(&pool_id)?.clone();
        let members = self.members.get(&pool_id).cloned().unwrap_or_default();
        Some(PoolAggregate::new(pool, members))
    }

    fn settlement_recorded(&self, settlement_ref: &str) -> bool {
        self.contributions
            .iter()
            .any(|c| c.settlement_ref == settlement_ref)
            || self.payouts.iter().any(|p| p.settlement_ref == settlement_ref)
    }

    /// Mirrors the table constraints of the SQL schema
    fn check(&self, agg: &PoolAggregate, changes: &Changeset) -> ServiceResult<()> {
        let pool = &agg.pool;
        if pool.current_members > pool.total_members {
            return Err(ErrorCode::PoolFull.into());
        }

        for (i, m) in agg.members.iter().enumerate() {
            for other in &agg.members[i + 1..] {
                if m.user_id == other.user_id {
                    return Err(ErrorCode::MemberExists.into());
                }
                if m.is_active() && other.is_active() && m.position == other.position {
                    return Err(ErrorCode::PositionTaken.into());
                }
            }
        }

        for (i, c) in changes.contributions.iter().enumerate() {
            let dup_in_batch = changes.contributions[..i]
                .iter()
                .any(|o| o.settlement_ref == c.settlement_ref);
            if dup_in_batch || self.settlement_recorded(&c.settlement_ref) {
                return Err(ErrorCode::DuplicateSettlement.into());
            }
            let same_cycle = self
                .contributions
                .iter()
                .any(|o| o.pool_id == c.pool_id && o.user_id == c.user_id && o.cycle == c.cycle);
            if same_cycle {
                return Err(ErrorCode::ContributionAlreadyMade.into());
            }
        }

        for p in &changes.payouts {
            let dup = self.settlement_recorded(&p.settlement_ref)
                || changes
                    .contributions
                    .iter()
                    .any(|c| c.settlement_ref == p.settlement_ref);
            if dup {
                return Err(ErrorCode::DuplicateSettlement.into());
            }
            let cycle_paid = p.kind == PayoutKind::Rotation
                && self.payouts.iter().any(|o| {
                    o.pool_id == p.pool_id && o.kind == PayoutKind::Rotation && o.cycle == p.cycle
                });
            if cycle_paid {
                return Err(AppError::with_message(
                    ErrorCode::DuplicateSettlement,
                    format!("Cycle {} has already been paid out", p.cycle),
                )
                .into());
            }
        }

        if let Some(t) = &changes.proposal {
            match self.proposals.get(&t.proposal_id) {
                None => return Err(ErrorCode::ProposalNotFound.into()),
                Some(p) if p.status != ProposalStatus::Active => {
                    return Err(ErrorCode::ProposalAlreadyFinalized.into());
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    ledger: Mutex<Ledger>,
    fail_penalty_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `insert_penalty` fail, to exercise best-effort paths
    pub fn fail_penalty_writes(&self, fail: bool) {
        self.fail_penalty_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_pool(&self, agg: &PoolAggregate) -> ServiceResult<()> {
        let mut ledger = self.ledger.lock();
        if ledger.pools.contains_key(&agg.pool.id) {
            return Err(AppError::conflict("Pool id already exists").into());
        }
        ledger.check(agg, &Changeset::default())?;
        ledger.pools.insert(agg.pool.id, agg.pool.clone());
        ledger.members.insert(agg.pool.id, agg.members.clone());
        Ok(())
    }

    async fn apply<T, F>(&self, pool_id: i64, f: F) -> ServiceResult<T>
    where
        T: Send,
        F: Fn(&mut PoolAggregate, &mut Changeset) -> ServiceResult<T> + Send + Sync,
    {
        let mut ledger = self.ledger.lock();
        let mut agg = ledger
            .aggregate(pool_id)
            .ok_or_else(|| ServiceError::from(ErrorCode::PoolNotFound))?;
        let mut changes = Changeset::default();

        let out = f(&mut agg, &mut changes)?;
        ledger.check(&agg, &changes)?;

        let PoolAggregate { pool, members } = agg;
        ledger.pools.insert(pool_id, pool);
        ledger.members.insert(pool_id, members);
        ledger.contributions.extend(changes.contributions);
        ledger.payouts.extend(changes.payouts);
        if let Some(t) = changes.proposal
            && let Some(p) = ledger.proposals.get_mut(&t.proposal_id)
        {
            p.status = t.to;
            p.executed_at = Some(t.at);
        }
        if let Some(settlement_ref) = changes.resolved_settlement
            && let Some(p) = ledger.pending.get_mut(&settlement_ref)
        {
            p.status = SettlementStatus::Confirmed;
        }
        Ok(out)
    }

    async fn load_pool(&self, pool_id: i64) -> ServiceResult<Option<PoolAggregate>> {
        Ok(self.ledger.lock().aggregate(pool_id))
    }

    async fn list_pools(&self) -> ServiceResult<Vec<Pool>> {
        Ok(self.ledger.lock().pools.values().cloned().collect())
    }

    async fn list_pools_for_user(&self, user_id: &str) -> ServiceResult<Vec<Pool>> {
        let ledger = self.ledger.lock();
        let mut pools: Vec<Pool> = ledger
            .members
            .iter()
            .filter(|(_, members)| members.iter().any(|m| m.user_id == user_id && m.is_active()))
            .filter_map(|(id, _)| ledger.pools.get(id).cloned())
            .collect();
        pools.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(pools)
    }

    async fn set_pool_premium(&self, pool_id: i64, until: DateTime<Utc>) -> ServiceResult<bool> {
        let mut ledger = self.ledger.lock();
        Ok(match ledger.pools.get_mut(&pool_id) {
            Some(pool) => {
                pool.premium_until = Some(until);
                true
            }
            None => false,
        })
    }

    async fn contributions(
        &self,
        pool_id: i64,
        user_id: Option<&str>,
    ) -> ServiceResult<Vec<Contribution>> {
        let ledger = self.ledger.lock();
        Ok(ledger
            .contributions
            .iter()
            .filter(|c| c.pool_id == pool_id && user_id.is_none_or(|u| c.user_id == u))
            .cloned()
            .collect())
    }

    async fn payouts(&self, pool_id: i64) -> ServiceResult<Vec<Payout>> {
        let ledger = self.ledger.lock();
        Ok(ledger
            .payouts
            .iter()
            .filter(|p| p.pool_id == pool_id)
            .cloned()
            .collect())
    }

    async fn settlement_recorded(&self, settlement_ref: &str) -> ServiceResult<bool> {
        Ok(self.ledger.lock().settlement_recorded(settlement_ref))
    }

    async fn insert_penalty(&self, penalty: &Penalty) -> ServiceResult<()> {
        if self.fail_penalty_writes.load(Ordering::SeqCst) {
            return Err(ServiceError::Db("penalty table unavailable".into()));
        }
        self.ledger.lock().penalties.push(penalty.clone());
        Ok(())
    }

    async fn penalties(&self, pool_id: i64, user_id: Option<&str>) -> ServiceResult<Vec<Penalty>> {
        let ledger = self.ledger.lock();
        Ok(ledger
            .penalties
            .iter()
            .filter(|p| p.pool_id == pool_id && user_id.is_none_or(|u| p.user_id == u))
            .cloned()
            .collect())
    }

    async fn get_user(&self, user_id: &str) -> ServiceResult<Option<User>> {
        Ok(self.ledger.lock().users.get(user_id).cloned())
    }

    async fn ensure_user(&self, user_id: &str, wallet_address: Option<&str>) -> ServiceResult<User> {
        let mut ledger = self.ledger.lock();
        let user = ledger.users.entry(user_id.to_string()).or_insert_with(|| User {
            id: user_id.to_string(),
            wallet_address: None,
            display_name: None,
            premium_until: None,
            created_at: Utc::now(),
        });
        if let Some(wallet) = wallet_address {
            user.wallet_address = Some(wallet.to_string());
        }
        Ok(user.clone())
    }

    async fn set_user_premium(&self, user_id: &str, until: DateTime<Utc>) -> ServiceResult<bool> {
        let mut ledger = self.ledger.lock();
        Ok(match ledger.users.get_mut(user_id) {
            Some(user) => {
                user.premium_until = Some(until);
                true
            }
            None => false,
        })
    }

    async fn insert_proposal(&self, proposal: &Proposal) -> ServiceResult<()> {
        self.ledger
            .lock()
            .proposals
            .insert(proposal.id, proposal.clone());
        Ok(())
    }

    async fn get_proposal(&self, proposal_id: i64) -> ServiceResult<Option<Proposal>> {
        Ok(self.ledger.lock().proposals.get(&proposal_id).cloned())
    }

    async fn list_proposals(&self, pool_id: i64) -> ServiceResult<Vec<Proposal>> {
        let ledger = self.ledger.lock();
        let mut proposals: Vec<Proposal> = ledger
            .proposals
            .values()
            .filter(|p| p.pool_id == pool_id)
            .cloned()
            .collect();
        proposals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(proposals)
    }

    async fn upsert_vote(&self, vote: &Vote) -> ServiceResult<()> {
        self.ledger
            .lock()
            .votes
            .insert((vote.proposal_id, vote.user_id.clone()), vote.clone());
        Ok(())
    }

    async fn votes(&self, proposal_id: i64) -> ServiceResult<Vec<Vote>> {
        let ledger = self.ledger.lock();
        Ok(ledger
            .votes
            .values()
            .filter(|v| v.proposal_id == proposal_id)
            .cloned()
            .collect())
    }

    async fn record_pending_settlement(&self, pending: &PendingSettlement) -> ServiceResult<()> {
        self.ledger
            .lock()
            .pending
            .entry(pending.settlement_ref.clone())
            .or_insert_with(|| pending.clone());
        Ok(())
    }

    async fn pending_settlements(&self, limit: i64) -> ServiceResult<Vec<PendingSettlement>> {
        let ledger = self.ledger.lock();
        let mut pending: Vec<PendingSettlement> = ledger
            .pending
            .values()
            .filter(|p| p.status == SettlementStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|p| p.created_at);
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn update_pending_settlement(
        &self,
        settlement_ref: &str,
        status: SettlementStatus,
        checked_at: DateTime<Utc>,
    ) -> ServiceResult<()> {
        if let Some(p) = self.ledger.lock().pending.get_mut(settlement_ref) {
            p.status = status;
            p.attempts += 1;
            p.last_checked_at = Some(checked_at);
        }
        Ok(())
    }
}
