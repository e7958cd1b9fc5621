//! Pool Lifecycle Manager
//!
//! Owns every pool-level state transition:
//!
//! ```text
//! pending ──(last member joins)──> active ──(last payout)──> completed
//!    └──────────────(cancel)─────────┴──> cancelled
//! ```
//!
//! Each mutation is a pure function over the [`PoolAggregate`] executed
//! inside [`LedgerStore::apply`], so position assignment, the full/not-full
//! transition and rotation advancement are serialized per pool. Settlement
//! references are verified against the payment rail before `apply` runs.

mod contributions;
mod membership;
mod payouts;
mod pools;

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use shared::error::{AppError, ErrorCode};
use shared::models::{PendingSettlement, SettlementKind, SettlementStatus};

use crate::domain::{Clock, PayoutAnchor, PoolAggregate, schedule};
use crate::error::{ServiceError, ServiceResult};
use crate::settlement::{Settlement, SettlementError};
use crate::store::{LedgerStore, Store};

pub use contributions::{CreditTerms, credit_contribution};
pub use membership::admit_member;
pub use payouts::{RotationOutcome, advance_rotation};

/// Scheduling and settlement rules applied by the managers
#[derive(Debug, Clone)]
pub struct LedgerPolicy {
    pub grace_period_days: i64,
    pub payout_anchor: PayoutAnchor,
    /// Escrow for pools created without their own address
    pub default_escrow: Option<String>,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            grace_period_days: schedule::DEFAULT_GRACE_PERIOD_DAYS,
            payout_anchor: PayoutAnchor::default(),
            default_escrow: None,
        }
    }
}

pub struct PoolManager {
    store: Arc<Store>,
    settlement: Settlement,
    clock: Arc<dyn Clock>,
    policy: LedgerPolicy,
    /// Settlement refs currently between verification and recording
    in_flight: DashMap<String, ()>,
}

/// Releases an in-flight settlement ref on drop
struct InFlight<'a> {
    map: &'a DashMap<String, ()>,
    key: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

pub(crate) fn pool_not_found(pool_id: i64) -> ServiceError {
    AppError::with_message(ErrorCode::PoolNotFound, format!("Pool {pool_id} not found")).into()
}

impl PoolManager {
    pub fn new(
        store: Arc<Store>,
        settlement: Settlement,
        clock: Arc<dyn Clock>,
        policy: LedgerPolicy,
    ) -> Self {
        Self {
            store,
            settlement,
            clock,
            policy,
            in_flight: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn settlement(&self) -> &Settlement {
        &self.settlement
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    pub(crate) async fn load(&self, pool_id: i64) -> ServiceResult<PoolAggregate> {
        self.store
            .load_pool(pool_id)
            .await?
            .ok_or_else(|| pool_not_found(pool_id))
    }

    /// Reject a second concurrent request carrying the same settlement ref
    fn claim(&self, settlement_ref: &str) -> ServiceResult<InFlight<'_>> {
        match self.in_flight.entry(settlement_ref.to_string()) {
            Entry::Occupied(_) => Err(AppError::with_message(
                ErrorCode::DuplicateSettlement,
                "Transfer is already being processed",
            )
            .into()),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(InFlight {
                    map: &self.in_flight,
                    key: settlement_ref.to_string(),
                })
            }
        }
    }

    async fn ensure_unrecorded(&self, settlement_ref: &str) -> ServiceResult<()> {
        if self.store.settlement_recorded(settlement_ref).await? {
            return Err(AppError::with_message(
                ErrorCode::DuplicateSettlement,
                "Transfer has already been recorded",
            )
            .into());
        }
        Ok(())
    }

    /// Where contributions for `agg` are sent: the pool escrow, else the creator's wallet
    pub(crate) async fn contribution_destination(&self, agg: &PoolAggregate) -> ServiceResult<String> {
        if let Some(address) = &agg.pool.pool_address {
            return Ok(address.clone());
        }
        self.store
            .get_user(&agg.pool.creator_id)
            .await?
            .and_then(|u| u.wallet_address)
            .ok_or_else(|| {
                AppError::validation("Pool has no escrow address and the creator has no wallet")
                    .into()
            })
    }

    async fn wallet_of(&self, user_id: &str) -> ServiceResult<Option<String>> {
        Ok(self
            .store
            .get_user(user_id)
            .await?
            .and_then(|u| u.wallet_address))
    }

    /// Wallet a member's contributions must be sent from
    pub(crate) async fn contributor_wallet(&self, user_id: &str) -> ServiceResult<String> {
        self.wallet_of(user_id).await?.ok_or_else(|| {
            AppError::validation("Register a wallet address before contributing").into()
        })
    }

    /// Park a transfer whose confirmation timed out for the reconciliation worker
    async fn park_unconfirmed(
        &self,
        err: SettlementError,
        kind: SettlementKind,
        pool_id: i64,
        user_id: &str,
        amount: rust_decimal::Decimal,
    ) -> ServiceError {
        if let SettlementError::Timeout { settlement_ref, .. } = &err {
            let pending = PendingSettlement {
                settlement_ref: settlement_ref.clone(),
                kind,
                pool_id,
                user_id: user_id.to_string(),
                amount,
                status: SettlementStatus::Pending,
                attempts: 0,
                created_at: self.clock.now(),
                last_checked_at: None,
            };
            match self.store.record_pending_settlement(&pending).await {
                Ok(()) => tracing::warn!(
                    settlement_ref = %settlement_ref,
                    pool_id,
                    user_id,
                    kind = kind.as_db(),
                    "Transfer not confirmed in time, queued for reconciliation"
                ),
                Err(e) => tracing::error!(
                    settlement_ref = %settlement_ref,
                    pool_id,
                    user_id,
                    error = %e,
                    "Failed to queue unconfirmed transfer for reconciliation"
                ),
            }
        }
        err.into()
    }
}

/// Log a verified transfer that could not be recorded
fn log_unrecorded(err: &ServiceError, settlement_ref: &str, pool_id: i64, user_id: &str, what: &str) {
    match err {
        ServiceError::Db(e) => tracing::error!(
            settlement_ref,
            pool_id,
            user_id,
            error = %e,
            "Transfer verified but {what} was not recorded"
        ),
        ServiceError::App(e) => tracing::warn!(
            settlement_ref,
            pool_id,
            user_id,
            code = %e.code,
            "Transfer verified but {what} was rejected: {}",
            e.message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FixedClock;
    use crate::settlement::InMemoryRail;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use std::time::Duration;

    fn manager() -> PoolManager {
        let rail = Arc::new(InMemoryRail::new());
        PoolManager::new(
            Arc::new(Store::Memory(MemoryStore::new())),
            Settlement::new(rail, Duration::from_millis(1), Duration::from_millis(5)),
            Arc::new(FixedClock::new(Utc::now())),
            LedgerPolicy::default(),
        )
    }

    #[test]
    fn claim_is_exclusive_until_dropped() {
        let m = manager();
        let guard = m.claim("sig-1").unwrap();
        let err = m.claim("sig-1").err().unwrap();
        assert_eq!(err.code(), ErrorCode::DuplicateSettlement);
        assert!(m.claim("sig-2").is_ok());
        drop(guard);
        assert!(m.claim("sig-1").is_ok());
    }
}
