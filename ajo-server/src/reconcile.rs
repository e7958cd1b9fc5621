//! Reconciliation worker
//!
//! Transfers whose confirmation timed out are parked in
//! `pending_settlements`. The worker re-checks them on an interval and
//! finalizes the ones the ledger has since confirmed through the normal
//! contribution/payout paths, or marks them failed.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use shared::models::{PendingSettlement, SettlementKind, SettlementStatus};

use crate::error::{ServiceError, ServiceResult};
use crate::lifecycle::PoolManager;
use crate::settlement::{ExpectedTransfer, TransferStatus};
use crate::store::LedgerStore;

/// Checks after which a transfer the ledger never reports is given up on
pub const MAX_RECONCILE_ATTEMPTS: i32 = 60;

const BATCH_SIZE: i64 = 100;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub checked: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub still_pending: usize,
}

enum Outcome {
    Confirmed,
    Failed,
    Pending,
}

pub struct Reconciler {
    pools: Arc<PoolManager>,
}

impl Reconciler {
    pub fn new(pools: Arc<PoolManager>) -> Self {
        Self { pools }
    }

    /// Run [`run_once`](Self::run_once) every `every` until the task is dropped
    pub fn spawn(self, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await; // skip immediate
            loop {
                interval.tick().await;
                match self.run_once().await {
                    Ok(report) if report.checked > 0 => {
                        tracing::info!(?report, "Reconciliation pass finished")
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Reconciliation pass failed"),
                }
            }
        })
    }

    pub async fn run_once(&self) -> ServiceResult<ReconcileReport> {
        let store = self.pools.store();
        let pending = store.pending_settlements(BATCH_SIZE).await?;
        let mut report = ReconcileReport::default();

        for entry in pending {
            report.checked += 1;
            let outcome = self.reconcile(&entry).await?;
            let status = match outcome {
                Outcome::Confirmed => {
                    report.confirmed += 1;
                    SettlementStatus::Confirmed
                }
                Outcome::Failed => {
                    report.failed += 1;
                    SettlementStatus::Failed
                }
                Outcome::Pending => {
                    report.still_pending += 1;
                    SettlementStatus::Pending
                }
            };
            store
                .update_pending_settlement(&entry.settlement_ref, status, self.pools.clock().now())
                .await?;
        }
        Ok(report)
    }

    async fn reconcile(&self, entry: &PendingSettlement) -> ServiceResult<Outcome> {
        let settlement_ref = entry.settlement_ref.as_str();
        if self.pools.store().settlement_recorded(settlement_ref).await? {
            return Ok(Outcome::Confirmed);
        }

        let status = match self.pools.settlement().lookup(settlement_ref).await {
            Ok(Some(status)) => status,
            Ok(None) => return Ok(self.unseen(entry)),
            Err(e) => {
                tracing::warn!(settlement_ref, error = %e, "Payment rail lookup failed");
                return Ok(Outcome::Pending);
            }
        };
        if let Some(err) = &status.err {
            tracing::warn!(settlement_ref, pool_id = entry.pool_id, error = %err, "Parked transfer failed on the ledger");
            return Ok(Outcome::Failed);
        }
        if !status.confirmed {
            return Ok(self.unseen(entry));
        }

        let result = match entry.kind {
            SettlementKind::Contribution => self.finish_contribution(entry, &status).await,
            SettlementKind::Payout => self.finish_payout(entry, &status).await,
        };
        match result {
            Ok(()) => {
                tracing::info!(
                    settlement_ref,
                    pool_id = entry.pool_id,
                    kind = entry.kind.as_db(),
                    "Parked transfer reconciled"
                );
                Ok(Outcome::Confirmed)
            }
            Err(ServiceError::App(e)) => {
                tracing::warn!(
                    settlement_ref,
                    pool_id = entry.pool_id,
                    user_id = %entry.user_id,
                    code = %e.code,
                    "Confirmed transfer could not be applied: {}",
                    e.message
                );
                Ok(Outcome::Failed)
            }
            Err(e) => Err(e),
        }
    }

    fn unseen(&self, entry: &PendingSettlement) -> Outcome {
        if entry.attempts + 1 >= MAX_RECONCILE_ATTEMPTS {
            tracing::warn!(
                settlement_ref = %entry.settlement_ref,
                pool_id = entry.pool_id,
                attempts = entry.attempts + 1,
                "Giving up on unconfirmed transfer"
            );
            Outcome::Failed
        } else {
            Outcome::Pending
        }
    }

    async fn finish_contribution(
        &self,
        entry: &PendingSettlement,
        status: &TransferStatus,
    ) -> ServiceResult<()> {
        let agg = self.pools.load(entry.pool_id).await?;
        let source = self.pools.contributor_wallet(&entry.user_id).await?;
        let destination = self.pools.contribution_destination(&agg).await?;
        ExpectedTransfer {
            source: Some(&source),
            destination: Some(&destination),
            amount: entry.amount,
        }
        .check(status)?;

        self.pools
            .finalize_contribution(
                entry.pool_id,
                &entry.user_id,
                entry.amount,
                &entry.settlement_ref,
                entry.created_at,
                true,
            )
            .await?;
        Ok(())
    }

    async fn finish_payout(
        &self,
        entry: &PendingSettlement,
        status: &TransferStatus,
    ) -> ServiceResult<()> {
        let agg = self.pools.load(entry.pool_id).await?;
        let plan = self.pools.payout_plan(&agg, None).await?;
        ExpectedTransfer {
            source: Some(&plan.escrow),
            destination: Some(&plan.recipient_wallet),
            amount: plan.amount,
        }
        .check(status)?;

        self.pools
            .finalize_payout(
                entry.pool_id,
                None,
                &plan.recipient_id,
                status.amount,
                &entry.settlement_ref,
                true,
            )
            .await?;
        Ok(())
    }
}
