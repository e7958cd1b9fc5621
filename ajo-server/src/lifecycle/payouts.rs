//! Rotation payouts
//!
//! Payouts are two-phase: [`PoolManager::prepare_payout`] checks the live
//! escrow balance and returns the transfer the creator has to sign, and
//! [`PoolManager::execute_payout`] verifies the signed transfer before
//! advancing the rotation. With a server signing key configured,
//! [`PoolManager::submit_payout`] does both.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    Payout, PayoutKind, PayoutQuote, PayoutReceipt, Pool, PoolStatus, SettlementKind,
    SettlementStatus, TransferInstruction,
};
use shared::util::snowflake_id;

use super::{PoolManager, log_unrecorded};
use crate::domain::{PayoutAnchor, PoolAggregate, access};
use crate::error::ServiceResult;
use crate::settlement::{ExpectedTransfer, SettlementError};
use crate::store::{Changeset, LedgerStore};
use crate::validation::{MAX_SHORT_TEXT_LEN, validate_required_text};

#[derive(Debug, Clone)]
pub struct RotationOutcome {
    pub pool: Pool,
    pub payout: Payout,
    pub completed: bool,
}

/// Who gets paid this cycle, from where, and how much
#[derive(Debug, Clone)]
pub(crate) struct PayoutPlan {
    pub recipient_id: String,
    pub recipient_wallet: String,
    pub escrow: String,
    pub amount: Decimal,
}

fn check_payout_allowed(agg: &PoolAggregate, requester: Option<&str>) -> Result<(), AppError> {
    if let Some(user_id) = requester
        && !access::is_creator(Some(user_id), agg)
    {
        return Err(AppError::with_message(
            ErrorCode::NotPoolCreator,
            "Only the pool creator can execute payouts",
        ));
    }
    if agg.pool.status != PoolStatus::Active {
        return Err(AppError::with_message(
            ErrorCode::PoolNotActive,
            format!("Pool is {}", agg.pool.status.as_db()),
        ));
    }
    Ok(())
}

fn current_recipient(agg: &PoolAggregate) -> Result<&str, AppError> {
    agg.pool
        .next_payout_member_id
        .as_deref()
        .filter(|id| agg.active_member(id).is_some())
        .ok_or_else(|| AppError::new(ErrorCode::NoEligibleRecipient))
}

/// Pay the current recipient and move the rotation on
///
/// `requester` is `None` when the system finalizes a reconciled transfer.
/// The next recipient is the next active member in position order who has
/// not been paid; when none is left the pool completes.
#[allow(clippy::too_many_arguments)]
pub fn advance_rotation(
    agg: &mut PoolAggregate,
    requester: Option<&str>,
    recipient_id: &str,
    amount: Decimal,
    settlement_ref: &str,
    paid_at: DateTime<Utc>,
    anchor: PayoutAnchor,
    payout_id: i64,
    changes: &mut Changeset,
) -> Result<RotationOutcome, AppError> {
    check_payout_allowed(agg, requester)?;
    if current_recipient(agg)? != recipient_id {
        return Err(AppError::with_message(
            ErrorCode::NoEligibleRecipient,
            "Rotation has moved on since the transfer was prepared",
        ));
    }

    let cycle = agg.pool.current_cycle;
    let payout = Payout {
        id: payout_id,
        pool_id: agg.pool.id,
        recipient_id: recipient_id.to_string(),
        amount,
        settlement_ref: settlement_ref.to_string(),
        status: SettlementStatus::Confirmed,
        kind: PayoutKind::Rotation,
        cycle,
        payout_date: paid_at,
    };
    if let Some(member) = agg.member_mut(recipient_id) {
        member.has_received_payout = true;
    }

    let next = agg.successor_of(recipient_id).map(|m| m.user_id.clone());
    let pool = &mut agg.pool;
    let completed = next.is_none();
    match next {
        Some(next_id) => {
            pool.next_payout_date = anchor.advance(paid_at, pool.start_date, pool.frequency, cycle);
            pool.next_payout_member_id = Some(next_id);
            pool.current_cycle += 1;
        }
        None => {
            pool.status = PoolStatus::Completed;
            pool.next_payout_member_id = None;
        }
    }
    pool.updated_at = paid_at;

    changes.payouts.push(payout.clone());
    Ok(RotationOutcome {
        pool: pool.clone(),
        payout,
        completed,
    })
}

fn payout_amount(agg: &PoolAggregate) -> Result<Decimal, AppError> {
    agg.pool.expected_payout().ok_or_else(|| {
        AppError::with_message(ErrorCode::ValueOutOfRange, "Payout amount is out of range")
    })
}

impl PoolManager {
    pub(crate) async fn payout_plan(
        &self,
        agg: &PoolAggregate,
        requester: Option<&str>,
    ) -> ServiceResult<PayoutPlan> {
        check_payout_allowed(agg, requester)?;
        let recipient_id = current_recipient(agg)?.to_string();
        let escrow = agg
            .pool
            .pool_address
            .clone()
            .ok_or_else(|| AppError::validation("Pool has no escrow address"))?;
        let recipient_wallet = self.wallet_of(&recipient_id).await?.ok_or_else(|| {
            AppError::with_message(
                ErrorCode::ValidationFailed,
                format!("Recipient {recipient_id} has no wallet address"),
            )
        })?;
        Ok(PayoutPlan {
            recipient_id,
            recipient_wallet,
            escrow,
            amount: payout_amount(agg)?,
        })
    }

    /// Transfer the creator has to sign for this cycle's payout
    pub async fn prepare_payout(&self, pool_id: i64, user_id: &str) -> ServiceResult<PayoutQuote> {
        let agg = self.load(pool_id).await?;
        let plan = self.payout_plan(&agg, Some(user_id)).await?;
        let pool_balance = self.settlement.ensure_balance(&plan.escrow, plan.amount).await?;

        Ok(PayoutQuote {
            transfer: TransferInstruction {
                from: Some(plan.escrow),
                to: plan.recipient_wallet,
                amount: plan.amount,
                token: agg.pool.contribution_token.clone(),
                token_symbol: agg.pool.contribution_token_symbol.clone(),
            },
            recipient_id: plan.recipient_id,
            cycle: agg.pool.current_cycle,
            pool_balance,
        })
    }

    /// Verify a signed payout transfer and advance the rotation
    pub async fn execute_payout(
        &self,
        pool_id: i64,
        user_id: &str,
        settlement_ref: &str,
    ) -> ServiceResult<PayoutReceipt> {
        validate_required_text(settlement_ref, "transactionSignature", MAX_SHORT_TEXT_LEN)?;
        let settlement_ref = settlement_ref.trim();
        let agg = self.load(pool_id).await?;
        let plan = self.payout_plan(&agg, Some(user_id)).await?;

        self.ensure_unrecorded(settlement_ref).await?;
        let _in_flight = self.claim(settlement_ref)?;

        let expected = ExpectedTransfer {
            source: Some(&plan.escrow),
            destination: Some(&plan.recipient_wallet),
            amount: plan.amount,
        };
        let status = match self.settlement.verify(settlement_ref, &expected).await {
            Ok(status) => status,
            Err(e @ SettlementError::Timeout { .. }) => {
                return Err(self
                    .park_unconfirmed(e, SettlementKind::Payout, pool_id, user_id, plan.amount)
                    .await);
            }
            Err(e) => {
                tracing::warn!(settlement_ref, pool_id, user_id, error = %e, "Payout transfer rejected");
                return Err(e.into());
            }
        };

        self.finalize_payout(
            pool_id,
            Some(user_id),
            &plan.recipient_id,
            status.amount,
            settlement_ref,
            false,
        )
        .await
    }

    /// Sign the payout with the server key, wait for it, then finalize
    pub async fn submit_payout(&self, pool_id: i64, user_id: &str) -> ServiceResult<PayoutReceipt> {
        let agg = self.load(pool_id).await?;
        let plan = self.payout_plan(&agg, Some(user_id)).await?;
        self.settlement.ensure_balance(&plan.escrow, plan.amount).await?;

        let settlement_ref = self
            .settlement
            .submit(Some(&plan.escrow), &plan.recipient_wallet, plan.amount)
            .await?;
        tracing::info!(
            pool_id,
            settlement_ref = %settlement_ref,
            recipient_id = %plan.recipient_id,
            amount = %plan.amount,
            "Payout transfer submitted"
        );
        self.execute_payout(pool_id, user_id, &settlement_ref).await
    }

    /// Record an already-verified payout transfer
    pub async fn finalize_payout(
        &self,
        pool_id: i64,
        requester: Option<&str>,
        recipient_id: &str,
        amount: Decimal,
        settlement_ref: &str,
        resolves_pending: bool,
    ) -> ServiceResult<PayoutReceipt> {
        let paid_at = self.clock.now();
        let anchor = self.policy.payout_anchor;
        let payout_id = snowflake_id();
        let result = self
            .store
            .apply(pool_id, |agg, changes| {
                let outcome = advance_rotation(
                    agg,
                    requester,
                    recipient_id,
                    amount,
                    settlement_ref,
                    paid_at,
                    anchor,
                    payout_id,
                    changes,
                )?;
                if resolves_pending {
                    changes.resolved_settlement = Some(settlement_ref.to_string());
                }
                Ok(outcome)
            })
            .await;
        let outcome = match result {
            Ok(o) => o,
            Err(e) => {
                log_unrecorded(
                    &e,
                    settlement_ref,
                    pool_id,
                    requester.unwrap_or(recipient_id),
                    "the payout",
                );
                return Err(e);
            }
        };

        tracing::info!(
            pool_id,
            settlement_ref,
            recipient_id,
            cycle = outcome.payout.cycle,
            amount = %amount,
            "Payout executed"
        );
        if outcome.completed {
            tracing::info!(pool_id, "Every member has been paid, pool completed");
        }

        Ok(PayoutReceipt {
            pool: outcome.pool,
            payout_amount: outcome.payout.amount,
            transaction_signature: settlement_ref.to_string(),
            payout: outcome.payout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::sample_aggregate;
    use chrono::Duration;
    use shared::models::MemberStatus;

    fn active(n: i32) -> PoolAggregate {
        let mut agg = sample_aggregate(n);
        agg.pool.total_members = n;
        agg.pool.status = PoolStatus::Active;
        agg
    }

    fn pay(agg: &mut PoolAggregate, recipient: &str, at: DateTime<Utc>) -> Result<RotationOutcome, AppError> {
        advance_rotation(
            agg,
            Some("user-1"),
            recipient,
            Decimal::from(30),
            &format!("sig-{recipient}"),
            at,
            PayoutAnchor::Rolling,
            1,
            &mut Changeset::default(),
        )
    }

    #[test]
    fn full_rotation_completes_pool() {
        let mut agg = active(3);
        let t = agg.pool.start_date;

        let first = pay(&mut agg, "user-1", t).unwrap();
        assert!(!first.completed);
        assert_eq!(first.payout.cycle, 1);
        assert_eq!(agg.pool.next_payout_member_id.as_deref(), Some("user-2"));
        assert_eq!(agg.pool.current_cycle, 2);
        assert_eq!(agg.pool.next_payout_date, t + Duration::days(7));

        pay(&mut agg, "user-2", t + Duration::days(7)).unwrap();
        let last = pay(&mut agg, "user-3", t + Duration::days(14)).unwrap();
        assert!(last.completed);
        assert_eq!(last.payout.cycle, 3);
        assert_eq!(agg.pool.status, PoolStatus::Completed);
        assert_eq!(agg.pool.current_cycle, 3);
        assert_eq!(agg.pool.next_payout_member_id, None);
        assert!(agg.members.iter().all(|m| m.has_received_payout));
    }

    #[test]
    fn schedule_anchor_uses_start_date() {
        let mut agg = active(3);
        let start = agg.pool.start_date;
        advance_rotation(
            &mut agg,
            None,
            "user-1",
            Decimal::from(30),
            "sig",
            start + Duration::days(20),
            PayoutAnchor::Schedule,
            1,
            &mut Changeset::default(),
        )
        .unwrap();
        assert_eq!(agg.pool.next_payout_date, start + Duration::days(14));
    }

    #[test]
    fn removed_member_is_skipped() {
        let mut agg = active(3);
        agg.member_mut("user-2").unwrap().status = MemberStatus::Removed;
        agg.pool.current_members = 2;
        let t = agg.pool.start_date;
        pay(&mut agg, "user-1", t).unwrap();
        assert_eq!(agg.pool.next_payout_member_id.as_deref(), Some("user-3"));
    }

    #[test]
    fn only_creator_of_active_pool_pays() {
        let mut agg = active(3);
        let err = advance_rotation(
            &mut agg,
            Some("user-2"),
            "user-1",
            Decimal::from(30),
            "sig",
            Utc::now(),
            PayoutAnchor::Rolling,
            1,
            &mut Changeset::default(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotPoolCreator);

        let mut pending = sample_aggregate(2);
        let err = pay(&mut pending, "user-1", Utc::now()).unwrap_err();
        assert_eq!(err.code, ErrorCode::PoolNotActive);
    }

    #[test]
    fn stale_recipient_rejected() {
        let mut agg = active(3);
        let mut changes = Changeset::default();
        let err = advance_rotation(
            &mut agg,
            Some("user-1"),
            "user-2",
            Decimal::from(30),
            "sig",
            Utc::now(),
            PayoutAnchor::Rolling,
            1,
            &mut changes,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NoEligibleRecipient);
        assert!(changes.payouts.is_empty());
    }

    #[test]
    fn payout_follows_active_members() {
        let mut agg = active(3);
        assert_eq!(payout_amount(&agg).unwrap(), Decimal::from(30));

        agg.member_mut("user-2").unwrap().status = MemberStatus::Removed;
        agg.pool.current_members = 2;
        assert_eq!(payout_amount(&agg).unwrap(), Decimal::from(20));

        agg.pool.contribution_amount = Decimal::MAX;
        assert_eq!(payout_amount(&agg).unwrap_err().code, ErrorCode::ValueOutOfRange);
    }
}
