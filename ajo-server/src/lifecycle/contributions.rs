//! Contribution recording
//!
//! A contribution is only written after the payment rail reports the
//! transfer confirmed, to the pool escrow, for at least the declared amount.
//! Late contributions carry a penalty, recorded separately and best-effort.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    Contribution, ContributionCreate, ContributionQuote, Penalty, PenaltyReason, PenaltyStatus,
    SettlementKind, SettlementStatus, TransferInstruction,
};
use shared::util::snowflake_id;

use super::{PoolManager, log_unrecorded};
use crate::domain::{PoolAggregate, fees, premium, schedule};
use crate::error::ServiceResult;
use crate::settlement::{ExpectedTransfer, SettlementError};
use crate::store::{Changeset, LedgerStore};
use crate::validation::{MAX_SHORT_TEXT_LEN, validate_amount, validate_required_text};

/// Terms applied to one contribution
#[derive(Debug, Clone, Copy)]
pub struct CreditTerms {
    pub grace_period_days: i64,
    pub is_premium: bool,
    pub contribution_id: i64,
}

/// Credit `amount` to `user_id` for the pool's current cycle
pub fn credit_contribution(
    agg: &mut PoolAggregate,
    user_id: &str,
    amount: Decimal,
    settlement_ref: &str,
    recorded_at: DateTime<Utc>,
    terms: CreditTerms,
    changes: &mut Changeset,
) -> Result<Contribution, AppError> {
    let pool = &agg.pool;
    if pool.status.is_terminal() {
        return Err(AppError::new(ErrorCode::PoolClosed));
    }
    let member = agg
        .active_member(user_id)
        .ok_or_else(|| AppError::new(ErrorCode::NotPoolMember))?;
    if amount < pool.contribution_amount {
        return Err(AppError::with_message(
            ErrorCode::ValueOutOfRange,
            format!(
                "Contribution must be at least {} {}",
                pool.contribution_amount, pool.contribution_token_symbol
            ),
        ));
    }
    let cycle = pool.current_cycle;
    if member.last_contribution_cycle == Some(cycle) {
        return Err(AppError::with_message(
            ErrorCode::ContributionAlreadyMade,
            format!("Already contributed for cycle {cycle}"),
        ));
    }

    let is_late = schedule::is_late(recorded_at, pool.next_payout_date, terms.grace_period_days);
    let contribution = Contribution {
        id: terms.contribution_id,
        pool_id: pool.id,
        user_id: user_id.to_string(),
        amount,
        token: pool.contribution_token.clone(),
        token_symbol: pool.contribution_token_symbol.clone(),
        settlement_ref: settlement_ref.to_string(),
        status: SettlementStatus::Confirmed,
        is_late,
        penalty_amount: is_late.then(|| fees::late_penalty(amount, terms.is_premium)),
        cycle,
        created_at: recorded_at,
    };

    let overflow = || {
        AppError::with_message(ErrorCode::ValueOutOfRange, "Contribution total is out of range")
    };
    let pool_total = pool.total_contributed.checked_add(amount).ok_or_else(overflow)?;
    let member_total = member.total_contributed.checked_add(amount).ok_or_else(overflow)?;

    agg.pool.total_contributed = pool_total;
    agg.pool.updated_at = recorded_at;
    if let Some(member) = agg.member_mut(user_id) {
        member.total_contributed = member_total;
        member.last_contribution_date = Some(recorded_at);
        member.last_contribution_cycle = Some(cycle);
    }
    changes.contributions.push(contribution.clone());
    Ok(contribution)
}

impl PoolManager {
    async fn credit_terms(&self, user_id: &str, at: DateTime<Utc>) -> ServiceResult<CreditTerms> {
        let user = self.store.get_user(user_id).await?;
        Ok(CreditTerms {
            grace_period_days: self.policy.grace_period_days,
            is_premium: premium::is_premium_user(user.as_ref(), at),
            contribution_id: snowflake_id(),
        })
    }

    /// Transfer parameters and fees for the caller's contribution this cycle
    pub async fn prepare_contribution(
        &self,
        pool_id: i64,
        user_id: &str,
    ) -> ServiceResult<ContributionQuote> {
        let agg = self.load(pool_id).await?;
        let now = self.clock.now();
        let terms = self.credit_terms(user_id, now).await?;
        let amount = agg.pool.contribution_amount;
        // same checks as recording, against a scratch copy
        credit_contribution(
            &mut agg.clone(),
            user_id,
            amount,
            "",
            now,
            terms,
            &mut Changeset::default(),
        )?;

        let to = self.contribution_destination(&agg).await?;
        let from = self.wallet_of(user_id).await?;
        let pool = &agg.pool;
        Ok(ContributionQuote {
            transfer: TransferInstruction {
                from,
                to,
                amount,
                token: pool.contribution_token.clone(),
                token_symbol: pool.contribution_token_symbol.clone(),
            },
            fees: fees::fee_breakdown(
                amount,
                pool,
                terms.is_premium,
                now,
                self.policy.grace_period_days,
            )?,
            cycle: pool.current_cycle,
        })
    }

    /// Verify a member's transfer and record it as this cycle's contribution
    pub async fn record_contribution(
        &self,
        pool_id: i64,
        user_id: &str,
        req: ContributionCreate,
    ) -> ServiceResult<Contribution> {
        validate_required_text(
            &req.transaction_signature,
            "transactionSignature",
            MAX_SHORT_TEXT_LEN,
        )?;
        let settlement_ref = req.transaction_signature.trim();
        validate_amount(req.amount, "Amount")?;

        let agg = self.load(pool_id).await?;
        let now = self.clock.now();
        credit_contribution(
            &mut agg.clone(),
            user_id,
            req.amount,
            settlement_ref,
            now,
            self.credit_terms(user_id, now).await?,
            &mut Changeset::default(),
        )?;

        self.ensure_unrecorded(settlement_ref).await?;
        let _in_flight = self.claim(settlement_ref)?;

        let source = self.contributor_wallet(user_id).await?;
        let destination = self.contribution_destination(&agg).await?;
        let expected = ExpectedTransfer {
            source: Some(&source),
            destination: Some(&destination),
            amount: req.amount,
        };
        match self.settlement.verify(settlement_ref, &expected).await {
            Ok(_) => {}
            Err(e @ SettlementError::Timeout { .. }) => {
                return Err(self
                    .park_unconfirmed(e, SettlementKind::Contribution, pool_id, user_id, req.amount)
                    .await);
            }
            Err(e) => {
                tracing::warn!(settlement_ref, pool_id, user_id, error = %e, "Contribution transfer rejected");
                return Err(e.into());
            }
        }

        self.finalize_contribution(pool_id, user_id, req.amount, settlement_ref, now, false)
            .await
    }

    /// Record an already-verified contribution transfer
    ///
    /// `resolves_pending` marks the matching reconciliation entry confirmed
    /// in the same transaction.
    pub async fn finalize_contribution(
        &self,
        pool_id: i64,
        user_id: &str,
        amount: Decimal,
        settlement_ref: &str,
        recorded_at: DateTime<Utc>,
        resolves_pending: bool,
    ) -> ServiceResult<Contribution> {
        let terms = self.credit_terms(user_id, recorded_at).await?;
        let result = self
            .store
            .apply(pool_id, |agg, changes| {
                let contribution = credit_contribution(
                    agg,
                    user_id,
                    amount,
                    settlement_ref,
                    recorded_at,
                    terms,
                    changes,
                )?;
                if resolves_pending {
                    changes.resolved_settlement = Some(settlement_ref.to_string());
                }
                Ok(contribution)
            })
            .await;
        let contribution = match result {
            Ok(c) => c,
            Err(e) => {
                log_unrecorded(&e, settlement_ref, pool_id, user_id, "the contribution");
                return Err(e);
            }
        };

        tracing::info!(
            pool_id,
            user_id,
            settlement_ref,
            cycle = contribution.cycle,
            amount = %contribution.amount,
            is_late = contribution.is_late,
            "Contribution recorded"
        );

        if let Some(penalty_amount) = contribution.penalty_amount {
            let penalty = Penalty {
                id: snowflake_id(),
                pool_id,
                user_id: user_id.to_string(),
                contribution_id: Some(contribution.id),
                amount: penalty_amount,
                reason: PenaltyReason::LateContribution,
                status: PenaltyStatus::Pending,
                created_at: recorded_at,
            };
            if let Err(e) = self.store.insert_penalty(&penalty).await {
                tracing::warn!(
                    pool_id,
                    user_id,
                    contribution_id = contribution.id,
                    error = %e,
                    "Failed to record late penalty"
                );
            }
        }
        Ok(contribution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::sample_aggregate;
    use chrono::Duration;
    use shared::models::PoolStatus;

    fn terms() -> CreditTerms {
        CreditTerms {
            grace_period_days: 3,
            is_premium: false,
            contribution_id: 1,
        }
    }

    #[test]
    fn on_time_contribution_updates_totals() {
        let mut agg = sample_aggregate(2);
        let mut changes = Changeset::default();
        let at = agg.pool.next_payout_date - Duration::days(5);
        let c = credit_contribution(&mut agg, "user-2", Decimal::from(10), "sig", at, terms(), &mut changes)
            .unwrap();

        assert!(!c.is_late);
        assert_eq!(c.penalty_amount, None);
        assert_eq!(c.cycle, 1);
        assert_eq!(agg.pool.total_contributed, Decimal::from(10));
        let member = agg.member("user-2").unwrap();
        assert_eq!(member.total_contributed, Decimal::from(10));
        assert_eq!(member.last_contribution_cycle, Some(1));
        assert_eq!(changes.contributions.len(), 1);
    }

    #[test]
    fn late_contribution_carries_penalty() {
        let mut agg = sample_aggregate(2);
        let at = agg.pool.next_payout_date - Duration::days(1);
        let c = credit_contribution(
            &mut agg,
            "user-1",
            Decimal::from(10),
            "sig",
            at,
            terms(),
            &mut Changeset::default(),
        )
        .unwrap();
        assert!(c.is_late);
        assert_eq!(c.penalty_amount, Some(Decimal::new(2, 1)));
    }

    #[test]
    fn one_contribution_per_cycle() {
        let mut agg = sample_aggregate(2);
        let at = agg.pool.start_date;
        let mut changes = Changeset::default();
        credit_contribution(&mut agg, "user-1", Decimal::from(10), "a", at, terms(), &mut changes).unwrap();
        let err = credit_contribution(&mut agg, "user-1", Decimal::from(10), "b", at, terms(), &mut changes)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ContributionAlreadyMade);

        agg.pool.current_cycle = 2;
        assert!(
            credit_contribution(&mut agg, "user-1", Decimal::from(10), "c", at, terms(), &mut changes)
                .is_ok()
        );
    }

    #[test]
    fn rejects_outsiders_short_amounts_and_closed_pools() {
        let mut agg = sample_aggregate(2);
        let at = agg.pool.start_date;
        let mut changes = Changeset::default();

        let err = credit_contribution(&mut agg, "stranger", Decimal::from(10), "a", at, terms(), &mut changes)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotPoolMember);

        let err = credit_contribution(&mut agg, "user-1", Decimal::from(9), "a", at, terms(), &mut changes)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValueOutOfRange);

        agg.pool.status = PoolStatus::Completed;
        let err = credit_contribution(&mut agg, "user-1", Decimal::from(10), "a", at, terms(), &mut changes)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PoolClosed);
        assert!(changes.contributions.is_empty());
    }
}
