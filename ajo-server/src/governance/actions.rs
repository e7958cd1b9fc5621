//! Typed execution payloads and their effect on the pool aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    MemberStatus, Payout, PayoutKind, PoolStatus, Proposal, ProposalKind, SettlementStatus,
};

use crate::domain::{PoolAggregate, premium, schedule};
use crate::store::Changeset;
use crate::validation::MAX_AMOUNT;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PositionAssignment {
    pub user_id: String,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RulePatch {
    pub contribution_amount: Option<Decimal>,
    pub frequency: Option<String>,
    pub yield_enabled: Option<bool>,
}

#[derive(Deserialize)]
struct PayoutOrderData {
    new_order: Vec<PositionAssignment>,
}

#[derive(Deserialize)]
struct WithdrawalData {
    amount: Decimal,
    transaction_signature: String,
}

#[derive(Deserialize)]
struct ExtendData {
    new_end_date: DateTime<Utc>,
}

/// What an approved proposal does
#[derive(Debug, Clone, PartialEq)]
pub enum ProposalAction {
    PayoutOrder(Vec<PositionAssignment>),
    EmergencyWithdrawal {
        target_user_id: String,
        amount: Decimal,
        settlement_ref: String,
    },
    ExtendPool {
        new_end_date: DateTime<Utc>,
    },
    RemoveMember {
        target_user_id: String,
    },
    ChangeRules(RulePatch),
}

fn invalid(msg: impl Into<String>) -> AppError {
    AppError::with_message(ErrorCode::InvalidExecutionData, msg)
}

fn payload<T: DeserializeOwned>(proposal: &Proposal, what: &str) -> Result<T, AppError> {
    serde_json::from_value(proposal.execution_data.clone())
        .map_err(|e| invalid(format!("Missing or malformed execution data for {what}")).with_details(e.to_string()))
}

fn target(proposal: &Proposal, what: &str) -> Result<String, AppError> {
    proposal
        .target_user_id
        .clone()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| invalid(format!("Missing target user for {what}")))
}

impl ProposalAction {
    /// Decode the proposal's type and payload; nothing is touched on failure
    pub fn parse(proposal: &Proposal) -> Result<Self, AppError> {
        let kind = proposal.parsed_kind().ok_or_else(|| {
            AppError::with_message(
                ErrorCode::UnsupportedProposalType,
                format!("Unsupported proposal type: {}", proposal.kind),
            )
        })?;

        Ok(match kind {
            ProposalKind::PayoutOrder => {
                let data: PayoutOrderData = payload(proposal, "payout order change")?;
                if data.new_order.is_empty() {
                    return Err(invalid("New payout order is empty"));
                }
                Self::PayoutOrder(data.new_order)
            }
            ProposalKind::EmergencyWithdrawal => {
                let target_user_id = target(proposal, "emergency withdrawal")?;
                let data: WithdrawalData = payload(proposal, "emergency withdrawal")?;
                if data.amount <= Decimal::ZERO {
                    return Err(invalid("Withdrawal amount must be greater than zero"));
                }
                // never more than a full pool could hold
                if data.amount > MAX_AMOUNT * Decimal::from(premium::PREMIUM_MAX_POOL_MEMBERS) {
                    return Err(invalid("Withdrawal amount is out of range"));
                }
                let settlement_ref = data.transaction_signature.trim().to_string();
                if settlement_ref.is_empty() {
                    return Err(invalid("Withdrawal requires a transaction signature"));
                }
                Self::EmergencyWithdrawal {
                    target_user_id,
                    amount: data.amount,
                    settlement_ref,
                }
            }
            ProposalKind::ExtendPool => {
                let data: ExtendData = payload(proposal, "pool extension")?;
                Self::ExtendPool {
                    new_end_date: data.new_end_date,
                }
            }
            ProposalKind::RemoveMember => Self::RemoveMember {
                target_user_id: target(proposal, "member removal")?,
            },
            ProposalKind::ChangeRules => {
                let patch: RulePatch = payload(proposal, "rule change")?;
                if let Some(amount) = patch.contribution_amount
                    && (amount <= Decimal::ZERO || amount > MAX_AMOUNT)
                {
                    return Err(invalid(format!(
                        "Contribution amount must be greater than zero and at most {MAX_AMOUNT}"
                    )));
                }
                if let Some(f) = &patch.frequency {
                    schedule::parse_frequency(f)?;
                }
                Self::ChangeRules(patch)
            }
        })
    }

    /// Apply the action to a locked aggregate
    pub fn apply(
        &self,
        agg: &mut PoolAggregate,
        now: DateTime<Utc>,
        payout_id: i64,
        changes: &mut Changeset,
    ) -> Result<(), AppError> {
        if agg.pool.status.is_terminal() {
            return Err(AppError::new(ErrorCode::PoolClosed));
        }

        match self {
            Self::PayoutOrder(order) => reorder(agg, order)?,
            Self::EmergencyWithdrawal {
                target_user_id,
                amount,
                settlement_ref,
            } => {
                if agg.active_member(target_user_id).is_none() {
                    return Err(AppError::new(ErrorCode::MemberNotFound));
                }
                changes.payouts.push(Payout {
                    id: payout_id,
                    pool_id: agg.pool.id,
                    recipient_id: target_user_id.clone(),
                    amount: *amount,
                    settlement_ref: settlement_ref.clone(),
                    status: SettlementStatus::Confirmed,
                    kind: PayoutKind::EmergencyWithdrawal,
                    cycle: agg.pool.current_cycle,
                    payout_date: now,
                });
            }
            Self::ExtendPool { new_end_date } => {
                if *new_end_date <= agg.pool.end_date {
                    return Err(invalid("New end date must be after the current end date"));
                }
                agg.pool.end_date = *new_end_date;
            }
            Self::RemoveMember { target_user_id } => remove_member(agg, target_user_id)?,
            Self::ChangeRules(patch) => {
                if let Some(amount) = patch.contribution_amount {
                    agg.pool.contribution_amount = amount;
                }
                if let Some(f) = &patch.frequency {
                    agg.pool.frequency = schedule::parse_frequency(f)?;
                }
                if let Some(y) = patch.yield_enabled {
                    agg.pool.yield_enabled = y;
                }
            }
        }
        agg.pool.updated_at = now;
        Ok(())
    }
}

fn reorder(agg: &mut PoolAggregate, order: &[PositionAssignment]) -> Result<(), AppError> {
    let total = agg.pool.total_members;
    for item in order {
        if !(1..=total).contains(&item.position) {
            return Err(invalid(format!(
                "Position {} is outside 1..={total}",
                item.position
            )));
        }
        let member = agg
            .member_mut(&item.user_id)
            .filter(|m| m.is_active())
            .ok_or_else(|| {
                AppError::with_message(
                    ErrorCode::MemberNotFound,
                    format!("{} is not an active member", item.user_id),
                )
            })?;
        member.position = item.position;
    }
    let mut positions: Vec<i32> = agg.active_by_position().iter().map(|m| m.position).collect();
    positions.dedup();
    if positions.len() != agg.active_by_position().len() {
        return Err(invalid("New payout order assigns one position to two members"));
    }
    Ok(())
}

/// Soft-remove a member and hand their payout turn on if it was theirs
fn remove_member(agg: &mut PoolAggregate, target_user_id: &str) -> Result<(), AppError> {
    if target_user_id == agg.pool.creator_id {
        return Err(AppError::new(ErrorCode::CreatorNotRemovable));
    }
    let member = agg
        .member_mut(target_user_id)
        .filter(|m| m.is_active())
        .ok_or_else(|| AppError::new(ErrorCode::MemberNotFound))?;
    member.status = MemberStatus::Removed;
    agg.pool.current_members -= 1;

    if agg.pool.next_payout_member_id.as_deref() == Some(target_user_id) {
        let next = agg.successor_of(target_user_id).map(|m| m.user_id.clone());
        if next.is_none() && agg.pool.status == PoolStatus::Active {
            agg.pool.status = PoolStatus::Completed;
            tracing::info!(pool_id = agg.pool.id, "No unpaid members remain, pool completed");
        }
        agg.pool.next_payout_member_id = next;
    }
    Ok(())
}
