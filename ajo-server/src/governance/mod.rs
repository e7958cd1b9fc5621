//! Governance Manager
//!
//! Members open proposals and vote on them; once voting ends the pool
//! creator executes the proposal. Execution tallies the votes and either
//! rejects the proposal or applies its action, in both cases moving the
//! proposal out of `active` in the same transaction as the pool change.

mod actions;

use std::sync::Arc;

use chrono::Duration;
use shared::error::{AppError, ErrorCode};
use shared::models::{
    ExecutionResult, Proposal, ProposalCreate, ProposalStatus, ProposalWithTally, Vote,
    VoteCast, VoteChoice, VoteTally,
};
use shared::util::snowflake_id;

use crate::domain::{Clock, PoolAggregate, access};
use crate::error::ServiceResult;
use crate::lifecycle::pool_not_found;
use crate::settlement::{ExpectedTransfer, Settlement};
use crate::store::{LedgerStore, ProposalTransition, Store};
use crate::validation::{
    MAX_DESCRIPTION_LEN, MAX_NAME_LEN, MAX_SHORT_TEXT_LEN, validate_required_text,
};

pub use actions::{PositionAssignment, ProposalAction, RulePatch};

/// Longest voting window a proposal may ask for
pub const MAX_VOTING_DAYS: i64 = 90;

pub struct GovernanceManager {
    store: Arc<Store>,
    settlement: Settlement,
    clock: Arc<dyn Clock>,
}

fn proposal_not_found(proposal_id: i64) -> AppError {
    AppError::with_message(
        ErrorCode::ProposalNotFound,
        format!("Proposal {proposal_id} not found"),
    )
}

impl GovernanceManager {
    pub fn new(store: Arc<Store>, settlement: Settlement, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            settlement,
            clock,
        }
    }

    async fn load_pool(&self, pool_id: i64) -> ServiceResult<PoolAggregate> {
        self.store
            .load_pool(pool_id)
            .await?
            .ok_or_else(|| pool_not_found(pool_id))
    }

    async fn load_proposal(&self, proposal_id: i64) -> ServiceResult<Proposal> {
        Ok(self
            .store
            .get_proposal(proposal_id)
            .await?
            .ok_or_else(|| proposal_not_found(proposal_id))?)
    }

    async fn tally(&self, proposal_id: i64) -> ServiceResult<VoteTally> {
        let votes = self.store.votes(proposal_id).await?;
        Ok(VoteTally::from_votes(&votes))
    }

    pub async fn create_proposal(
        &self,
        pool_id: i64,
        proposer_id: &str,
        req: ProposalCreate,
    ) -> ServiceResult<Proposal> {
        validate_required_text(&req.title, "title", MAX_NAME_LEN)?;
        validate_required_text(&req.kind, "type", MAX_SHORT_TEXT_LEN)?;
        if req.description.len() > MAX_DESCRIPTION_LEN {
            return Err(AppError::validation(format!(
                "description must be at most {MAX_DESCRIPTION_LEN} characters"
            ))
            .into());
        }
        if !(1..=MAX_VOTING_DAYS).contains(&req.duration_days) {
            return Err(AppError::with_message(
                ErrorCode::ValueOutOfRange,
                format!("Voting duration must be between 1 and {MAX_VOTING_DAYS} days"),
            )
            .into());
        }

        let agg = self.load_pool(pool_id).await?;
        if !access::can_create_proposal(Some(proposer_id), &agg) {
            return Err(AppError::with_message(
                ErrorCode::NotPoolMember,
                "Only pool members can create proposals",
            )
            .into());
        }
        if agg.pool.status.is_terminal() {
            return Err(AppError::new(ErrorCode::PoolClosed).into());
        }

        let now = self.clock.now();
        let proposal = Proposal {
            id: snowflake_id(),
            pool_id,
            proposer_id: proposer_id.to_string(),
            title: req.title.trim().to_string(),
            description: req.description,
            kind: req.kind.trim().to_string(),
            status: ProposalStatus::Active,
            ends_at: now + Duration::days(req.duration_days),
            execution_data: req.execution_data,
            target_user_id: req.target_user_id,
            created_at: now,
            executed_at: None,
        };
        // known types must carry a usable payload; unknown ones fail at execution
        if proposal.parsed_kind().is_some() {
            ProposalAction::parse(&proposal)?;
        }

        self.store.insert_proposal(&proposal).await?;
        tracing::info!(
            pool_id,
            proposal_id = proposal.id,
            proposer_id,
            kind = %proposal.kind,
            "Proposal created"
        );
        Ok(proposal)
    }

    /// Cast or replace the caller's vote; returns the updated tally
    pub async fn vote(
        &self,
        proposal_id: i64,
        user_id: &str,
        cast: VoteCast,
    ) -> ServiceResult<VoteTally> {
        let choice = VoteChoice::from_db(cast.vote.trim()).ok_or_else(|| {
            AppError::with_message(
                ErrorCode::InvalidVote,
                "Vote must be one of yes, no, abstain",
            )
        })?;

        let proposal = self.load_proposal(proposal_id).await?;
        if proposal.status != ProposalStatus::Active {
            return Err(AppError::with_message(
                ErrorCode::ProposalClosed,
                "This proposal is no longer active",
            )
            .into());
        }
        let now = self.clock.now();
        if proposal.ends_at <= now {
            return Err(
                AppError::with_message(ErrorCode::ProposalClosed, "This proposal has ended").into(),
            );
        }

        let agg = self.load_pool(proposal.pool_id).await?;
        if !access::can_vote(Some(user_id), &agg) {
            return Err(AppError::with_message(
                ErrorCode::NotPoolMember,
                "Only pool members can vote",
            )
            .into());
        }

        self.store
            .upsert_vote(&Vote {
                proposal_id,
                user_id: user_id.to_string(),
                vote: choice,
                created_at: now,
            })
            .await?;
        tracing::debug!(proposal_id, user_id, vote = choice.as_db(), "Vote recorded");
        self.tally(proposal_id).await
    }

    /// Tally an ended proposal and apply it if it passed
    pub async fn execute_proposal(
        &self,
        proposal_id: i64,
        executor_id: &str,
    ) -> ServiceResult<ExecutionResult> {
        let proposal = self.load_proposal(proposal_id).await?;
        let agg = self.load_pool(proposal.pool_id).await?;
        if !access::is_creator(Some(executor_id), &agg) {
            return Err(AppError::with_message(
                ErrorCode::NotPoolCreator,
                "Only the pool creator can execute proposals",
            )
            .into());
        }
        if proposal.status.is_terminal() {
            return Err(AppError::with_message(
                ErrorCode::ProposalAlreadyFinalized,
                format!("Proposal is already {}", proposal.status.as_db()),
            )
            .into());
        }
        let now = self.clock.now();
        if proposal.ends_at > now {
            return Err(AppError::new(ErrorCode::ProposalNotEnded).into());
        }

        let tally = self.tally(proposal_id).await?;
        let pool_id = proposal.pool_id;

        if !tally.passed() {
            self.store
                .apply(pool_id, |_, changes| {
                    changes.proposal = Some(ProposalTransition {
                        proposal_id,
                        to: ProposalStatus::Rejected,
                        at: now,
                    });
                    Ok(())
                })
                .await?;
            tracing::info!(pool_id, proposal_id, yes = tally.yes, no = tally.no, "Proposal rejected");
            return Ok(ExecutionResult {
                proposal_id,
                passed: false,
                status: ProposalStatus::Rejected,
                tally,
            });
        }

        let action = ProposalAction::parse(&proposal)?;
        if let ProposalAction::EmergencyWithdrawal {
            target_user_id,
            amount,
            settlement_ref,
        } = &action
        {
            self.verify_withdrawal(&agg, target_user_id, *amount, settlement_ref)
                .await?;
        }

        let payout_id = snowflake_id();
        let result = self
            .store
            .apply(pool_id, |agg, changes| {
                action.apply(agg, now, payout_id, changes)?;
                changes.proposal = Some(ProposalTransition {
                    proposal_id,
                    to: ProposalStatus::Executed,
                    at: now,
                });
                Ok(())
            })
            .await;
        if let Err(e) = result {
            if let ProposalAction::EmergencyWithdrawal { settlement_ref, .. } = &action {
                tracing::error!(
                    settlement_ref = %settlement_ref,
                    pool_id,
                    proposal_id,
                    error = %e,
                    "Withdrawal transfer verified but not recorded"
                );
            }
            return Err(e);
        }

        tracing::info!(pool_id, proposal_id, kind = %proposal.kind, "Proposal executed");
        Ok(ExecutionResult {
            proposal_id,
            passed: true,
            status: ProposalStatus::Executed,
            tally,
        })
    }

    async fn wallet_of(&self, user_id: &str) -> ServiceResult<Option<String>> {
        Ok(self
            .store
            .get_user(user_id)
            .await?
            .and_then(|u| u.wallet_address))
    }

    /// The withdrawal must already have left the escrow for the target's wallet
    async fn verify_withdrawal(
        &self,
        agg: &PoolAggregate,
        target_user_id: &str,
        amount: rust_decimal::Decimal,
        settlement_ref: &str,
    ) -> ServiceResult<()> {
        if self.store.settlement_recorded(settlement_ref).await? {
            return Err(AppError::with_message(
                ErrorCode::DuplicateSettlement,
                "Transfer has already been recorded",
            )
            .into());
        }
        let wallet = self.wallet_of(target_user_id).await?.ok_or_else(|| {
            AppError::validation(format!("Withdrawal target {target_user_id} has no wallet address"))
        })?;
        // contributions sit in the escrow, or with the creator when there is none
        let holder = match &agg.pool.pool_address {
            Some(escrow) => escrow.clone(),
            None => self.wallet_of(&agg.pool.creator_id).await?.ok_or_else(|| {
                AppError::validation("Pool has no escrow address and the creator has no wallet")
            })?,
        };
        let expected = ExpectedTransfer {
            source: Some(&holder),
            destination: Some(&wallet),
            amount,
        };
        self.settlement.verify(settlement_ref, &expected).await?;
        Ok(())
    }

    /// Withdraw an active proposal; proposer or pool creator only
    pub async fn cancel_proposal(&self, proposal_id: i64, user_id: &str) -> ServiceResult<Proposal> {
        let mut proposal = self.load_proposal(proposal_id).await?;
        let agg = self.load_pool(proposal.pool_id).await?;
        if proposal.proposer_id != user_id && !access::is_creator(Some(user_id), &agg) {
            return Err(AppError::forbidden(
                "Only the proposer or the pool creator can cancel a proposal",
            )
            .into());
        }
        if proposal.status.is_terminal() {
            return Err(AppError::new(ErrorCode::ProposalAlreadyFinalized).into());
        }

        let now = self.clock.now();
        self.store
            .apply(proposal.pool_id, |_, changes| {
                changes.proposal = Some(ProposalTransition {
                    proposal_id,
                    to: ProposalStatus::Cancelled,
                    at: now,
                });
                Ok(())
            })
            .await?;
        tracing::info!(pool_id = proposal.pool_id, proposal_id, user_id, "Proposal cancelled");

        proposal.status = ProposalStatus::Cancelled;
        proposal.executed_at = Some(now);
        Ok(proposal)
    }

    pub async fn list_proposals(&self, pool_id: i64) -> ServiceResult<Vec<ProposalWithTally>> {
        self.load_pool(pool_id).await?;
        let proposals = self.store.list_proposals(pool_id).await?;
        let mut out = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            let tally = self.tally(proposal.id).await?;
            out.push(ProposalWithTally { proposal, tally });
        }
        Ok(out)
    }
}
