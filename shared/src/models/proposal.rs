//! Proposal and Vote Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Governance proposal types understood by the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    PayoutOrder,
    EmergencyWithdrawal,
    ExtendPool,
    RemoveMember,
    ChangeRules,
}

impl ProposalKind {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "payout_order" => Some(Self::PayoutOrder),
            "emergency_withdrawal" => Some(Self::EmergencyWithdrawal),
            "extend_pool" => Some(Self::ExtendPool),
            "remove_member" => Some(Self::RemoveMember),
            "change_rules" => Some(Self::ChangeRules),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::PayoutOrder => "payout_order",
            Self::EmergencyWithdrawal => "emergency_withdrawal",
            Self::ExtendPool => "extend_pool",
            Self::RemoveMember => "remove_member",
            Self::ChangeRules => "change_rules",
        }
    }
}

/// `active -> executed | rejected | cancelled`; terminal states are final
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Active,
    Executed,
    Rejected,
    Cancelled,
}

impl ProposalStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "executed" => Some(Self::Executed),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Executed => "executed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Governance item scoped to a pool
///
/// `kind` keeps the raw type string so that proposals of an unknown
/// type survive a round trip and fail only at execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: i64,
    pub pool_id: i64,
    pub proposer_id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: ProposalStatus,
    pub ends_at: DateTime<Utc>,
    pub execution_data: serde_json::Value,
    pub target_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl Proposal {
    pub fn parsed_kind(&self) -> Option<ProposalKind> {
        ProposalKind::from_db(&self.kind)
    }
}

/// Create proposal payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalCreate {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub duration_days: i64,
    #[serde(default)]
    pub execution_data: serde_json::Value,
    pub target_user_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    Yes,
    No,
    Abstain,
}

impl VoteChoice {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "yes" => Some(Self::Yes),
            "no" => Some(Self::No),
            "abstain" => Some(Self::Abstain),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Abstain => "abstain",
        }
    }
}

/// One (proposal, user) vote; re-voting overwrites
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub proposal_id: i64,
    pub user_id: String,
    pub vote: VoteChoice,
    pub created_at: DateTime<Utc>,
}

/// Vote payload; the choice stays a string so a bad value is a 400, not a 422
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteCast {
    pub vote: String,
}

/// Vote counts for a proposal
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VoteTally {
    pub yes: u32,
    pub no: u32,
    pub abstain: u32,
}

impl VoteTally {
    pub fn from_votes<'a>(votes: impl IntoIterator<Item = &'a Vote>) -> Self {
        let mut tally = Self::default();
        for v in votes {
            match v.vote {
                VoteChoice::Yes => tally.yes += 1,
                VoteChoice::No => tally.no += 1,
                VoteChoice::Abstain => tally.abstain += 1,
            }
        }
        tally
    }

    pub fn total(&self) -> u32 {
        self.yes + self.no + self.abstain
    }

    /// Simple plurality: more yes than no, with at least one vote cast
    pub fn passed(&self) -> bool {
        self.yes > self.no && self.total() > 0
    }
}

/// Proposal with its current vote counts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalWithTally {
    #[serde(flatten)]
    pub proposal: Proposal,
    pub tally: VoteTally,
}

/// Outcome of a proposal execution attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub proposal_id: i64,
    pub passed: bool,
    pub status: ProposalStatus,
    pub tally: VoteTally,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(yes: u32, no: u32, abstain: u32) -> VoteTally {
        VoteTally { yes, no, abstain }
    }

    #[test]
    fn test_tally_rule() {
        assert!(tally(3, 2, 1).passed());
        assert!(!tally(2, 2, 0).passed());
        assert!(!tally(0, 0, 0).passed());
        assert!(!tally(0, 0, 4).passed());
        assert!(tally(1, 0, 5).passed());
    }

    #[test]
    fn test_tally_from_votes() {
        let now = Utc::now();
        let votes: Vec<Vote> = ["yes", "no", "yes", "abstain"]
            .iter()
            .enumerate()
            .map(|(i, c)| Vote {
                proposal_id: 1,
                user_id: format!("u{i}"),
                vote: VoteChoice::from_db(c).unwrap(),
                created_at: now,
            })
            .collect();
        assert_eq!(VoteTally::from_votes(&votes), tally(2, 1, 1));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(
            ProposalKind::from_db("remove_member"),
            Some(ProposalKind::RemoveMember)
        );
        assert_eq!(ProposalKind::from_db("dissolve_pool"), None);
        assert!(ProposalStatus::Rejected.is_terminal());
        assert!(!ProposalStatus::Active.is_terminal());
    }
}
