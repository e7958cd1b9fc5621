//! Penalty Model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyReason {
    LateContribution,
    MissedContribution,
    Other,
}

impl PenaltyReason {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "late_contribution" => Some(Self::LateContribution),
            "missed_contribution" => Some(Self::MissedContribution),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::LateContribution => "late_contribution",
            Self::MissedContribution => "missed_contribution",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PenaltyStatus {
    Pending,
    Paid,
    Waived,
}

impl PenaltyStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "waived" => Some(Self::Waived),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Waived => "waived",
        }
    }
}

/// Charge against a member; an independent ledger entry, never deducted automatically
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Penalty {
    pub id: i64,
    pub pool_id: i64,
    pub user_id: String,
    pub contribution_id: Option<i64>,
    pub amount: Decimal,
    pub reason: PenaltyReason,
    pub status: PenaltyStatus,
    pub created_at: DateTime<Utc>,
}
