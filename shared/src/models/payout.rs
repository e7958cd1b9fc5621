//! Payout Model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::SettlementStatus;

/// Regular rotation payout or governance-approved withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutKind {
    Rotation,
    EmergencyWithdrawal,
}

impl PayoutKind {
    /// Parse from database string value (snake_case)
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "rotation" => Some(Self::Rotation),
            "emergency_withdrawal" => Some(Self::EmergencyWithdrawal),
            _ => None,
        }
    }

    /// Database string representation (snake_case)
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Rotation => "rotation",
            Self::EmergencyWithdrawal => "emergency_withdrawal",
        }
    }
}

/// One disbursement from a pool to a member; immutable
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Payout {
    pub id: i64,
    pub pool_id: i64,
    pub recipient_id: String,
    pub amount: Decimal,
    pub settlement_ref: String,
    pub status: SettlementStatus,
    pub kind: PayoutKind,
    pub cycle: i32,
    pub payout_date: DateTime<Utc>,
}

/// Payout request; without a signature the server answers with transfer parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRequest {
    pub transaction_signature: Option<String>,
    /// Ask the server to sign and submit the transfer itself
    #[serde(default)]
    pub server_signed: bool,
}

/// Payout finalization payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutConfirm {
    pub transaction_signature: String,
}

/// Transfer the creator has to sign to pay the current recipient
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutQuote {
    pub transfer: super::TransferInstruction,
    pub recipient_id: String,
    pub cycle: i32,
    /// Escrow balance read from the payment rail
    pub pool_balance: Decimal,
}

/// Result of a finalized payout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutReceipt {
    pub pool: super::Pool,
    pub payout: Payout,
    pub payout_amount: Decimal,
    pub transaction_signature: String,
}
