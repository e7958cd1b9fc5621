//! Contribution Model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::SettlementStatus;

/// One payment into a pool for a cycle; immutable once confirmed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub id: i64,
    pub pool_id: i64,
    pub user_id: String,
    pub amount: Decimal,
    pub token: String,
    pub token_symbol: String,
    pub settlement_ref: String,
    pub status: SettlementStatus,
    pub is_late: bool,
    pub penalty_amount: Option<Decimal>,
    pub cycle: i32,
    pub created_at: DateTime<Utc>,
}

/// Record contribution payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionCreate {
    pub amount: Decimal,
    /// Transfer signature on the payment rail
    pub transaction_signature: String,
}

/// Transfer parameters returned for the client to sign
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferInstruction {
    pub from: Option<String>,
    pub to: String,
    pub amount: Decimal,
    pub token: String,
    pub token_symbol: String,
}

/// Fee and penalty preview for one contribution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    pub base_amount: Decimal,
    pub platform_fee: Decimal,
    pub is_late: bool,
    pub late_penalty: Decimal,
    pub total_fees: Decimal,
    pub total_amount: Decimal,
    pub is_premium: bool,
    pub premium_discount: Decimal,
}

/// What a member has to send to contribute for the current cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionQuote {
    pub transfer: TransferInstruction,
    pub fees: FeeBreakdown,
    pub cycle: i32,
}
