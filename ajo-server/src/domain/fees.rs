//! Platform fee and late penalty calculation
//!
//! All arithmetic is done in `Decimal`; amounts are in the pool's token units.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};
use shared::models::{FeeBreakdown, Pool};

use super::schedule;

/// 0.5% of the contribution
pub const PLATFORM_FEE_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 3);
/// 2% of the contribution
pub const LATE_PENALTY_RATE: Decimal = Decimal::from_parts(2, 0, 0, false, 2);
/// Premium users pay 20% less on fees and penalties
pub const PREMIUM_DISCOUNT: Decimal = Decimal::from_parts(2, 0, 0, false, 1);

fn discounted(base: Decimal, is_premium: bool) -> Decimal {
    if is_premium {
        base * (Decimal::ONE - PREMIUM_DISCOUNT)
    } else {
        base
    }
}

pub fn platform_fee(amount: Decimal, is_premium: bool) -> Decimal {
    discounted(amount * PLATFORM_FEE_RATE, is_premium)
}

pub fn late_penalty(amount: Decimal, is_premium: bool) -> Decimal {
    discounted(amount * LATE_PENALTY_RATE, is_premium)
}

pub fn fee_breakdown(
    amount: Decimal,
    pool: &Pool,
    is_premium: bool,
    contribution_date: DateTime<Utc>,
    grace_period_days: i64,
) -> Result<FeeBreakdown, AppError> {
    let platform_fee = platform_fee(amount, is_premium);
    let is_late = schedule::is_late(contribution_date, pool.next_payout_date, grace_period_days);
    let late_penalty = if is_late {
        late_penalty(amount, is_premium)
    } else {
        Decimal::ZERO
    };
    let total_fees = platform_fee + late_penalty;
    let total_amount = amount.checked_add(total_fees).ok_or_else(|| {
        AppError::with_message(ErrorCode::ValueOutOfRange, "Amount with fees is out of range")
    })?;

    Ok(FeeBreakdown {
        base_amount: amount,
        platform_fee,
        is_late,
        late_penalty,
        total_fees,
        total_amount,
        is_premium,
        premium_discount: if is_premium {
            PREMIUM_DISCOUNT
        } else {
            Decimal::ZERO
        },
    })
}
