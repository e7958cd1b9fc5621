//! Input validation helpers
//!
//! Text length limits for user-supplied fields and the checks applied by
//! the managers before anything touches the store.

use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};

/// Pool names, proposal titles
pub const MAX_NAME_LEN: usize = 200;

/// Pool and proposal descriptions
pub const MAX_DESCRIPTION_LEN: usize = 2000;

/// Token mints, symbols, wallet addresses, transfer signatures
pub const MAX_SHORT_TEXT_LEN: usize = 128;

/// Largest contribution or fee-preview amount, in token units. A payout
/// from a full 100-member pool still fits in `u64` base units at 9 decimals.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);

/// Validate that an amount is positive and no larger than [`MAX_AMOUNT`].
pub fn validate_amount(amount: Decimal, field: &str) -> Result<(), AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::with_message(
            ErrorCode::ValueOutOfRange,
            format!("{field} must be greater than zero"),
        ));
    }
    if amount > MAX_AMOUNT {
        return Err(AppError::with_message(
            ErrorCode::ValueOutOfRange,
            format!("{field} must be at most {MAX_AMOUNT}"),
        ));
    }
    Ok(())
}

/// Validate that a required string is non-empty and within the length limit.
pub fn validate_required_text(value: &str, field: &str, max_len: usize) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::with_message(
            ErrorCode::RequiredField,
            format!("{field} must not be empty"),
        ));
    }
    if value.len() > max_len {
        return Err(AppError::validation(format!(
            "{field} is too long ({} chars, max {max_len})",
            value.len()
        )));
    }
    Ok(())
}

/// Validate that an optional string, if present, is within the length limit.
pub fn validate_optional_text(
    value: &Option<String>,
    field: &str,
    max_len: usize,
) -> Result<(), AppError> {
    if let Some(v) = value
        && v.len() > max_len
    {
        return Err(AppError::validation(format!(
            "{field} is too long ({} chars, max {max_len})",
            v.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_text() {
        assert!(validate_required_text("Lagos Circle", "name", MAX_NAME_LEN).is_ok());
        let err = validate_required_text("   ", "name", MAX_NAME_LEN).unwrap_err();
        assert_eq!(err.code, ErrorCode::RequiredField);
        let err = validate_required_text(&"x".repeat(201), "name", MAX_NAME_LEN).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[test]
    fn amount_bounds() {
        assert!(validate_amount(Decimal::ONE, "amount").is_ok());
        assert!(validate_amount(MAX_AMOUNT, "amount").is_ok());
        for bad in [Decimal::ZERO, -Decimal::ONE, MAX_AMOUNT + Decimal::ONE, Decimal::MAX] {
            let err = validate_amount(bad, "amount").unwrap_err();
            assert_eq!(err.code, ErrorCode::ValueOutOfRange);
        }
    }

    #[test]
    fn optional_text() {
        assert!(validate_optional_text(&None, "description", 3).is_ok());
        assert!(validate_optional_text(&Some("abc".into()), "description", 3).is_ok());
        assert!(validate_optional_text(&Some("abcd".into()), "description", 3).is_err());
    }
}
