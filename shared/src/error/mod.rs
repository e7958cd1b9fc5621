//! Unified error system for the ajo service
//!
//! This module provides:
//! - [`ErrorCode`]: Standardized error codes for all error types
//! - [`ErrorCategory`]: Classification of errors by domain
//! - [`AppError`]: Error type with code, message, and details
//! - [`ErrorBody`]: The JSON shape of a failed response
//!
//! # Error Code Ranges
//!
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 3xxx: Pool errors
//! - 4xxx: Membership and contribution errors
//! - 5xxx: Settlement errors
//! - 6xxx: Governance errors
//! - 9xxx: System errors
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorCode};
//!
//! let err = AppError::new(ErrorCode::PoolFull);
//! assert_eq!(err.http_status(), http::StatusCode::CONFLICT);
//!
//! let err = AppError::with_message(ErrorCode::SettlementVerificationFailed, "not confirmed")
//!     .with_details("signature has no status");
//! assert!(err.details.is_some());
//! ```

mod category;
mod codes;
mod http;
mod types;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{AppError, AppResult, ErrorBody};
