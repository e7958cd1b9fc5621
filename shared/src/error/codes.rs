//! Unified error codes for the ajo service
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 3xxx: Pool errors
//! - 4xxx: Membership and contribution errors
//! - 5xxx: Settlement errors
//! - 6xxx: Governance errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values so clients can branch on
/// them without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format
    InvalidFormat = 6,
    /// Required field missing
    RequiredField = 7,
    /// Value out of range
    ValueOutOfRange = 8,

    // ==================== 1xxx: Auth ====================
    /// User is not authenticated
    NotAuthenticated = 1001,
    /// Token has expired
    TokenExpired = 1003,
    /// Token is invalid
    TokenInvalid = 1004,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,
    /// Admin role required
    AdminRequired = 2003,
    /// Only the pool creator may do this
    NotPoolCreator = 2101,
    /// Caller is not an active member of the pool
    NotPoolMember = 2102,
    /// Pool terms are locked because other members joined
    PoolLocked = 2103,
    /// Premium status required
    PremiumRequired = 2104,

    // ==================== 3xxx: Pool ====================
    /// Pool not found
    PoolNotFound = 3001,
    /// Pool has reached its member capacity
    PoolFull = 3002,
    /// Pool is not in the active state
    PoolNotActive = 3003,
    /// Pool is completed or cancelled
    PoolClosed = 3004,
    /// Pool terms are invalid
    InvalidPoolTerms = 3005,
    /// Unknown contribution frequency
    InvalidFrequency = 3006,
    /// No active member is left to receive a payout
    NoEligibleRecipient = 3007,

    // ==================== 4xxx: Membership ====================
    /// Member not found
    MemberNotFound = 4001,
    /// User is already a member of the pool
    MemberExists = 4002,
    /// Requested payout position is taken
    PositionTaken = 4003,
    /// Member already contributed for the current cycle
    ContributionAlreadyMade = 4004,
    /// Settlement reference was already recorded
    DuplicateSettlement = 4005,
    /// Member has been removed from the pool
    MemberRemoved = 4006,
    /// The pool creator cannot be removed
    CreatorNotRemovable = 4007,
    /// User not found
    UserNotFound = 4008,

    // ==================== 5xxx: Settlement ====================
    /// Transfer did not verify on the payment rail
    SettlementVerificationFailed = 5001,
    /// Verified transfer amount or destination does not match
    SettlementAmountMismatch = 5002,
    /// Pool balance is below the expected payout
    InsufficientPoolBalance = 5003,
    /// Transfer confirmation did not arrive in time
    ConfirmationTimeout = 5004,
    /// Payment rail unreachable
    PaymentRailUnavailable = 5005,
    /// Server-side signing is not configured
    SigningUnavailable = 5006,

    // ==================== 6xxx: Governance ====================
    /// Proposal not found
    ProposalNotFound = 6001,
    /// Proposal is no longer open for voting
    ProposalClosed = 6002,
    /// Proposal voting window has not ended
    ProposalNotEnded = 6003,
    /// Proposal already reached a terminal status
    ProposalAlreadyFinalized = 6004,
    /// Proposal type is not supported
    UnsupportedProposalType = 6005,
    /// Vote choice is invalid
    InvalidVote = 6006,
    /// Proposal execution payload is malformed
    InvalidExecutionData = 6007,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Configuration error
    ConfigError = 9003,
    /// Network error
    NetworkError = 9004,
    /// Timeout error
    TimeoutError = 9005,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::RequiredField => "Required field is missing",
            ErrorCode::ValueOutOfRange => "Value is out of range",

            // Auth
            ErrorCode::NotAuthenticated => "User is not authenticated",
            ErrorCode::TokenExpired => "Token has expired",
            ErrorCode::TokenInvalid => "Token is invalid",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",
            ErrorCode::AdminRequired => "Admin role required",
            ErrorCode::NotPoolCreator => "Only the pool creator can perform this action",
            ErrorCode::NotPoolMember => "You are not a member of this pool",
            ErrorCode::PoolLocked => "Pool terms are locked once other members have joined",
            ErrorCode::PremiumRequired => "Premium status required",

            // Pool
            ErrorCode::PoolNotFound => "Pool not found",
            ErrorCode::PoolFull => "Pool is full",
            ErrorCode::PoolNotActive => "Pool is not active",
            ErrorCode::PoolClosed => "Pool is closed",
            ErrorCode::InvalidPoolTerms => "Invalid pool terms",
            ErrorCode::InvalidFrequency => "Invalid contribution frequency",
            ErrorCode::NoEligibleRecipient => "No eligible payout recipient",

            // Membership
            ErrorCode::MemberNotFound => "Member not found",
            ErrorCode::MemberExists => "Already a member of this pool",
            ErrorCode::PositionTaken => "Payout position is already taken",
            ErrorCode::ContributionAlreadyMade => "Contribution already made for this cycle",
            ErrorCode::DuplicateSettlement => "Settlement reference already recorded",
            ErrorCode::MemberRemoved => "Member has been removed from the pool",
            ErrorCode::CreatorNotRemovable => "The pool creator cannot be removed",
            ErrorCode::UserNotFound => "User not found",

            // Settlement
            ErrorCode::SettlementVerificationFailed => "Transaction verification failed",
            ErrorCode::SettlementAmountMismatch => "Transaction does not match the expected transfer",
            ErrorCode::InsufficientPoolBalance => "Insufficient pool balance",
            ErrorCode::ConfirmationTimeout => "Transaction confirmation timed out",
            ErrorCode::PaymentRailUnavailable => "Payment rail unavailable",
            ErrorCode::SigningUnavailable => "Server-side signing is not configured",

            // Governance
            ErrorCode::ProposalNotFound => "Proposal not found",
            ErrorCode::ProposalClosed => "Proposal is no longer active",
            ErrorCode::ProposalNotEnded => "Voting period has not ended",
            ErrorCode::ProposalAlreadyFinalized => "Proposal has already been finalized",
            ErrorCode::UnsupportedProposalType => "Unsupported proposal type",
            ErrorCode::InvalidVote => "Invalid vote",
            ErrorCode::InvalidExecutionData => "Invalid proposal execution data",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::NetworkError => "Network error",
            ErrorCode::TimeoutError => "Operation timed out",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::InvalidFormat),
            7 => Ok(ErrorCode::RequiredField),
            8 => Ok(ErrorCode::ValueOutOfRange),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1003 => Ok(ErrorCode::TokenExpired),
            1004 => Ok(ErrorCode::TokenInvalid),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),
            2003 => Ok(ErrorCode::AdminRequired),
            2101 => Ok(ErrorCode::NotPoolCreator),
            2102 => Ok(ErrorCode::NotPoolMember),
            2103 => Ok(ErrorCode::PoolLocked),
            2104 => Ok(ErrorCode::PremiumRequired),

            // Pool
            3001 => Ok(ErrorCode::PoolNotFound),
            3002 => Ok(ErrorCode::PoolFull),
            3003 => Ok(ErrorCode::PoolNotActive),
            3004 => Ok(ErrorCode::PoolClosed),
            3005 => Ok(ErrorCode::InvalidPoolTerms),
            3006 => Ok(ErrorCode::InvalidFrequency),
            3007 => Ok(ErrorCode::NoEligibleRecipient),

            // Membership
            4001 => Ok(ErrorCode::MemberNotFound),
            4002 => Ok(ErrorCode::MemberExists),
            4003 => Ok(ErrorCode::PositionTaken),
            4004 => Ok(ErrorCode::ContributionAlreadyMade),
            4005 => Ok(ErrorCode::DuplicateSettlement),
            4006 => Ok(ErrorCode::MemberRemoved),
            4007 => Ok(ErrorCode::CreatorNotRemovable),
            4008 => Ok(ErrorCode::UserNotFound),

            // Settlement
            5001 => Ok(ErrorCode::SettlementVerificationFailed),
            5002 => Ok(ErrorCode::SettlementAmountMismatch),
            5003 => Ok(ErrorCode::InsufficientPoolBalance),
            5004 => Ok(ErrorCode::ConfirmationTimeout),
            5005 => Ok(ErrorCode::PaymentRailUnavailable),
            5006 => Ok(ErrorCode::SigningUnavailable),

            // Governance
            6001 => Ok(ErrorCode::ProposalNotFound),
            6002 => Ok(ErrorCode::ProposalClosed),
            6003 => Ok(ErrorCode::ProposalNotEnded),
            6004 => Ok(ErrorCode::ProposalAlreadyFinalized),
            6005 => Ok(ErrorCode::UnsupportedProposalType),
            6006 => Ok(ErrorCode::InvalidVote),
            6007 => Ok(ErrorCode::InvalidExecutionData),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::ConfigError),
            9004 => Ok(ErrorCode::NetworkError),
            9005 => Ok(ErrorCode::TimeoutError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::ValidationFailed.code(), 2);
        assert_eq!(ErrorCode::NotAuthenticated.code(), 1001);
        assert_eq!(ErrorCode::NotPoolMember.code(), 2102);
        assert_eq!(ErrorCode::PoolFull.code(), 3002);
        assert_eq!(ErrorCode::DuplicateSettlement.code(), 4005);
        assert_eq!(ErrorCode::ConfirmationTimeout.code(), 5004);
        assert_eq!(ErrorCode::UnsupportedProposalType.code(), 6005);
        assert_eq!(ErrorCode::InternalError.code(), 9001);
    }

    #[test]
    fn test_is_success() {
        assert!(ErrorCode::Success.is_success());
        assert!(!ErrorCode::PoolNotFound.is_success());
    }

    #[test]
    fn test_try_from_valid() {
        assert_eq!(ErrorCode::try_from(0), Ok(ErrorCode::Success));
        assert_eq!(ErrorCode::try_from(2101), Ok(ErrorCode::NotPoolCreator));
        assert_eq!(ErrorCode::try_from(4003), Ok(ErrorCode::PositionTaken));
        assert_eq!(ErrorCode::try_from(6004), Ok(ErrorCode::ProposalAlreadyFinalized));
    }

    #[test]
    fn test_try_from_invalid() {
        assert_eq!(ErrorCode::try_from(999), Err(InvalidErrorCode(999)));
        assert_eq!(ErrorCode::try_from(7001), Err(InvalidErrorCode(7001)));
    }

    #[test]
    fn test_serde_as_number() {
        let json = serde_json::to_string(&ErrorCode::PoolFull).unwrap();
        assert_eq!(json, "3002");

        let code: ErrorCode = serde_json::from_str("4005").unwrap();
        assert_eq!(code, ErrorCode::DuplicateSettlement);

        let result: Result<ErrorCode, _> = serde_json::from_str("10000");
        assert!(result.is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ErrorCode::PoolNotFound), "3001");
        assert_eq!(
            format!("{}", InvalidErrorCode(999)),
            "invalid error code: 999"
        );
    }
}
