//! Error category classification

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// Error category classification based on error code ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// General errors (0xxx)
    General,
    /// Authentication errors (1xxx)
    Auth,
    /// Permission errors (2xxx)
    Permission,
    /// Pool errors (3xxx)
    Pool,
    /// Membership and contribution errors (4xxx)
    Membership,
    /// Settlement errors (5xxx)
    Settlement,
    /// Governance errors (6xxx)
    Governance,
    /// System errors (9xxx)
    System,
}

impl ErrorCategory {
    /// Determine category from error code value
    pub fn from_code(code: u16) -> Self {
        match code {
            0..1000 => Self::General,
            1000..2000 => Self::Auth,
            2000..3000 => Self::Permission,
            3000..4000 => Self::Pool,
            4000..5000 => Self::Membership,
            5000..6000 => Self::Settlement,
            6000..7000 => Self::Governance,
            _ => Self::System,
        }
    }

    /// Get the string name for this category
    pub fn name(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::Pool => "pool",
            Self::Membership => "membership",
            Self::Settlement => "settlement",
            Self::Governance => "governance",
            Self::System => "system",
        }
    }
}

impl ErrorCode {
    /// Get the category for this error code
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_code() {
        assert_eq!(ErrorCategory::from_code(0), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(999), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(1001), ErrorCategory::Auth);
        assert_eq!(ErrorCategory::from_code(2102), ErrorCategory::Permission);
        assert_eq!(ErrorCategory::from_code(3001), ErrorCategory::Pool);
        assert_eq!(ErrorCategory::from_code(4005), ErrorCategory::Membership);
        assert_eq!(ErrorCategory::from_code(5004), ErrorCategory::Settlement);
        assert_eq!(ErrorCategory::from_code(6001), ErrorCategory::Governance);
        assert_eq!(ErrorCategory::from_code(9001), ErrorCategory::System);
        assert_eq!(ErrorCategory::from_code(10000), ErrorCategory::System);
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::PoolFull.category(), ErrorCategory::Pool);
        assert_eq!(
            ErrorCode::ContributionAlreadyMade.category(),
            ErrorCategory::Membership
        );
        assert_eq!(
            ErrorCode::ProposalClosed.category(),
            ErrorCategory::Governance
        );
        assert_eq!(ErrorCode::DatabaseError.category(), ErrorCategory::System);
    }

    #[test]
    fn test_category_serialize() {
        let json = serde_json::to_string(&ErrorCategory::Settlement).unwrap();
        assert_eq!(json, "\"settlement\"");
        assert_eq!(ErrorCategory::Governance.name(), "governance");
    }
}
