//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Success
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::NotFound
            | Self::PoolNotFound
            | Self::MemberNotFound
            | Self::UserNotFound
            | Self::ProposalNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict (re-read state before retrying)
            Self::AlreadyExists
            | Self::PoolFull
            | Self::PoolNotActive
            | Self::PoolClosed
            | Self::MemberExists
            | Self::PositionTaken
            | Self::ContributionAlreadyMade
            | Self::DuplicateSettlement
            | Self::ProposalAlreadyFinalized => StatusCode::CONFLICT,

            // 401 Unauthorized
            Self::NotAuthenticated | Self::TokenExpired | Self::TokenInvalid => {
                StatusCode::UNAUTHORIZED
            }

            // 403 Forbidden
            Self::PermissionDenied
            | Self::AdminRequired
            | Self::NotPoolCreator
            | Self::NotPoolMember
            | Self::PoolLocked
            | Self::PremiumRequired
            | Self::MemberRemoved => StatusCode::FORBIDDEN,

            // 402 Payment Required
            Self::InsufficientPoolBalance => StatusCode::PAYMENT_REQUIRED,

            // 503 Service Unavailable (outcome unknown or transient, client can retry)
            Self::ConfirmationTimeout
            | Self::PaymentRailUnavailable
            | Self::SigningUnavailable
            | Self::NetworkError
            | Self::TimeoutError => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            Self::Unknown | Self::InternalError | Self::DatabaseError | Self::ConfigError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            // 400 Bad Request (default for validation/business errors)
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_status() {
        assert_eq!(ErrorCode::PoolNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::ProposalNotFound.http_status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_conflict_status() {
        assert_eq!(ErrorCode::PoolFull.http_status(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::MemberExists.http_status(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::DuplicateSettlement.http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ErrorCode::ProposalAlreadyFinalized.http_status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_auth_and_permission_status() {
        assert_eq!(
            ErrorCode::NotAuthenticated.http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ErrorCode::NotPoolMember.http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ErrorCode::PoolLocked.http_status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_settlement_status() {
        assert_eq!(
            ErrorCode::SettlementVerificationFailed.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::InsufficientPoolBalance.http_status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ErrorCode::ConfirmationTimeout.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_bad_request_default() {
        assert_eq!(
            ErrorCode::ValidationFailed.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ErrorCode::InvalidVote.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorCode::ProposalClosed.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::DatabaseError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
