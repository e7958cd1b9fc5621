//! Payout scheduling and lateness

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::models::Frequency;

/// Default grace window before the payout date
pub const DEFAULT_GRACE_PERIOD_DAYS: i64 = 3;

/// Parse a frequency from client input
pub fn parse_frequency(s: &str) -> Result<Frequency, AppError> {
    Frequency::from_db(s).ok_or_else(|| {
        AppError::with_message(
            ErrorCode::InvalidFrequency,
            format!("Invalid frequency: {s}"),
        )
    })
}

/// `start + position * period`, where a monthly period is one calendar month
pub fn next_payout_date(
    start: DateTime<Utc>,
    frequency: Frequency,
    position: i32,
) -> DateTime<Utc> {
    let n = i64::from(position.max(0));
    match frequency {
        Frequency::Daily => start + Duration::days(n),
        Frequency::Weekly => start + Duration::days(7 * n),
        Frequency::Biweekly => start + Duration::days(14 * n),
        Frequency::Monthly => start + Months::new(n as u32),
    }
}

/// Late once `now` passes `next_payout - grace`; the boundary itself is on time
pub fn is_late(now: DateTime<Utc>, next_payout: DateTime<Utc>, grace_period_days: i64) -> bool {
    now > next_payout - Duration::days(grace_period_days)
}

/// How the next payout date is chosen after a payout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutAnchor {
    /// One period after the moment the payout executed
    #[default]
    Rolling,
    /// Fixed multiples of the pool start date
    Schedule,
}

impl PayoutAnchor {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rolling" => Some(Self::Rolling),
            "schedule" => Some(Self::Schedule),
            _ => None,
        }
    }

    /// Next payout date once `paid_cycle` has been paid out
    pub fn advance(
        &self,
        now: DateTime<Utc>,
        start: DateTime<Utc>,
        frequency: Frequency,
        paid_cycle: i32,
    ) -> DateTime<Utc> {
        match self {
            Self::Rolling => next_payout_date(now, frequency, 1),
            Self::Schedule => next_payout_date(start, frequency, paid_cycle + 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn next_payout_scales_with_position() {
        let start = t(2025, 1, 1);
        assert_eq!(next_payout_date(start, Frequency::Daily, 3), t(2025, 1, 4));
        assert_eq!(next_payout_date(start, Frequency::Weekly, 1), t(2025, 1, 8));
        assert_eq!(next_payout_date(start, Frequency::Biweekly, 2), t(2025, 1, 29));
        assert_eq!(next_payout_date(start, Frequency::Monthly, 0), start);
    }

    #[test]
    fn monthly_uses_calendar_months() {
        let start = t(2025, 1, 31);
        // clamps to the last day of February
        assert_eq!(next_payout_date(start, Frequency::Monthly, 1), t(2025, 2, 28));
        assert_eq!(next_payout_date(start, Frequency::Monthly, 3), t(2025, 4, 30));
        assert_eq!(next_payout_date(start, Frequency::Monthly, 12), t(2026, 1, 31));
    }

    #[test]
    fn lateness_window() {
        let due = t(2025, 3, 10);
        let grace = DEFAULT_GRACE_PERIOD_DAYS;
        assert!(is_late(due - Duration::days(2), due, grace));
        assert!(is_late(due + Duration::days(10), due, grace));
        assert!(!is_late(due - Duration::days(4), due, grace));
        assert!(!is_late(due - Duration::days(3), due, grace));
        assert!(is_late(due - Duration::days(3) + Duration::seconds(1), due, grace));
    }

    #[test]
    fn parse_frequency_rejects_unknown() {
        assert_eq!(parse_frequency("weekly").unwrap(), Frequency::Weekly);
        let err = parse_frequency("fortnightly").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFrequency);
    }

    #[test]
    fn anchors() {
        let start = t(2025, 1, 1);
        let now = t(2025, 1, 20);
        assert_eq!(
            PayoutAnchor::Rolling.advance(now, start, Frequency::Weekly, 1),
            t(2025, 1, 27)
        );
        assert_eq!(
            PayoutAnchor::Schedule.advance(now, start, Frequency::Weekly, 1),
            t(2025, 1, 15)
        );
        assert_eq!(PayoutAnchor::parse("Schedule"), Some(PayoutAnchor::Schedule));
        assert_eq!(PayoutAnchor::parse("drift"), None);
    }
}
