use chrono::{DateTime, Duration, Utc};

use crate::models::attempt::AttemptRecord;

/// Outcome of the eligibility check for a (user, quiz) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownStatus {
    pub can_attempt: bool,
    /// Set whenever a prior attempt exists; callers use it for countdown
    /// messaging even after the window has passed.
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl CooldownStatus {
    pub fn eligible() -> Self {
        Self {
            can_attempt: true,
            next_attempt_at: None,
        }
    }
}

/// Pure eligibility decision: eligible iff no prior attempt exists, or `now`
/// has reached the latest attempt's recorded next-eligible time. The caller
/// is responsible for passing the latest attempt (completion time descending,
/// `_id` descending as tie-break).
pub fn evaluate(latest: Option<&AttemptRecord>, now: DateTime<Utc>) -> CooldownStatus {
    match latest {
        None => CooldownStatus::eligible(),
        Some(attempt) => CooldownStatus {
            can_attempt: now >= attempt.next_attempt_allowed,
            next_attempt_at: Some(attempt.next_attempt_allowed),
        },
    }
}

/// `completed_at + cooldown_hours`; with no cooldown this equals the
/// completion time, i.e. immediate re-eligibility.
pub fn next_attempt_allowed(completed_at: DateTime<Utc>, cooldown_hours: i64) -> DateTime<Utc> {
    completed_at + Duration::hours(cooldown_hours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mongodb::bson::oid::ObjectId;

    fn attempt_with_window(
        completed_at: DateTime<Utc>,
        cooldown_hours: i64,
    ) -> AttemptRecord {
        AttemptRecord {
            id: ObjectId::new(),
            user_id: ObjectId::new(),
            quiz_id: ObjectId::new(),
            answers: vec![],
            score: 80,
            time_spent: 120,
            completed_at,
            next_attempt_allowed: next_attempt_allowed(completed_at, cooldown_hours),
            previous_attempt_id: None,
        }
    }

    #[test]
    fn no_prior_attempt_is_eligible() {
        let status = evaluate(None, Utc::now());
        assert!(status.can_attempt);
        assert!(status.next_attempt_at.is_none());
    }

    #[test]
    fn inside_window_is_blocked() {
        let completed = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let attempt = attempt_with_window(completed, 24);

        let one_hour_later = completed + Duration::hours(1);
        let status = evaluate(Some(&attempt), one_hour_later);
        assert!(!status.can_attempt);
        assert_eq!(status.next_attempt_at, Some(completed + Duration::hours(24)));
    }

    #[test]
    fn exactly_at_window_end_is_eligible() {
        let completed = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let attempt = attempt_with_window(completed, 24);

        let status = evaluate(Some(&attempt), completed + Duration::hours(24));
        assert!(status.can_attempt);
    }

    #[test]
    fn one_second_before_window_end_is_blocked() {
        let completed = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let attempt = attempt_with_window(completed, 24);

        let just_before = completed + Duration::hours(24) - Duration::seconds(1);
        assert!(!evaluate(Some(&attempt), just_before).can_attempt);
    }

    #[test]
    fn zero_cooldown_is_immediately_eligible() {
        let completed = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let attempt = attempt_with_window(completed, 0);

        let status = evaluate(Some(&attempt), completed);
        assert!(status.can_attempt);
        assert_eq!(status.next_attempt_at, Some(completed));
    }

    #[test]
    fn next_attempt_allowed_adds_hours() {
        let completed = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(
            next_attempt_allowed(completed, 24),
            Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()
        );
        assert_eq!(next_attempt_allowed(completed, 0), completed);
    }
}
