//! SLA clock: deadline from priority, live status from (created, deadline, now)
use super::types::TimeStamp;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[n(0)]
    Urgent,
    #[n(1)]
    High,
    #[n(2)]
    Medium,
    #[n(3)]
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaStatus {
    WithinSla,
    AtRisk,
    Breached,
}

/// Remaining time at or below this fraction of the full window is "at risk"
const AT_RISK_NUMERATOR: i64 = 1;
const AT_RISK_DENOMINATOR: i64 = 5;

impl Priority {
    pub fn sla_hours(&self) -> i64 {
        match self {
            Priority::Urgent => 2,
            Priority::High => 8,
            Priority::Medium => 24,
            Priority::Low => 72,
        }
    }

    /// Unrecognised labels fall back to medium
    pub fn parse_lossy(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "urgent" => Priority::Urgent,
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn sla_window(priority: Priority) -> Duration {
    Duration::hours(priority.sla_hours())
}

pub fn calculate_deadline(priority: Priority, created_at: TimeStamp) -> TimeStamp {
    created_at.plus(sla_window(priority))
}

/// Status of a deadline at `now`. The at-risk threshold is measured against the
/// original window (`deadline - created_at`), not against what is left of it.
pub fn check_sla_status(
    created_at: TimeStamp,
    deadline: Option<TimeStamp>,
    now: TimeStamp,
) -> Option<SlaStatus> {
    let deadline = deadline?;
    if now >= deadline {
        return Some(SlaStatus::Breached);
    }

    let window = deadline.since(&created_at).num_milliseconds();
    let remaining = deadline.since(&now).num_milliseconds();
    if remaining * AT_RISK_DENOMINATOR <= window * AT_RISK_NUMERATOR {
        Some(SlaStatus::AtRisk)
    } else {
        Some(SlaStatus::WithinSla)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> TimeStamp {
        TimeStamp::new_with(2026, 9, 1, 8, 0, 0)
    }

    #[test]
    fn deadlines_follow_the_priority_table() {
        assert_eq!(calculate_deadline(Priority::Urgent, t0()), t0().plus(Duration::hours(2)));
        assert_eq!(calculate_deadline(Priority::High, t0()), t0().plus(Duration::hours(8)));
        assert_eq!(calculate_deadline(Priority::Medium, t0()), t0().plus(Duration::hours(24)));
        assert_eq!(calculate_deadline(Priority::Low, t0()), t0().plus(Duration::hours(72)));
    }

    #[test]
    fn unknown_priority_is_medium() {
        assert_eq!(Priority::parse_lossy("whenever"), Priority::Medium);
        assert_eq!(Priority::parse_lossy(" URGENT "), Priority::Urgent);
    }

    #[test]
    fn urgent_ticket_status_over_time() {
        let deadline = calculate_deadline(Priority::Urgent, t0());
        let at = |d: Duration| check_sla_status(t0(), Some(deadline), t0().plus(d));

        assert_eq!(at(Duration::minutes(5)), Some(SlaStatus::WithinSla));
        assert_eq!(at(Duration::minutes(95)), Some(SlaStatus::WithinSla));
        assert_eq!(at(Duration::minutes(96)), Some(SlaStatus::AtRisk));
        assert_eq!(at(Duration::minutes(110)), Some(SlaStatus::AtRisk));
        assert_eq!(at(Duration::hours(2)), Some(SlaStatus::Breached));
        assert_eq!(
            at(Duration::hours(2) + Duration::seconds(1)),
            Some(SlaStatus::Breached)
        );
    }

    #[test]
    fn no_deadline_no_status() {
        assert_eq!(check_sla_status(t0(), None, t0()), None);
    }
}
