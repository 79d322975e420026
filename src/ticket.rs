//! Support tickets (IT and facilities) and their lifecycle
use super::sla::{self, Priority, SlaStatus};
use super::types::TimeStamp;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketType {
    #[n(0)]
    It,
    #[n(1)]
    Fm,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[n(0)]
    Open,
    #[n(1)]
    Assigned,
    #[n(2)]
    InProgress,
    #[n(3)]
    Resolved,
    #[n(4)]
    Closed,
    #[n(5)]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketAction {
    Assign,
    StartWork,
    Resolve,
    Close,
    Cancel,
}

impl TicketStatus {
    pub fn next(self, action: TicketAction) -> Option<TicketStatus> {
        use TicketAction as A;
        use TicketStatus as S;
        match (self, action) {
            // reassignment clears the previous assignee
            (S::Open | S::Assigned, A::Assign) => Some(S::Assigned),
            (S::Assigned, A::StartWork) => Some(S::InProgress),
            (S::InProgress, A::Resolve) => Some(S::Resolved),
            (S::Resolved, A::Close) => Some(S::Closed),
            (S::Open | S::Assigned | S::InProgress, A::Cancel) => Some(S::Cancelled),
            _ => None,
        }
    }

    /// Still on the clock
    pub fn is_open(self) -> bool {
        matches!(
            self,
            TicketStatus::Open | TicketStatus::Assigned | TicketStatus::InProgress
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::Assigned => "assigned",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
            TicketStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize, Deserialize)]
pub struct Ticket {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub ticket_number: String,
    #[n(2)]
    pub ticket_type: TicketType,
    #[n(3)]
    pub title: String,
    #[n(4)]
    pub description: String,
    #[n(5)]
    pub status: TicketStatus,
    #[n(6)]
    pub priority: Priority,
    #[n(7)]
    pub reported_by: String,
    #[n(8)]
    pub reported_at: TimeStamp,
    #[n(9)]
    pub sla_deadline: Option<TimeStamp>,
    #[n(10)]
    pub assigned_to: Option<String>,
    #[n(11)]
    pub assigned_at: Option<TimeStamp>,
    #[n(12)]
    pub started_at: Option<TimeStamp>,
    #[n(13)]
    pub resolution: Option<String>,
    #[n(14)]
    pub resolved_at: Option<TimeStamp>,
    #[n(15)]
    pub closed_at: Option<TimeStamp>,
    #[n(16)]
    pub cancelled_at: Option<TimeStamp>,
    #[n(17)]
    pub breach_notified: bool,
    #[n(18)]
    pub asset_id: Option<String>, // equipment the ticket is about
}

impl Ticket {
    /// Derived on every read, never stored. Resolution freezes the clock;
    /// cancelled tickets have no SLA.
    pub fn sla_status(&self, now: TimeStamp) -> Option<SlaStatus> {
        let observed_at = match self.status {
            TicketStatus::Cancelled => return None,
            TicketStatus::Resolved | TicketStatus::Closed => self.resolved_at.unwrap_or(now),
            _ => now,
        };
        sla::check_sla_status(self.reported_at, self.sla_deadline, observed_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use TicketAction as A;
    use TicketStatus as S;

    fn ticket(priority: Priority, at: TimeStamp) -> Ticket {
        Ticket {
            id: "tkt".into(),
            ticket_number: "TKT-2026-00001".into(),
            ticket_type: TicketType::It,
            title: "Projector dead".into(),
            description: String::new(),
            status: S::Open,
            priority,
            reported_by: "t1".into(),
            reported_at: at,
            sla_deadline: Some(sla::calculate_deadline(priority, at)),
            assigned_to: None,
            assigned_at: None,
            started_at: None,
            resolution: None,
            resolved_at: None,
            closed_at: None,
            cancelled_at: None,
            breach_notified: false,
            asset_id: None,
        }
    }

    #[test]
    fn lifecycle_table() {
        assert_eq!(S::Open.next(A::Assign), Some(S::Assigned));
        assert_eq!(S::Assigned.next(A::Assign), Some(S::Assigned));
        assert_eq!(S::Open.next(A::StartWork), None);
        assert_eq!(S::InProgress.next(A::Resolve), Some(S::Resolved));
        assert_eq!(S::Resolved.next(A::Cancel), None);
        assert_eq!(S::Closed.next(A::Assign), None);
    }

    #[test]
    fn resolution_freezes_sla() {
        let t0 = TimeStamp::new_with(2026, 9, 1, 8, 0, 0);
        let mut t = ticket(Priority::Urgent, t0);
        t.status = S::Resolved;
        t.resolved_at = Some(t0.plus(Duration::minutes(30)));

        assert_eq!(t.sla_status(t0.plus(Duration::hours(10))), Some(SlaStatus::WithinSla));
    }

    #[test]
    fn cancelled_ticket_has_no_sla() {
        let t0 = TimeStamp::new_with(2026, 9, 1, 8, 0, 0);
        let mut t = ticket(Priority::Low, t0);
        t.status = S::Cancelled;
        assert_eq!(t.sla_status(t0.plus(Duration::days(10))), None);
    }
}
