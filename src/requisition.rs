//! Stationary requisitions and their two-level approval state machine
use super::ledger;
use super::error::WorkflowResult;
use super::types::{Amount, TimeStamp};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RequisitionStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Pending,
    #[n(2)]
    ApprovedL1,
    #[n(3)]
    Approved,
    #[n(4)]
    Rejected,
    #[n(5)]
    Issued,
    #[n(6)]
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequisitionAction {
    Edit,
    Submit,
    ApproveL1,
    ApproveL2,
    Reject,
    Issue,
}

impl RequisitionStatus {
    /// Transition table. `None` means the action is illegal from this status.
    /// Issue leads to `Issued`; the engine promotes to `Completed` once fully issued.
    pub fn next(self, action: RequisitionAction) -> Option<RequisitionStatus> {
        use RequisitionAction as A;
        use RequisitionStatus as S;
        match (self, action) {
            (S::Draft, A::Edit) => Some(S::Draft),
            (S::Draft, A::Submit) => Some(S::Pending),
            (S::Pending, A::ApproveL1) => Some(S::ApprovedL1),
            (S::ApprovedL1, A::ApproveL2) => Some(S::Approved),
            (S::Pending | S::ApprovedL1, A::Reject) => Some(S::Rejected),
            (S::Approved | S::Issued, A::Issue) => Some(S::Issued),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequisitionStatus::Draft => "draft",
            RequisitionStatus::Pending => "pending",
            RequisitionStatus::ApprovedL1 => "approved_l1",
            RequisitionStatus::Approved => "approved",
            RequisitionStatus::Rejected => "rejected",
            RequisitionStatus::Issued => "issued",
            RequisitionStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for RequisitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RequestedFor {
    #[n(0)]
    Personal,
    #[n(1)]
    Department,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    #[n(0)]
    Low,
    #[n(1)]
    Normal,
    #[n(2)]
    High,
    #[n(3)]
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize, Deserialize)]
pub struct Approval {
    #[n(0)]
    pub by: String,
    #[n(1)]
    pub at: TimeStamp,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize, Deserialize)]
pub struct Rejection {
    #[n(0)]
    pub by: String,
    #[n(1)]
    pub at: TimeStamp,
    #[n(2)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize, Deserialize)]
pub struct RequisitionItem {
    #[n(0)]
    pub item_id: String,
    #[n(1)]
    pub quantity_requested: Amount,
    #[n(2)]
    pub quantity_approved: Option<Amount>,
    #[n(3)]
    pub quantity_issued: Amount,
    #[n(4)]
    pub estimated_unit_cost: Amount,
}

impl RequisitionItem {
    pub fn new(item_id: &str, quantity_requested: Amount, estimated_unit_cost: Amount) -> Self {
        Self {
            item_id: item_id.to_string(),
            quantity_requested,
            quantity_approved: None,
            quantity_issued: Amount::ZERO,
            estimated_unit_cost,
        }
    }

    pub fn fully_issued(&self) -> bool {
        self.quantity_approved
            .is_some_and(|approved| self.quantity_issued >= approved)
    }

    pub fn check(&self) -> WorkflowResult<()> {
        ledger::check_requisition_line(
            &self.item_id,
            self.quantity_requested,
            self.quantity_approved,
            self.quantity_issued,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Serialize, Deserialize)]
pub struct Requisition {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub requisition_no: String,
    #[n(2)]
    pub requested_by: String,
    #[n(3)]
    pub requested_for: RequestedFor,
    #[n(4)]
    pub department: Option<String>,
    #[n(5)]
    pub urgency: Urgency,
    #[n(6)]
    pub purpose: Option<String>,
    #[n(7)]
    pub status: RequisitionStatus,
    #[n(8)]
    pub location: String, // store the items are issued from
    #[n(9)]
    pub l1_approval: Option<Approval>,
    #[n(10)]
    pub l2_approval: Option<Approval>,
    #[n(11)]
    pub rejection: Option<Rejection>,
    #[n(12)]
    pub issued_by: Option<String>,
    #[n(13)]
    pub issued_at: Option<TimeStamp>,
    #[n(14)]
    pub completed_at: Option<TimeStamp>,
    #[n(15)]
    pub total_estimated_cost: Amount,
    #[n(16)]
    pub created_at: TimeStamp,
    #[n(17)]
    pub updated_at: TimeStamp,
    #[n(18)]
    pub items: Vec<RequisitionItem>,
}

impl Requisition {
    pub fn recompute_total(&mut self) {
        self.total_estimated_cost = self
            .items
            .iter()
            .map(|i| ledger::line_total(i.estimated_unit_cost, i.quantity_requested))
            .sum();
    }

    pub fn item_mut(&mut self, item_id: &str) -> Option<&mut RequisitionItem> {
        self.items.iter_mut().find(|i| i.item_id == item_id)
    }

    pub fn fully_issued(&self) -> bool {
        self.items.iter().all(RequisitionItem::fully_issued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RequisitionAction as A;
    use RequisitionStatus as S;

    #[test]
    fn happy_path_walks_the_table() {
        let mut status = S::Draft;
        for action in [A::Submit, A::ApproveL1, A::ApproveL2, A::Issue] {
            status = status.next(action).unwrap();
        }
        assert_eq!(status, S::Issued);
        assert_eq!(status.next(A::Issue), Some(S::Issued));
    }

    #[test]
    fn rejection_only_while_awaiting_approval() {
        assert_eq!(S::Pending.next(A::Reject), Some(S::Rejected));
        assert_eq!(S::ApprovedL1.next(A::Reject), Some(S::Rejected));
        assert_eq!(S::Approved.next(A::Reject), None);
        assert_eq!(S::Draft.next(A::Reject), None);
    }

    #[test]
    fn terminal_statuses_accept_nothing() {
        for action in [A::Edit, A::Submit, A::ApproveL1, A::ApproveL2, A::Reject, A::Issue] {
            assert_eq!(S::Rejected.next(action), None);
            assert_eq!(S::Completed.next(action), None);
        }
    }

    #[test]
    fn only_drafts_are_editable() {
        assert_eq!(S::Draft.next(A::Edit), Some(S::Draft));
        assert_eq!(S::Pending.next(A::Edit), None);
    }
}
