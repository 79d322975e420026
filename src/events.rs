//! Domain events and the fire-and-forget notification port
use super::types::{Amount, TimeStamp};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    AssetsBorrowed {
        assignment_id: String,
        transaction_id: String,
        transaction_number: String,
        user_id: String,
        asset_ids: Vec<String>,
    },
    BorrowSigned {
        transaction_id: String,
        signed_at: TimeStamp,
    },
    BorrowCancelled {
        transaction_id: String,
        released_assets: Vec<String>,
    },
    AssetsReturned {
        assignment_id: String,
        return_id: String,
        asset_ids: Vec<String>,
        damage_total: Amount,
    },
    AssignmentClosed {
        assignment_id: String,
        user_id: String,
    },
    RequisitionSubmitted {
        requisition_no: String,
        department: Option<String>,
    },
    RequisitionApproved {
        requisition_no: String,
        level: u8,
        approver: String,
    },
    RequisitionRejected {
        requisition_no: String,
        approver: String,
        reason: String,
    },
    RequisitionIssued {
        requisition_no: String,
        completed: bool,
    },
    PurchaseOrderApproved {
        po_number: String,
        approver: String,
    },
    PurchaseOrderReceived {
        po_number: String,
        fully_received: bool,
    },
    TicketCreated {
        ticket_number: String,
        priority: String,
        sla_deadline: Option<TimeStamp>,
    },
    TicketAssigned {
        ticket_number: String,
        assignee: String,
    },
    TicketResolved {
        ticket_number: String,
        resolution: String,
    },
    TicketClosed {
        ticket_number: String,
    },
    SlaBreached {
        ticket_number: String,
        sla_deadline: TimeStamp,
    },
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::AssetsBorrowed { .. } => "assets_borrowed",
            DomainEvent::BorrowSigned { .. } => "borrow_signed",
            DomainEvent::BorrowCancelled { .. } => "borrow_cancelled",
            DomainEvent::AssetsReturned { .. } => "assets_returned",
            DomainEvent::AssignmentClosed { .. } => "assignment_closed",
            DomainEvent::RequisitionSubmitted { .. } => "requisition_submitted",
            DomainEvent::RequisitionApproved { .. } => "requisition_approved",
            DomainEvent::RequisitionRejected { .. } => "requisition_rejected",
            DomainEvent::RequisitionIssued { .. } => "requisition_issued",
            DomainEvent::PurchaseOrderApproved { .. } => "purchase_order_approved",
            DomainEvent::PurchaseOrderReceived { .. } => "purchase_order_received",
            DomainEvent::TicketCreated { .. } => "ticket_created",
            DomainEvent::TicketAssigned { .. } => "ticket_assigned",
            DomainEvent::TicketResolved { .. } => "ticket_resolved",
            DomainEvent::TicketClosed { .. } => "ticket_closed",
            DomainEvent::SlaBreached { .. } => "sla_breached",
        }
    }
}

pub trait Notifier: Send + Sync {
    fn emit(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

/// Writes every event to the log. Used when no mailer is wired in.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn emit(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_string(event)?;
        info!(event = event.event_type(), %payload, "domain event");
        Ok(())
    }
}

/// Deliver committed events once each. Delivery failures never reach the caller.
pub(crate) fn dispatch(notifier: &dyn Notifier, events: &[DomainEvent]) {
    for event in events {
        if let Err(err) = notifier.emit(event) {
            warn!(event = event.event_type(), error = %err, "notification delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Flaky {
        seen: Mutex<Vec<&'static str>>,
    }

    impl Notifier for Flaky {
        fn emit(&self, event: &DomainEvent) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(event.event_type());
            anyhow::bail!("smtp down")
        }
    }

    #[test]
    fn failures_are_swallowed_and_every_event_attempted() {
        let notifier = Flaky {
            seen: Mutex::new(vec![]),
        };
        let events = vec![
            DomainEvent::TicketClosed {
                ticket_number: "TKT-2026-00001".into(),
            },
            DomainEvent::AssignmentClosed {
                assignment_id: "asg_1".into(),
                user_id: "u1".into(),
            },
        ];

        dispatch(&notifier, &events);

        assert_eq!(
            *notifier.seen.lock().unwrap(),
            vec!["ticket_closed", "assignment_closed"]
        );
    }

    #[test]
    fn payload_is_tagged_json() {
        let event = DomainEvent::RequisitionApproved {
            requisition_no: "REQ-2026-00003".into(),
            level: 1,
            approver: "hod".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "requisition_approved");
        assert_eq!(json["level"], 1);
    }
}
