//! Ticket lifecycle engine, bound to the SLA clock
use super::EngineContext;
use crate::auth::{Action, Module, ScopeContext};
use crate::error::{WorkflowError, WorkflowResult};
use crate::events::DomainEvent;
use crate::sla::{self, Priority, SlaStatus};
use crate::store::{self, OrAbort, TxResult, keys};
use crate::ticket::{Ticket, TicketAction, TicketStatus, TicketType};
use crate::types::{Actor, TimeStamp};
use serde::Serialize;
use sled::transaction::TransactionalTree;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct NewTicket {
    pub ticket_type: TicketType,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub asset_id: Option<String>,
}

/// A ticket together with its SLA status as of the read.
#[derive(Debug, Clone, Serialize)]
pub struct TicketView {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub sla_status: Option<SlaStatus>,
}

pub struct TicketService {
    context: Arc<EngineContext>,
}

fn advance(
    ticket: &Ticket,
    action: TicketAction,
    verb: &'static str,
) -> WorkflowResult<TicketStatus> {
    ticket.status.next(action).ok_or_else(|| {
        WorkflowError::invalid_status("ticket", &ticket.ticket_number, ticket.status, verb)
    })
}

fn reporter_scope(ticket: &Ticket) -> ScopeContext {
    ScopeContext::owned_by(&ticket.reported_by)
}

// the assignee counts as the owner of the work
fn assignee_scope(ticket: &Ticket) -> ScopeContext {
    match &ticket.assigned_to {
        Some(assignee) => ScopeContext::owned_by(assignee),
        None => ScopeContext::global(),
    }
}

impl TicketService {
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self { context }
    }

    fn load(&self, tx: &TransactionalTree, ticket_number: &str) -> TxResult<Ticket> {
        store::require(tx, "ticket", &keys::ticket(ticket_number), ticket_number)
    }

    /// Stamps the SLA deadline from priority at creation
    pub fn create(&self, actor: &Actor, new: NewTicket) -> WorkflowResult<Ticket> {
        if new.title.trim().is_empty() {
            return Err(WorkflowError::MissingRequiredField("title"));
        }
        self.context.authorize(
            actor,
            Module::Tickets,
            Action::Create,
            &ScopeContext::owned_by(&actor.id),
        )?;

        let now = self.context.now();
        let ticket = Ticket {
            id: self.context.new_id("tkt_")?,
            ticket_number: self.context.store.next_number("TKT", now.year())?,
            ticket_type: new.ticket_type,
            title: new.title,
            description: new.description,
            status: TicketStatus::Open,
            priority: new.priority,
            reported_by: actor.id.clone(),
            reported_at: now,
            sla_deadline: Some(sla::calculate_deadline(new.priority, now)),
            assigned_to: None,
            assigned_at: None,
            started_at: None,
            resolution: None,
            resolved_at: None,
            closed_at: None,
            cancelled_at: None,
            breach_notified: false,
            asset_id: new.asset_id,
        };

        self.context.store.transact(|tx| {
            store::save(tx, &keys::ticket(&ticket.ticket_number), &ticket)?;
            Ok(())
        })?;

        info!(ticket = %ticket.ticket_number, priority = %ticket.priority, "ticket created");
        self.context.publish(&[DomainEvent::TicketCreated {
            ticket_number: ticket.ticket_number.clone(),
            priority: ticket.priority.to_string(),
            sla_deadline: ticket.sla_deadline,
        }]);
        Ok(ticket)
    }

    /// Assign, or reassign, replacing any previous assignee
    pub fn assign(
        &self,
        ticket_number: &str,
        actor: &Actor,
        assignee: &str,
    ) -> WorkflowResult<Ticket> {
        let assignee = assignee.trim();
        if assignee.is_empty() {
            return Err(WorkflowError::MissingRequiredField("assignee"));
        }
        let now = self.context.now();

        let ticket = self.context.store.transact(|tx| {
            let mut ticket = self.load(tx, ticket_number)?;
            ticket.status = advance(&ticket, TicketAction::Assign, "assign").or_abort()?;
            self.context
                .authorize(actor, Module::Tickets, Action::Assign, &reporter_scope(&ticket))
                .or_abort()?;
            ticket.assigned_to = Some(assignee.to_string());
            ticket.assigned_at = Some(now);
            store::save(tx, &keys::ticket(ticket_number), &ticket)?;
            Ok(ticket)
        })?;

        info!(ticket = ticket_number, assignee, "ticket assigned");
        self.context.publish(&[DomainEvent::TicketAssigned {
            ticket_number: ticket.ticket_number.clone(),
            assignee: assignee.to_string(),
        }]);
        Ok(ticket)
    }

    pub fn start_work(&self, ticket_number: &str, actor: &Actor) -> WorkflowResult<Ticket> {
        let now = self.context.now();

        let ticket = self.context.store.transact(|tx| {
            let mut ticket = self.load(tx, ticket_number)?;
            ticket.status = advance(&ticket, TicketAction::StartWork, "start work on").or_abort()?;
            self.context
                .authorize(actor, Module::Tickets, Action::Update, &assignee_scope(&ticket))
                .or_abort()?;
            ticket.started_at = Some(now);
            store::save(tx, &keys::ticket(ticket_number), &ticket)?;
            Ok(ticket)
        })?;

        info!(ticket = ticket_number, "ticket in progress");
        Ok(ticket)
    }

    pub fn resolve(
        &self,
        ticket_number: &str,
        actor: &Actor,
        resolution: &str,
    ) -> WorkflowResult<Ticket> {
        let resolution = resolution.trim();
        if resolution.is_empty() {
            return Err(WorkflowError::MissingRequiredField("resolution"));
        }
        let now = self.context.now();

        let ticket = self.context.store.transact(|tx| {
            let mut ticket = self.load(tx, ticket_number)?;
            ticket.status = advance(&ticket, TicketAction::Resolve, "resolve").or_abort()?;
            self.context
                .authorize(actor, Module::Tickets, Action::Resolve, &assignee_scope(&ticket))
                .or_abort()?;
            ticket.resolution = Some(resolution.to_string());
            ticket.resolved_at = Some(now);
            store::save(tx, &keys::ticket(ticket_number), &ticket)?;
            Ok(ticket)
        })?;

        info!(ticket = ticket_number, "ticket resolved");
        self.context.publish(&[DomainEvent::TicketResolved {
            ticket_number: ticket.ticket_number.clone(),
            resolution: resolution.to_string(),
        }]);
        Ok(ticket)
    }

    pub fn close(&self, ticket_number: &str, actor: &Actor) -> WorkflowResult<Ticket> {
        let now = self.context.now();

        let ticket = self.context.store.transact(|tx| {
            let mut ticket = self.load(tx, ticket_number)?;
            ticket.status = advance(&ticket, TicketAction::Close, "close").or_abort()?;
            self.context
                .authorize(actor, Module::Tickets, Action::Close, &reporter_scope(&ticket))
                .or_abort()?;
            ticket.closed_at = Some(now);
            store::save(tx, &keys::ticket(ticket_number), &ticket)?;
            Ok(ticket)
        })?;

        info!(ticket = ticket_number, "ticket closed");
        self.context.publish(&[DomainEvent::TicketClosed {
            ticket_number: ticket.ticket_number.clone(),
        }]);
        Ok(ticket)
    }

    /// Terminal; cancelled tickets are never reported as breached
    pub fn cancel(&self, ticket_number: &str, actor: &Actor) -> WorkflowResult<Ticket> {
        let now = self.context.now();

        let ticket = self.context.store.transact(|tx| {
            let mut ticket = self.load(tx, ticket_number)?;
            ticket.status = advance(&ticket, TicketAction::Cancel, "cancel").or_abort()?;
            self.context
                .authorize(actor, Module::Tickets, Action::Cancel, &reporter_scope(&ticket))
                .or_abort()?;
            ticket.cancelled_at = Some(now);
            store::save(tx, &keys::ticket(ticket_number), &ticket)?;
            Ok(ticket)
        })?;

        info!(ticket = ticket_number, "ticket cancelled");
        Ok(ticket)
    }

    pub fn ticket(&self, ticket_number: &str) -> WorkflowResult<Ticket> {
        self.context
            .store
            .get(&keys::ticket(ticket_number))?
            .ok_or_else(|| WorkflowError::not_found("ticket", ticket_number))
    }

    pub fn sla_status(&self, ticket_number: &str) -> WorkflowResult<Option<SlaStatus>> {
        Ok(self.ticket(ticket_number)?.sla_status(self.context.now()))
    }

    /// Open tickets with their SLA status derived at read time
    pub fn list_open(&self, actor: &Actor) -> WorkflowResult<Vec<TicketView>> {
        self.context.require_module(actor, Module::Tickets)?;
        let now = self.context.now();
        let tickets: Vec<Ticket> = self.context.store.scan(keys::TICKETS)?;
        Ok(tickets
            .into_iter()
            .filter(|t| t.status.is_open())
            .map(|ticket| TicketView {
                sla_status: ticket.sla_status(now),
                ticket,
            })
            .collect())
    }

    /// Periodic breach check, driven by an external scheduler. Each breached
    /// ticket is flagged and reported exactly once.
    pub fn sweep_sla(&self) -> WorkflowResult<Vec<String>> {
        let now = self.context.now();
        let candidates: Vec<Ticket> = self.context.store.scan(keys::TICKETS)?;

        let mut events = vec![];
        for candidate in candidates.iter().filter(|t| is_unreported_breach(t, now)) {
            let number = candidate.ticket_number.as_str();
            let flagged = self.context.store.transact(|tx| {
                let mut ticket = self.load(tx, number)?;
                // may have been resolved or swept since the scan
                if !is_unreported_breach(&ticket, now) {
                    return Ok(None);
                }
                ticket.breach_notified = true;
                store::save(tx, &keys::ticket(number), &ticket)?;
                Ok(ticket.sla_deadline)
            })?;
            if let Some(sla_deadline) = flagged {
                events.push(DomainEvent::SlaBreached {
                    ticket_number: number.to_string(),
                    sla_deadline,
                });
            }
        }

        debug!(breached = events.len(), "sla sweep finished");
        self.context.publish(&events);
        Ok(events
            .iter()
            .filter_map(|e| match e {
                DomainEvent::SlaBreached { ticket_number, .. } => Some(ticket_number.clone()),
                _ => None,
            })
            .collect())
    }
}

fn is_unreported_breach(ticket: &Ticket, now: TimeStamp) -> bool {
    ticket.status.is_open()
        && !ticket.breach_notified
        && ticket.sla_status(now) == Some(SlaStatus::Breached)
}
