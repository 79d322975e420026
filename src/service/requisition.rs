//! Stationary requisition approval engine
use super::EngineContext;
use super::inventory::move_stock;
use crate::auth::{Action, Module, ScopeContext};
use crate::error::{WorkflowError, WorkflowResult};
use crate::events::DomainEvent;
use crate::ledger::{self, LineQuantity};
use crate::requisition::{
    Approval, Rejection, RequestedFor, Requisition, RequisitionAction, RequisitionItem,
    RequisitionStatus, Urgency,
};
use crate::store::{self, OrAbort, TxResult, fail, keys};
use crate::types::{Actor, Amount};
use sled::transaction::TransactionalTree;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RequisitionDraft {
    pub requested_for: RequestedFor,
    pub department: Option<String>, // falls back to the requester's department
    pub urgency: Urgency,
    pub purpose: Option<String>,
    pub location: Option<String>,
    pub items: Vec<RequisitionItem>,
}

pub struct RequisitionService {
    context: Arc<EngineContext>,
}

fn validate_items(items: &[RequisitionItem]) -> WorkflowResult<Vec<RequisitionItem>> {
    if items.is_empty() {
        return Err(WorkflowError::MissingRequiredField("items"));
    }
    ledger::distinct_items(items.iter().map(|i| i.item_id.as_str()))?;
    items
        .iter()
        .map(|item| {
            if !item.quantity_requested.is_positive() {
                return Err(WorkflowError::quantity(
                    &item.item_id,
                    "requested quantity must be positive",
                ));
            }
            ledger::non_negative(&item.item_id, "estimated unit cost", item.estimated_unit_cost)?;
            // approval and issue figures are never taken from the requester
            Ok(RequisitionItem::new(
                &item.item_id,
                item.quantity_requested,
                item.estimated_unit_cost,
            ))
        })
        .collect()
}

fn scope_of(req: &Requisition) -> ScopeContext {
    ScopeContext::owned_by(&req.requested_by).department(req.department.as_deref())
}

fn transition(
    req: &Requisition,
    action: RequisitionAction,
    verb: &'static str,
) -> WorkflowResult<RequisitionStatus> {
    req.status.next(action).ok_or_else(|| {
        WorkflowError::invalid_status("requisition", &req.requisition_no, req.status, verb)
    })
}

/// Record approval figures, defaulting each line to what was requested.
fn apply_approvals(req: &mut Requisition, overrides: &[LineQuantity]) -> WorkflowResult<()> {
    for line in overrides {
        if !req.items.iter().any(|i| i.item_id == line.item_id) {
            return Err(WorkflowError::not_found("requisition item", &line.item_id));
        }
    }
    for item in req.items.iter_mut() {
        let proposed = overrides
            .iter()
            .find(|l| l.item_id == item.item_id)
            .map(|l| l.quantity);
        item.quantity_approved = Some(ledger::approve_quantity(
            &item.item_id,
            item.quantity_requested,
            item.quantity_approved,
            proposed,
        )?);
        item.check()?;
    }
    Ok(())
}

impl RequisitionService {
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self { context }
    }

    fn load(&self, tx: &TransactionalTree, no: &str) -> TxResult<Requisition> {
        store::require(tx, "requisition", &keys::requisition(no), no)
    }

    pub fn create_draft(&self, actor: &Actor, draft: RequisitionDraft) -> WorkflowResult<Requisition> {
        let items = validate_items(&draft.items)?;
        // level-one approval is by department, personal requests included
        let Some(department) = draft.department.clone().or_else(|| actor.department.clone())
        else {
            return Err(WorkflowError::MissingRequiredField("department"));
        };
        self.context.authorize(
            actor,
            Module::Stationary,
            Action::Create,
            &ScopeContext::owned_by(&actor.id).department(Some(department.as_str())),
        )?;

        let now = self.context.now();
        let mut req = Requisition {
            id: self.context.new_id("req_")?,
            requisition_no: self.context.store.next_number("REQ", now.year())?,
            requested_by: actor.id.clone(),
            requested_for: draft.requested_for,
            department: Some(department),
            urgency: draft.urgency,
            purpose: draft.purpose,
            status: RequisitionStatus::Draft,
            location: draft
                .location
                .unwrap_or_else(|| self.context.config.default_location.clone()),
            l1_approval: None,
            l2_approval: None,
            rejection: None,
            issued_by: None,
            issued_at: None,
            completed_at: None,
            total_estimated_cost: Default::default(),
            created_at: now,
            updated_at: now,
            items,
        };
        req.recompute_total();

        self.context.store.transact(|tx| {
            store::save(tx, &keys::requisition(&req.requisition_no), &req)?;
            Ok(())
        })?;
        info!(requisition = %req.requisition_no, "requisition drafted");
        Ok(req)
    }

    /// Owner-only, drafts only
    pub fn update_draft(
        &self,
        requisition_no: &str,
        actor: &Actor,
        items: &[RequisitionItem],
        purpose: Option<String>,
    ) -> WorkflowResult<Requisition> {
        let items = validate_items(items)?;
        let now = self.context.now();

        self.context.store.transact(|tx| {
            let mut req = self.load(tx, requisition_no)?;
            if req.requested_by != actor.id {
                return fail(not_owner(actor, requisition_no));
            }
            transition(&req, RequisitionAction::Edit, "edit").or_abort()?;
            req.items = items.clone();
            if purpose.is_some() {
                req.purpose = purpose.clone();
            }
            req.recompute_total();
            req.updated_at = now;
            store::save(tx, &keys::requisition(requisition_no), &req)?;
            Ok(req)
        })
    }

    pub fn delete_draft(&self, requisition_no: &str, actor: &Actor) -> WorkflowResult<()> {
        self.context.store.transact(|tx| {
            let req = self.load(tx, requisition_no)?;
            if req.requested_by != actor.id {
                return fail(not_owner(actor, requisition_no));
            }
            if req.status != RequisitionStatus::Draft {
                return fail(WorkflowError::invalid_status(
                    "requisition",
                    requisition_no,
                    req.status,
                    "delete",
                ));
            }
            store::delete(tx, &keys::requisition(requisition_no))
        })?;
        info!(requisition = requisition_no, "draft requisition deleted");
        Ok(())
    }

    pub fn submit(&self, requisition_no: &str, actor: &Actor) -> WorkflowResult<Requisition> {
        let now = self.context.now();

        let req = self.context.store.transact(|tx| {
            let mut req = self.load(tx, requisition_no)?;
            if req.requested_by != actor.id {
                return fail(not_owner(actor, requisition_no));
            }
            req.status = transition(&req, RequisitionAction::Submit, "submit").or_abort()?;
            req.updated_at = now;
            store::save(tx, &keys::requisition(requisition_no), &req)?;
            Ok(req)
        })?;

        info!(requisition = requisition_no, "requisition submitted");
        self.context.publish(&[DomainEvent::RequisitionSubmitted {
            requisition_no: req.requisition_no.clone(),
            department: req.department.clone(),
        }]);
        Ok(req)
    }

    /// First-level approval: a same-department approver who is not the requester.
    pub fn approve_l1(
        &self,
        requisition_no: &str,
        approver: &Actor,
        quantities: &[LineQuantity],
    ) -> WorkflowResult<Requisition> {
        let now = self.context.now();

        let req = self.context.store.transact(|tx| {
            let mut req = self.load(tx, requisition_no)?;
            let next = transition(&req, RequisitionAction::ApproveL1, "approve").or_abort()?;
            if approver.id == req.requested_by {
                return fail(WorkflowError::NotAuthorizedApprover {
                    approver: approver.id.clone(),
                    key: requisition_no.to_string(),
                    reason: "requesters cannot approve their own requisition",
                });
            }
            if approver.department.is_none() || approver.department != req.department {
                return fail(WorkflowError::NotAuthorizedApprover {
                    approver: approver.id.clone(),
                    key: requisition_no.to_string(),
                    reason: "approver is outside the requesting department",
                });
            }
            self.context
                .authorize(approver, Module::Stationary, Action::Approve, &scope_of(&req))
                .or_abort()?;

            apply_approvals(&mut req, quantities).or_abort()?;
            req.status = next;
            req.l1_approval = Some(Approval {
                by: approver.id.clone(),
                at: now,
            });
            req.updated_at = now;
            store::save(tx, &keys::requisition(requisition_no), &req)?;
            Ok(req)
        })?;

        info!(requisition = requisition_no, approver = %approver.id, "requisition approved at level 1");
        self.context.publish(&[DomainEvent::RequisitionApproved {
            requisition_no: req.requisition_no.clone(),
            level: 1,
            approver: approver.id.clone(),
        }]);
        Ok(req)
    }

    /// Second-level approval. Level-two approvers are cross-department
    /// authorities: neither the department nor the self-approval rule applies here.
    pub fn approve_l2(
        &self,
        requisition_no: &str,
        approver: &Actor,
        quantities: &[LineQuantity],
    ) -> WorkflowResult<Requisition> {
        let now = self.context.now();

        let req = self.context.store.transact(|tx| {
            let mut req = self.load(tx, requisition_no)?;
            let next = transition(&req, RequisitionAction::ApproveL2, "approve").or_abort()?;
            self.context
                .authorize(approver, Module::Stationary, Action::ApproveFinal, &scope_of(&req))
                .or_abort()?;

            apply_approvals(&mut req, quantities).or_abort()?;
            req.status = next;
            req.l2_approval = Some(Approval {
                by: approver.id.clone(),
                at: now,
            });
            req.updated_at = now;
            store::save(tx, &keys::requisition(requisition_no), &req)?;
            Ok(req)
        })?;

        info!(requisition = requisition_no, approver = %approver.id, "requisition approved at level 2");
        self.context.publish(&[DomainEvent::RequisitionApproved {
            requisition_no: req.requisition_no.clone(),
            level: 2,
            approver: approver.id.clone(),
        }]);
        Ok(req)
    }

    /// Terminal. A rejected requisition is never resubmitted.
    pub fn reject(
        &self,
        requisition_no: &str,
        approver: &Actor,
        reason: &str,
    ) -> WorkflowResult<Requisition> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::MissingRequiredField("reason"));
        }
        let now = self.context.now();

        let req = self.context.store.transact(|tx| {
            let mut req = self.load(tx, requisition_no)?;
            req.status = transition(&req, RequisitionAction::Reject, "reject").or_abort()?;
            self.context
                .authorize(approver, Module::Stationary, Action::Reject, &scope_of(&req))
                .or_abort()?;
            req.rejection = Some(Rejection {
                by: approver.id.clone(),
                at: now,
                reason: reason.to_string(),
            });
            req.updated_at = now;
            store::save(tx, &keys::requisition(requisition_no), &req)?;
            Ok(req)
        })?;

        info!(requisition = requisition_no, "requisition rejected");
        self.context.publish(&[DomainEvent::RequisitionRejected {
            requisition_no: req.requisition_no.clone(),
            approver: approver.id.clone(),
            reason: reason.to_string(),
        }]);
        Ok(req)
    }

    /// Hand out approved stock. May be called repeatedly; the requisition completes
    /// once every line is fully issued or `finalize` is set.
    pub fn issue(
        &self,
        requisition_no: &str,
        actor: &Actor,
        lines: &[LineQuantity],
        finalize: bool,
    ) -> WorkflowResult<Requisition> {
        if lines.is_empty() && !finalize {
            return Err(WorkflowError::MissingRequiredField("items"));
        }
        let now = self.context.now();

        let req = self.context.store.transact(|tx| {
            let mut req = self.load(tx, requisition_no)?;
            let next = transition(&req, RequisitionAction::Issue, "issue").or_abort()?;
            self.context
                .authorize(actor, Module::Stationary, Action::Issue, &scope_of(&req))
                .or_abort()?;

            let location = req.location.clone();
            for line in lines {
                let Some(item) = req.item_mut(&line.item_id) else {
                    return fail(WorkflowError::not_found("requisition item", &line.item_id));
                };
                let issued = ledger::issue_quantity(
                    &item.item_id,
                    item.quantity_approved,
                    item.quantity_issued,
                    line.quantity,
                )
                .or_abort()?;
                if !line.quantity.is_zero() {
                    move_stock(tx, &item.item_id, &location, Amount::ZERO - line.quantity, now)?;
                }
                item.quantity_issued = issued;
                item.check().or_abort()?;
            }

            req.status = next;
            req.issued_by = Some(actor.id.clone());
            req.issued_at = Some(now);
            if finalize || req.fully_issued() {
                req.status = RequisitionStatus::Completed;
                req.completed_at = Some(now);
            }
            req.updated_at = now;
            store::save(tx, &keys::requisition(requisition_no), &req)?;
            Ok(req)
        })?;

        let completed = req.status == RequisitionStatus::Completed;
        info!(requisition = requisition_no, completed, "stationary issued");
        self.context.publish(&[DomainEvent::RequisitionIssued {
            requisition_no: req.requisition_no.clone(),
            completed,
        }]);
        Ok(req)
    }

    pub fn requisition(&self, requisition_no: &str) -> WorkflowResult<Requisition> {
        self.context
            .store
            .get(&keys::requisition(requisition_no))?
            .ok_or_else(|| WorkflowError::not_found("requisition", requisition_no))
    }

    /// Requisitions in `status`, gated on stationary module access
    pub fn list_by_status(
        &self,
        actor: &Actor,
        status: RequisitionStatus,
    ) -> WorkflowResult<Vec<Requisition>> {
        self.context.require_module(actor, Module::Stationary)?;
        let all: Vec<Requisition> = self.context.store.scan("requisition/")?;
        Ok(all.into_iter().filter(|r| r.status == status).collect())
    }
}

fn not_owner(actor: &Actor, requisition_no: &str) -> WorkflowError {
    WorkflowError::NotOwner {
        actor: actor.id.clone(),
        entity: "requisition",
        key: requisition_no.to_string(),
    }
}
