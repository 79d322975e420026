//! Purchase order engine: ordering and incremental receiving
use super::EngineContext;
use super::inventory::move_stock;
use crate::auth::{Action, Module, ScopeContext};
use crate::error::{WorkflowError, WorkflowResult};
use crate::events::DomainEvent;
use crate::ledger::{self, LineQuantity, ReceiptProgress};
use crate::purchase_order::{PoAction, PoItem, PoStatus, PurchaseOrder};
use crate::store::{self, OrAbort, TxResult, fail, keys};
use crate::types::{Actor, Amount, TimeStamp};
use sled::transaction::TransactionalTree;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct PoDraft {
    pub vendor_id: String,
    pub location: Option<String>,
    pub expected_delivery: Option<TimeStamp>,
    pub tax: Amount,
    pub shipping: Amount,
    pub items: Vec<PoItem>,
}

pub struct PurchaseOrderService {
    context: Arc<EngineContext>,
}

// permission each action needs once the order exists
fn permission(action: PoAction) -> Action {
    match action {
        PoAction::Submit => Action::Create,
        PoAction::Approve => Action::Approve,
        PoAction::MarkOrdered => Action::Update,
        PoAction::Receive => Action::Receive,
        PoAction::Close => Action::Close,
        PoAction::Cancel => Action::Cancel,
    }
}

fn check_status(po: &PurchaseOrder, action: PoAction, verb: &'static str) -> WorkflowResult<()> {
    if po.status.allows(action) {
        return Ok(());
    }
    Err(WorkflowError::invalid_status(
        "purchase order",
        &po.po_number,
        po.status,
        verb,
    ))
}

impl PurchaseOrderService {
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self { context }
    }

    fn load(&self, tx: &TransactionalTree, po_number: &str) -> TxResult<PurchaseOrder> {
        store::require(tx, "purchase order", &keys::purchase_order(po_number), po_number)
    }

    fn authorize(&self, actor: &Actor, action: Action) -> WorkflowResult<()> {
        self.context
            .authorize(actor, Module::Purchasing, action, &ScopeContext::global())
    }

    /// Load, check, mutate and save one order in a single transaction.
    /// Status is checked before the actor's permission.
    fn update<F>(
        &self,
        po_number: &str,
        actor: &Actor,
        action: PoAction,
        verb: &'static str,
        f: F,
    ) -> WorkflowResult<PurchaseOrder>
    where
        F: Fn(&mut PurchaseOrder),
    {
        self.context.store.transact(|tx| {
            let mut po = self.load(tx, po_number)?;
            check_status(&po, action, verb).or_abort()?;
            self.authorize(actor, permission(action)).or_abort()?;
            f(&mut po);
            store::save(tx, &keys::purchase_order(po_number), &po)?;
            Ok(po)
        })
    }

    pub fn create_draft(&self, actor: &Actor, draft: PoDraft) -> WorkflowResult<PurchaseOrder> {
        if draft.vendor_id.trim().is_empty() {
            return Err(WorkflowError::MissingRequiredField("vendor"));
        }
        if draft.items.is_empty() {
            return Err(WorkflowError::MissingRequiredField("items"));
        }
        let mut items = Vec::with_capacity(draft.items.len());
        for item in &draft.items {
            if !item.quantity_ordered.is_positive() {
                return Err(WorkflowError::quantity(
                    &item.item_id,
                    "ordered quantity must be positive",
                ));
            }
            ledger::non_negative(&item.item_id, "unit price", item.unit_price)?;
            items.push(PoItem::new(&item.item_id, item.quantity_ordered, item.unit_price));
        }
        ledger::distinct_items(draft.items.iter().map(|i| i.item_id.as_str()))?;
        ledger::non_negative(&draft.vendor_id, "tax", draft.tax)?;
        ledger::non_negative(&draft.vendor_id, "shipping", draft.shipping)?;
        self.authorize(actor, Action::Create)?;

        let now = self.context.now();
        let mut po = PurchaseOrder {
            id: self.context.new_id("po_")?,
            po_number: self.context.store.next_number("PO", now.year())?,
            vendor_id: draft.vendor_id,
            status: PoStatus::Draft,
            location: draft
                .location
                .unwrap_or_else(|| self.context.config.default_location.clone()),
            order_date: None,
            expected_delivery: draft.expected_delivery,
            subtotal: Amount::ZERO,
            tax: draft.tax,
            shipping: draft.shipping,
            total_amount: Amount::ZERO,
            created_by: actor.id.clone(),
            created_at: now,
            approved_by: None,
            approved_at: None,
            received_by: None,
            received_at: None,
            closed_at: None,
            cancel_reason: None,
            items,
        };
        po.recompute_totals();

        self.context.store.transact(|tx| {
            store::save(tx, &keys::purchase_order(&po.po_number), &po)?;
            Ok(())
        })?;
        info!(po = %po.po_number, total = %po.total_amount, "purchase order drafted");
        Ok(po)
    }

    pub fn submit(&self, po_number: &str, actor: &Actor) -> WorkflowResult<PurchaseOrder> {
        let po = self.update(po_number, actor, PoAction::Submit, "submit", |po| {
            po.status = PoStatus::Submitted;
        })?;
        info!(po = po_number, "purchase order submitted");
        Ok(po)
    }

    pub fn approve(&self, po_number: &str, approver: &Actor) -> WorkflowResult<PurchaseOrder> {
        let now = self.context.now();
        let po = self.update(po_number, approver, PoAction::Approve, "approve", |po| {
            po.status = PoStatus::Approved;
            po.approved_by = Some(approver.id.clone());
            po.approved_at = Some(now);
        })?;

        info!(po = po_number, approver = %approver.id, "purchase order approved");
        self.context.publish(&[DomainEvent::PurchaseOrderApproved {
            po_number: po.po_number.clone(),
            approver: approver.id.clone(),
        }]);
        Ok(po)
    }

    /// The order has gone to the vendor
    pub fn mark_ordered(&self, po_number: &str, actor: &Actor) -> WorkflowResult<PurchaseOrder> {
        let now = self.context.now();
        let po = self.update(po_number, actor, PoAction::MarkOrdered, "order", |po| {
            po.status = PoStatus::Ordered;
            po.order_date = Some(now);
        })?;
        info!(po = po_number, "purchase order placed with vendor");
        Ok(po)
    }

    /// Accumulate a delivery. Quantities are deltas; each line's running total
    /// may never pass what was ordered, and stock grows by exactly the delta.
    /// A delivery of nothing changes nothing.
    pub fn receive(
        &self,
        po_number: &str,
        received: &[LineQuantity],
        actor: &Actor,
    ) -> WorkflowResult<PurchaseOrder> {
        let now = self.context.now();

        let (po, changed) = self.context.store.transact(|tx| {
            let mut po = self.load(tx, po_number)?;
            check_status(&po, PoAction::Receive, "receive").or_abort()?;
            self.authorize(actor, permission(PoAction::Receive)).or_abort()?;

            let location = po.location.clone();
            let mut changed = false;
            for line in received {
                let Some(item) = po.item_mut(&line.item_id) else {
                    return fail(WorkflowError::not_found("purchase order item", &line.item_id));
                };
                let next = ledger::receive_quantity(
                    &item.item_id,
                    item.quantity_ordered,
                    item.quantity_received,
                    line.quantity,
                )
                .or_abort()?;
                if line.quantity.is_zero() {
                    continue;
                }
                move_stock(tx, &item.item_id, &location, line.quantity, now)?;
                item.quantity_received = next;
                changed = true;
            }
            if !changed {
                return Ok((po, false));
            }

            match po.progress() {
                ReceiptProgress::Complete => po.status = PoStatus::Received,
                ReceiptProgress::Partial => po.status = PoStatus::PartiallyReceived,
                ReceiptProgress::Nothing => {}
            }
            po.received_by = Some(actor.id.clone());
            po.received_at = Some(now);
            store::save(tx, &keys::purchase_order(po_number), &po)?;
            Ok((po, true))
        })?;

        if changed {
            let fully_received = po.status == PoStatus::Received;
            info!(po = po_number, status = %po.status, "purchase order receipt recorded");
            self.context.publish(&[DomainEvent::PurchaseOrderReceived {
                po_number: po.po_number.clone(),
                fully_received,
            }]);
        }
        Ok(po)
    }

    pub fn close(&self, po_number: &str, actor: &Actor) -> WorkflowResult<PurchaseOrder> {
        let now = self.context.now();
        let po = self.update(po_number, actor, PoAction::Close, "close", |po| {
            po.status = PoStatus::Closed;
            po.closed_at = Some(now);
        })?;
        info!(po = po_number, "purchase order closed");
        Ok(po)
    }

    /// Only before any goods have arrived
    pub fn cancel(
        &self,
        po_number: &str,
        actor: &Actor,
        reason: &str,
    ) -> WorkflowResult<PurchaseOrder> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::MissingRequiredField("reason"));
        }
        let now = self.context.now();
        let po = self.update(po_number, actor, PoAction::Cancel, "cancel", |po| {
            po.status = PoStatus::Cancelled;
            po.cancel_reason = Some(reason.to_string());
            po.closed_at = Some(now);
        })?;
        info!(po = po_number, "purchase order cancelled");
        Ok(po)
    }

    pub fn purchase_order(&self, po_number: &str) -> WorkflowResult<PurchaseOrder> {
        self.context
            .store
            .get(&keys::purchase_order(po_number))?
            .ok_or_else(|| WorkflowError::not_found("purchase order", po_number))
    }
}
