//! Assignment -> Borrow -> Return engine
use super::EngineContext;
use crate::assignment::{
    Asset, AssetStatus, Assignment, AssignmentStatus, BorrowItem, BorrowTransaction,
    ReturnCondition, ReturnItem, ReturnTransaction, SignatureToken,
};
use crate::auth::{Action, Module, ScopeContext};
use crate::error::{WorkflowError, WorkflowResult};
use crate::events::DomainEvent;
use crate::store::{self, OrAbort, fail, keys};
use crate::types::{Actor, Amount};
use crate::utils::token_digest;
use chrono::Duration;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// One physical item being checked back in
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnLine {
    pub borrow_item_id: String,
    pub condition: ReturnCondition,
    pub damage_charge: Amount,
    pub notes: Option<String>,
}

impl ReturnLine {
    pub fn new(borrow_item_id: &str, condition: ReturnCondition) -> Self {
        Self {
            borrow_item_id: borrow_item_id.to_string(),
            condition,
            damage_charge: Amount::ZERO,
            notes: None,
        }
    }
    pub fn with_charge(mut self, charge: Amount) -> Self {
        self.damage_charge = charge;
        self
    }
    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }

    fn validate(&self) -> WorkflowResult<()> {
        if self.damage_charge.is_negative() {
            return Err(WorkflowError::quantity(
                &self.borrow_item_id,
                "damage charge cannot be negative",
            ));
        }
        if self.damage_charge.is_positive() && !self.condition.allows_charge() {
            return Err(WorkflowError::quantity(
                &self.borrow_item_id,
                format!("no damage charge allowed for a {:?} return", self.condition),
            ));
        }
        Ok(())
    }
}

pub struct AssignmentService {
    context: Arc<EngineContext>,
}

impl AssignmentService {
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self { context }
    }

    /// Returns the user's current active assignment, or opens one.
    pub fn open_assignment(
        &self,
        user_id: &str,
        academic_year: &str,
        term: &str,
        actor: &Actor,
    ) -> WorkflowResult<Assignment> {
        self.context.authorize(
            actor,
            Module::Borrow,
            Action::Create,
            &ScopeContext::owned_by(user_id),
        )?;
        let id = self.context.new_id("asg_")?;
        let now = self.context.now();

        self.context.store.transact(|tx| {
            let user_key = keys::assignment_user(user_id);
            if let Some(existing) = store::load::<String>(tx, &user_key)? {
                let current: Assignment =
                    store::require(tx, "assignment", &keys::assignment(&existing), &existing)?;
                if current.status == AssignmentStatus::Active {
                    return Ok(current);
                }
            }
            let assignment = Assignment::new(id.clone(), user_id, academic_year, term, &actor.id, now);
            store::save(tx, &keys::assignment(&assignment.id), &assignment)?;
            store::save(tx, &user_key, &assignment.id)?;
            Ok(assignment)
        })
    }

    /// Hand out a batch of assets on an active assignment.
    pub fn add_borrow_transaction(
        &self,
        assignment_id: &str,
        asset_ids: &[String],
        actor: &Actor,
    ) -> WorkflowResult<BorrowTransaction> {
        if asset_ids.is_empty() {
            return Err(WorkflowError::MissingRequiredField("items"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = asset_ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(WorkflowError::AssetUnavailable(dup.clone()));
        }

        let now = self.context.now();
        let transaction_id = self.context.new_id("btx_")?;
        let item_ids = asset_ids
            .iter()
            .map(|_| self.context.new_id("bi_"))
            .collect::<WorkflowResult<Vec<_>>>()?;
        let number = self.context.store.next_number("BRW", now.year())?;

        let (transaction, user_id) = self.context.store.transact(|tx| {
            let key = keys::assignment(assignment_id);
            let mut assignment: Assignment = store::require(tx, "assignment", &key, assignment_id)?;
            if assignment.status != AssignmentStatus::Active {
                return fail(WorkflowError::invalid_status(
                    "assignment",
                    assignment_id,
                    assignment.status,
                    "borrow on",
                ));
            }
            self.context
                .authorize(
                    actor,
                    Module::Borrow,
                    Action::Create,
                    &ScopeContext::owned_by(&assignment.user_id),
                )
                .or_abort()?;

            let mut items = Vec::with_capacity(asset_ids.len());
            for (asset_id, item_id) in asset_ids.iter().zip(&item_ids) {
                let asset_key = keys::asset(asset_id);
                let mut asset: Asset = store::require(tx, "asset", &asset_key, asset_id)?;
                if asset.status != AssetStatus::Available {
                    return fail(WorkflowError::AssetUnavailable(asset_id.clone()));
                }
                asset.status = AssetStatus::Borrowed;
                asset.borrow_item_id = Some(item_id.clone());
                asset.updated_at = now;
                store::save(tx, &asset_key, &asset)?;

                items.push(BorrowItem {
                    id: item_id.clone(),
                    asset_id: asset_id.clone(),
                    transaction_id: transaction_id.clone(),
                });
            }

            let transaction = BorrowTransaction {
                id: transaction_id.clone(),
                assignment_id: assignment_id.to_string(),
                transaction_number: number.clone(),
                borrow_date: now,
                created_by: actor.id.clone(),
                is_signed: false,
                signature: None,
                signed_at: None,
                cancelled_at: None,
                cancelled_by: None,
                items,
            };
            assignment.borrows.push(transaction.clone());
            store::save(tx, &key, &assignment)?;
            store::save(tx, &keys::borrow_tx(&transaction_id), &assignment.id)?;
            Ok((transaction, assignment.user_id.clone()))
        })?;

        info!(
            assignment = assignment_id,
            transaction = %transaction.transaction_number,
            items = transaction.items.len(),
            "assets borrowed"
        );
        self.context.publish(&[DomainEvent::AssetsBorrowed {
            assignment_id: assignment_id.to_string(),
            transaction_id: transaction.id.clone(),
            transaction_number: transaction.transaction_number.clone(),
            user_id,
            asset_ids: transaction.asset_ids(),
        }]);
        Ok(transaction)
    }

    /// Mint the single-use credential behind a signature link. Only the
    /// digest is stored; the raw token goes back to the caller for delivery.
    pub fn issue_signature_token(
        &self,
        transaction_id: &str,
        actor: &Actor,
    ) -> WorkflowResult<String> {
        let token = self.context.new_id("sig_")?;
        let digest = token_digest(&token);
        let now = self.context.now();
        let expires_at = now.plus(Duration::minutes(
            self.context.config.signature_token_ttl_minutes,
        ));

        self.context.store.transact(|tx| {
            let assignment_id: String = store::require(
                tx,
                "borrow transaction",
                &keys::borrow_tx(transaction_id),
                transaction_id,
            )?;
            let assignment: Assignment =
                store::require(tx, "assignment", &keys::assignment(&assignment_id), &assignment_id)?;
            let Some(transaction) = assignment.transaction(transaction_id) else {
                return fail(WorkflowError::not_found("borrow transaction", transaction_id));
            };
            if transaction.is_cancelled() {
                return fail(WorkflowError::invalid_status(
                    "borrow transaction",
                    transaction_id,
                    "cancelled",
                    "sign",
                ));
            }
            if transaction.is_signed {
                return fail(WorkflowError::AlreadySigned(transaction_id.to_string()));
            }
            self.context
                .authorize(
                    actor,
                    Module::Borrow,
                    Action::Create,
                    &ScopeContext::owned_by(&assignment.user_id),
                )
                .or_abort()?;

            let record = SignatureToken {
                transaction_id: transaction_id.to_string(),
                assignment_id: assignment_id.clone(),
                expires_at,
                issued_by: actor.id.clone(),
            };
            store::save(tx, &keys::sig_token(&digest), &record)
        })?;

        Ok(token)
    }

    /// Borrower acknowledges receipt. Consumes the token.
    pub fn sign_borrow_transaction(
        &self,
        token: &str,
        signature: Vec<u8>,
    ) -> WorkflowResult<BorrowTransaction> {
        if signature.is_empty() {
            return Err(WorkflowError::MissingRequiredField("signature"));
        }
        let digest = token_digest(token);
        let now = self.context.now();

        let transaction = self.context.store.transact(|tx| {
            let token_key = keys::sig_token(&digest);
            let Some(record) = store::load::<SignatureToken>(tx, &token_key)? else {
                return fail(WorkflowError::InvalidOrExpiredToken);
            };
            if now >= record.expires_at {
                return fail(WorkflowError::InvalidOrExpiredToken);
            }

            let key = keys::assignment(&record.assignment_id);
            let mut assignment: Assignment =
                store::require(tx, "assignment", &key, &record.assignment_id)?;
            let Some(transaction) = assignment.transaction_mut(&record.transaction_id) else {
                return fail(WorkflowError::InvalidOrExpiredToken);
            };
            if transaction.is_cancelled() {
                return fail(WorkflowError::InvalidOrExpiredToken);
            }
            if transaction.is_signed {
                return fail(WorkflowError::AlreadySigned(transaction.id.clone()));
            }
            transaction.is_signed = true;
            transaction.signature = Some(signature.clone());
            transaction.signed_at = Some(now);
            let signed = transaction.clone();

            store::save(tx, &key, &assignment)?;
            store::delete(tx, &token_key)?;
            Ok(signed)
        })?;

        info!(transaction = %transaction.transaction_number, "borrow transaction signed");
        self.context.publish(&[DomainEvent::BorrowSigned {
            transaction_id: transaction.id.clone(),
            signed_at: now,
        }]);
        Ok(transaction)
    }

    /// Void an unsigned batch nobody has returned anything from, freeing its assets.
    pub fn cancel_borrow_transaction(
        &self,
        transaction_id: &str,
        actor: &Actor,
    ) -> WorkflowResult<BorrowTransaction> {
        let now = self.context.now();

        let transaction = self.context.store.transact(|tx| {
            let assignment_id: String = store::require(
                tx,
                "borrow transaction",
                &keys::borrow_tx(transaction_id),
                transaction_id,
            )?;
            let key = keys::assignment(&assignment_id);
            let mut assignment: Assignment = store::require(tx, "assignment", &key, &assignment_id)?;

            let returned: HashSet<String> = assignment
                .returned_ids()
                .into_iter()
                .map(str::to_string)
                .collect();
            let Some(transaction) = assignment.transaction(transaction_id) else {
                return fail(WorkflowError::not_found("borrow transaction", transaction_id));
            };
            if transaction.is_cancelled() {
                return fail(WorkflowError::invalid_status(
                    "borrow transaction",
                    transaction_id,
                    "cancelled",
                    "cancel",
                ));
            }
            if transaction.is_signed {
                return fail(WorkflowError::AlreadySigned(transaction_id.to_string()));
            }
            if let Some(item) = transaction.items.iter().find(|i| returned.contains(&i.id)) {
                return fail(WorkflowError::AlreadyReturned(item.id.clone()));
            }
            self.context
                .authorize(
                    actor,
                    Module::Borrow,
                    Action::Cancel,
                    &ScopeContext::owned_by(&assignment.user_id),
                )
                .or_abort()?;

            for item in &transaction.items {
                let asset_key = keys::asset(&item.asset_id);
                let mut asset: Asset = store::require(tx, "asset", &asset_key, &item.asset_id)?;
                if asset.borrow_item_id.as_deref() == Some(item.id.as_str()) {
                    asset.status = AssetStatus::Available;
                    asset.borrow_item_id = None;
                    asset.updated_at = now;
                    store::save(tx, &asset_key, &asset)?;
                }
            }

            let Some(transaction) = assignment.transaction_mut(transaction_id) else {
                return fail(WorkflowError::not_found("borrow transaction", transaction_id));
            };
            transaction.cancelled_at = Some(now);
            transaction.cancelled_by = Some(actor.id.clone());
            let cancelled = transaction.clone();
            store::save(tx, &key, &assignment)?;
            Ok(cancelled)
        })?;

        info!(transaction = %transaction.transaction_number, "borrow transaction cancelled");
        self.context.publish(&[DomainEvent::BorrowCancelled {
            transaction_id: transaction.id.clone(),
            released_assets: transaction.asset_ids(),
        }]);
        Ok(transaction)
    }

    /// Check in outstanding items as one return batch.
    pub fn process_return(
        &self,
        assignment_id: &str,
        lines: &[ReturnLine],
        checker: &Actor,
        checker_signature: Option<Vec<u8>>,
    ) -> WorkflowResult<ReturnTransaction> {
        if lines.is_empty() {
            return Err(WorkflowError::MissingRequiredField("returned items"));
        }
        let mut seen = HashSet::new();
        for line in lines {
            line.validate()?;
            if !seen.insert(line.borrow_item_id.as_str()) {
                return Err(WorkflowError::AlreadyReturned(line.borrow_item_id.clone()));
            }
        }

        let now = self.context.now();
        let return_id = self.context.new_id("rtx_")?;
        let item_ids = lines
            .iter()
            .map(|_| self.context.new_id("ri_"))
            .collect::<WorkflowResult<Vec<_>>>()?;

        let returned = self.context.store.transact(|tx| {
            let key = keys::assignment(assignment_id);
            let mut assignment: Assignment = store::require(tx, "assignment", &key, assignment_id)?;
            if assignment.status != AssignmentStatus::Active {
                return fail(WorkflowError::invalid_status(
                    "assignment",
                    assignment_id,
                    assignment.status,
                    "return to",
                ));
            }
            self.context
                .authorize(
                    checker,
                    Module::Borrow,
                    Action::Return,
                    &ScopeContext::owned_by(&assignment.user_id),
                )
                .or_abort()?;

            let already: HashSet<String> = assignment
                .returned_ids()
                .into_iter()
                .map(str::to_string)
                .collect();
            let mut items = Vec::with_capacity(lines.len());
            for (line, item_id) in lines.iter().zip(&item_ids) {
                if already.contains(&line.borrow_item_id) {
                    return fail(WorkflowError::AlreadyReturned(line.borrow_item_id.clone()));
                }
                let Some(borrowed) = assignment.find_borrow_item(&line.borrow_item_id) else {
                    return fail(WorkflowError::NotBorrowed(line.borrow_item_id.clone()));
                };

                let asset_key = keys::asset(&borrowed.asset_id);
                let mut asset: Asset = store::require(tx, "asset", &asset_key, &borrowed.asset_id)?;
                asset.status = line.condition.disposition();
                asset.borrow_item_id = None;
                asset.updated_at = now;
                store::save(tx, &asset_key, &asset)?;

                items.push(ReturnItem {
                    id: item_id.clone(),
                    borrow_item_id: borrowed.id.clone(),
                    asset_id: borrowed.asset_id.clone(),
                    condition: line.condition,
                    damage_charge: line.damage_charge,
                    notes: line.notes.clone(),
                });
            }

            let returned = ReturnTransaction {
                id: return_id.clone(),
                assignment_id: assignment_id.to_string(),
                return_date: now,
                checked_by: checker.id.clone(),
                checker_signature: checker_signature.clone(),
                items,
            };
            assignment.returns.push(returned.clone());
            store::save(tx, &key, &assignment)?;
            Ok(returned)
        })?;

        info!(
            assignment = assignment_id,
            items = returned.items.len(),
            damage = %returned.damage_total(),
            "assets returned"
        );
        self.context.publish(&[DomainEvent::AssetsReturned {
            assignment_id: assignment_id.to_string(),
            return_id: returned.id.clone(),
            asset_ids: returned.items.iter().map(|i| i.asset_id.clone()).collect(),
            damage_total: returned.damage_total(),
        }]);
        Ok(returned)
    }

    /// Close once everything has come back. An assignment that never lent
    /// anything stays active.
    pub fn close_assignment(&self, assignment_id: &str, actor: &Actor) -> WorkflowResult<Assignment> {
        let now = self.context.now();

        let assignment = self.context.store.transact(|tx| {
            let key = keys::assignment(assignment_id);
            let mut assignment: Assignment = store::require(tx, "assignment", &key, assignment_id)?;
            if assignment.status != AssignmentStatus::Active {
                return fail(WorkflowError::invalid_status(
                    "assignment",
                    assignment_id,
                    assignment.status,
                    "close",
                ));
            }
            self.context
                .authorize(
                    actor,
                    Module::Borrow,
                    Action::Close,
                    &ScopeContext::owned_by(&assignment.user_id),
                )
                .or_abort()?;
            if !assignment.has_history() {
                return fail(WorkflowError::NothingBorrowed(assignment_id.to_string()));
            }
            let outstanding = assignment.active_items().len();
            if outstanding > 0 {
                return fail(WorkflowError::ItemsStillOutstanding {
                    assignment: assignment_id.to_string(),
                    outstanding,
                });
            }

            assignment.status = AssignmentStatus::Closed;
            assignment.closed_at = Some(now);
            assignment.closed_by = Some(actor.id.clone());
            store::save(tx, &key, &assignment)?;

            let user_key = keys::assignment_user(&assignment.user_id);
            if store::load::<String>(tx, &user_key)?.as_deref() == Some(assignment_id) {
                store::delete(tx, &user_key)?;
            }
            Ok(assignment)
        })?;

        info!(assignment = assignment_id, "assignment closed");
        self.context.publish(&[DomainEvent::AssignmentClosed {
            assignment_id: assignment.id.clone(),
            user_id: assignment.user_id.clone(),
        }]);
        Ok(assignment)
    }

    pub fn assignment(&self, assignment_id: &str) -> WorkflowResult<Assignment> {
        self.context
            .store
            .get(&keys::assignment(assignment_id))?
            .ok_or_else(|| WorkflowError::not_found("assignment", assignment_id))
    }

    /// Recomputed from the stored batches on every call
    pub fn active_items(&self, assignment_id: &str) -> WorkflowResult<Vec<BorrowItem>> {
        let assignment = self.assignment(assignment_id)?;
        Ok(assignment.active_items().into_iter().cloned().collect())
    }

    pub fn active_assignment_for(&self, user_id: &str) -> WorkflowResult<Option<Assignment>> {
        match self
            .context
            .store
            .get::<String>(&keys::assignment_user(user_id))?
        {
            Some(id) => self.assignment(&id).map(Some),
            None => Ok(None),
        }
    }
}
