//! Asset registry and per-location stock levels
use super::EngineContext;
use crate::assignment::{Asset, AssetCategory, AssetStatus};
use crate::auth::{Action, Module, ScopeContext};
use crate::error::{WorkflowError, WorkflowResult};
use crate::ledger::{self, StockLevel};
use crate::store::{self, OrAbort, TxResult, fail, keys};
use crate::types::{Actor, Amount, TimeStamp};
use sled::transaction::TransactionalTree;
use std::sync::Arc;
use tracing::info;

pub struct InventoryService {
    context: Arc<EngineContext>,
}

/// Move stock on one item/location row inside the caller's transaction.
/// Receipts pass a positive delta, issues a negative one.
pub(crate) fn move_stock(
    tx: &TransactionalTree,
    item_id: &str,
    location: &str,
    delta: Amount,
    now: TimeStamp,
) -> TxResult<StockLevel> {
    let key = keys::stock(item_id, location);
    let mut level = store::load(tx, &key)?.unwrap_or_else(|| StockLevel::empty(item_id, location, now));
    level.apply(delta, now).or_abort()?;
    store::save(tx, &key, &level)?;
    Ok(level)
}

impl InventoryService {
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self { context }
    }

    pub fn register_asset(
        &self,
        actor: &Actor,
        asset_id: &str,
        name: &str,
        category: AssetCategory,
    ) -> WorkflowResult<Asset> {
        if asset_id.trim().is_empty() {
            return Err(WorkflowError::MissingRequiredField("asset id"));
        }
        self.context
            .authorize(actor, Module::Assets, Action::Create, &ScopeContext::global())?;
        let now = self.context.now();

        let asset = self.context.store.transact(|tx| {
            let key = keys::asset(asset_id);
            if let Some(existing) = store::load::<Asset>(tx, &key)? {
                return fail(WorkflowError::invalid_status(
                    "asset",
                    asset_id,
                    existing.status,
                    "register",
                ));
            }
            let asset = Asset {
                id: asset_id.to_string(),
                name: name.to_string(),
                category,
                status: AssetStatus::Available,
                borrow_item_id: None,
                updated_at: now,
            };
            store::save(tx, &key, &asset)?;
            Ok(asset)
        })?;

        info!(asset = asset_id, "asset registered");
        Ok(asset)
    }

    pub fn asset(&self, asset_id: &str) -> WorkflowResult<Asset> {
        self.context
            .store
            .get(&keys::asset(asset_id))?
            .ok_or_else(|| WorkflowError::not_found("asset", asset_id))
    }

    /// Back into the pool after repair
    pub fn restore_asset(&self, actor: &Actor, asset_id: &str) -> WorkflowResult<Asset> {
        self.context
            .authorize(actor, Module::Assets, Action::Update, &ScopeContext::global())?;
        let now = self.context.now();

        self.context.store.transact(|tx| {
            let key = keys::asset(asset_id);
            let mut asset: Asset = store::require(tx, "asset", &key, asset_id)?;
            if asset.status != AssetStatus::Maintenance {
                return fail(WorkflowError::invalid_status(
                    "asset",
                    asset_id,
                    asset.status,
                    "restore",
                ));
            }
            asset.status = AssetStatus::Available;
            asset.updated_at = now;
            store::save(tx, &key, &asset)?;
            Ok(asset)
        })
    }

    /// Opening balance or stock-take figure
    pub fn set_stock(
        &self,
        actor: &Actor,
        item_id: &str,
        location: &str,
        on_hand: Amount,
    ) -> WorkflowResult<StockLevel> {
        ledger::non_negative(item_id, "on hand", on_hand)?;
        self.context
            .authorize(actor, Module::Stationary, Action::Update, &ScopeContext::global())?;
        let now = self.context.now();

        let level = self.context.store.transact(|tx| {
            let level = StockLevel {
                item_id: item_id.to_string(),
                location: location.to_string(),
                on_hand,
                updated_at: now,
            };
            store::save(tx, &keys::stock(item_id, location), &level)?;
            Ok(level)
        })?;

        info!(item = item_id, location, on_hand = %on_hand, "stock level set");
        Ok(level)
    }

    pub fn adjust_stock(
        &self,
        actor: &Actor,
        item_id: &str,
        location: &str,
        delta: Amount,
    ) -> WorkflowResult<StockLevel> {
        self.context
            .authorize(actor, Module::Stationary, Action::Update, &ScopeContext::global())?;
        let now = self.context.now();

        self.context
            .store
            .transact(|tx| move_stock(tx, item_id, location, delta, now))
    }

    /// Rows that were never touched read as zero
    pub fn stock_level(&self, item_id: &str, location: &str) -> WorkflowResult<StockLevel> {
        Ok(self
            .context
            .store
            .get(&keys::stock(item_id, location))?
            .unwrap_or_else(|| StockLevel::empty(item_id, location, self.context.now())))
    }
}
