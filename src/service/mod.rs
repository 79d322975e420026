//! Service layer API: one engine per workflow, all sharing the same ports
pub mod assignment;
pub mod inventory;
pub mod purchase_order;
pub mod requisition;
pub mod ticket;

use super::auth::{Action, Authorizer, Module, ScopeContext};
use super::clock::{Clock, SystemClock};
use super::config::EngineConfig;
use super::error::{WorkflowError, WorkflowResult};
use super::events::{self, DomainEvent, LogNotifier, Notifier};
use super::store::Store;
use super::types::{Actor, TimeStamp};
use super::utils;
use std::sync::Arc;

pub use assignment::{AssignmentService, ReturnLine};
pub use inventory::InventoryService;
pub use purchase_order::{PoDraft, PurchaseOrderService};
pub use requisition::{RequisitionDraft, RequisitionService};
pub use ticket::{NewTicket, TicketService, TicketView};

/// Ports and storage shared by every engine
pub struct EngineContext {
    pub(crate) store: Store,
    pub(crate) config: EngineConfig,
    clock: Arc<dyn Clock>,
    authorizer: Arc<dyn Authorizer>,
    notifier: Arc<dyn Notifier>,
}

impl EngineContext {
    /// Defaults: system clock, the config's role matrix, log-only notifications.
    pub fn new(instance: Arc<sled::Db>, config: EngineConfig) -> Self {
        Self {
            store: Store::new(instance, config.storage_retries),
            authorizer: Arc::new(config.policy()),
            clock: Arc::new(SystemClock),
            notifier: Arc::new(LogNotifier),
            config,
        }
    }
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn now(&self) -> TimeStamp {
        self.clock.now()
    }

    pub(crate) fn authorize(
        &self,
        actor: &Actor,
        module: Module,
        action: Action,
        scope: &ScopeContext,
    ) -> WorkflowResult<()> {
        if self.authorizer.can_perform(actor, module, action, scope) {
            return Ok(());
        }
        Err(WorkflowError::PermissionDenied {
            actor: actor.id.clone(),
            module: module.to_string(),
            action: action.to_string(),
        })
    }

    pub(crate) fn require_module(&self, actor: &Actor, module: Module) -> WorkflowResult<()> {
        if self.authorizer.has_module_access(actor, module) {
            return Ok(());
        }
        Err(WorkflowError::PermissionDenied {
            actor: actor.id.clone(),
            module: module.to_string(),
            action: "access".to_string(),
        })
    }

    /// Only called once the state change has committed
    pub(crate) fn publish(&self, events: &[DomainEvent]) {
        events::dispatch(self.notifier.as_ref(), events);
    }

    pub(crate) fn new_id(&self, hrp: &str) -> WorkflowResult<String> {
        Ok(utils::new_uuid_to_bech32(hrp)?)
    }
}

/// Every engine over one shared context
pub struct Engine {
    pub inventory: InventoryService,
    pub assignments: AssignmentService,
    pub requisitions: RequisitionService,
    pub purchase_orders: PurchaseOrderService,
    pub tickets: TicketService,
}

impl Engine {
    pub fn new(context: EngineContext) -> Self {
        let context = Arc::new(context);
        Self {
            inventory: InventoryService::new(context.clone()),
            assignments: AssignmentService::new(context.clone()),
            requisitions: RequisitionService::new(context.clone()),
            purchase_orders: PurchaseOrderService::new(context.clone()),
            tickets: TicketService::new(context),
        }
    }
}
