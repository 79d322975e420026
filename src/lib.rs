//! School asset inventory workflows over a sled store:
//! borrow/return assignments, stationary requisitions, purchase orders and
//! support tickets with SLA tracking.

pub mod assignment;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod purchase_order;
pub mod requisition;
pub mod service;
pub mod sla;
pub mod store;
pub mod ticket;
pub mod types;
pub mod utils;

pub use error::{ErrorKind, WorkflowError, WorkflowResult};
pub use service::{Engine, EngineContext};
