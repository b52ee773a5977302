//! launchwarden core - service state reconciliation and control for launchd.
//!
//! Catalog + supervisor -> reconciler -> (query façade, action mediator).

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod mediator;
pub mod privilege;
pub mod query;
pub mod reconcile;
pub mod supervisor;
pub mod types;

pub use catalog::Catalog;
pub use config::Config;
pub use engine::ServiceEngine;
pub use error::{CatalogError, ConfigError, SupervisorError};
pub use mediator::{
    ActionOutcome, ActionPlan, ActionRefusal, ActionRequest, Disposition, PolicyRejection,
    CRITICAL_OVERRIDE_PHRASE,
};
pub use query::{ListOrder, ServiceFilter, StatusPredicate};
pub use reconcile::{Snapshot, SnapshotEntry};
pub use supervisor::{RunState, Supervisor, SupervisorAction};
pub use types::*;
