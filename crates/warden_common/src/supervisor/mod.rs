//! Supervisor boundary.
//!
//! Production code talks to launchd through [`LaunchctlSupervisor`]; tests use
//! [`FakeSupervisor`], which keeps scripted state in memory and records every call.
//! Each method is a single attempt: retries are never made at this layer.

pub mod fake;
pub mod launchctl;

pub use fake::{FakeService, FakeSupervisor, SupervisorCall};
pub use launchctl::LaunchctlSupervisor;

use crate::error::SupervisorError;
use crate::types::Scope;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Run state of a single service as reported by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running { pid: Option<u32> },
    /// Loaded, no active process
    Idle,
    /// Supervisor has no record of the service
    NotFound,
}

/// Imperative supervisor command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorAction {
    Load,
    Unload,
    Enable,
    Disable,
    /// Atomic kill-and-restart
    Restart,
}

impl SupervisorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorAction::Load => "load",
            SupervisorAction::Unload => "unload",
            SupervisorAction::Enable => "enable",
            SupervisorAction::Disable => "disable",
            SupervisorAction::Restart => "restart",
        }
    }
}

impl fmt::Display for SupervisorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Narrow command interface to the external service-control authority
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Labels the supervisor currently has loaded in `scope`
    async fn list_loaded(&self, scope: Scope) -> Result<BTreeSet<String>, SupervisorError>;

    /// Run state of one service
    async fn query_run_state(
        &self,
        identifier: &str,
        scope: Scope,
    ) -> Result<RunState, SupervisorError>;

    /// Administrative overrides for `scope`: label -> disabled. Absent labels are enabled.
    async fn disabled_overrides(
        &self,
        scope: Scope,
    ) -> Result<HashMap<String, bool>, SupervisorError>;

    /// Issue one imperative command
    async fn execute(
        &self,
        action: SupervisorAction,
        identifier: &str,
        scope: Scope,
    ) -> Result<(), SupervisorError>;

    /// Shell-equivalent rendering of a command, for dry runs and manual-fix hints
    fn command_line(&self, action: SupervisorAction, identifier: &str, scope: Scope) -> String {
        format!("{} {}/{}", action, scope, identifier)
    }

    async fn load(&self, identifier: &str, scope: Scope) -> Result<(), SupervisorError> {
        self.execute(SupervisorAction::Load, identifier, scope).await
    }

    async fn unload(&self, identifier: &str, scope: Scope) -> Result<(), SupervisorError> {
        self.execute(SupervisorAction::Unload, identifier, scope).await
    }

    async fn enable(&self, identifier: &str, scope: Scope) -> Result<(), SupervisorError> {
        self.execute(SupervisorAction::Enable, identifier, scope).await
    }

    async fn disable(&self, identifier: &str, scope: Scope) -> Result<(), SupervisorError> {
        self.execute(SupervisorAction::Disable, identifier, scope).await
    }

    async fn restart(&self, identifier: &str, scope: Scope) -> Result<(), SupervisorError> {
        self.execute(SupervisorAction::Restart, identifier, scope).await
    }
}
