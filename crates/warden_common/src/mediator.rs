//! Action Mediator - validates and executes operator-requested transitions.
//!
//! Pipeline: Requested -> Validated -> Executing -> {Succeeded, Rejected, Failed}.
//! The whole pipeline runs under one process-wide lock. Policy rejections never
//! reach the supervisor; supervisor failures come back as structured outcomes.
//! Nothing is retried.

use crate::catalog::Catalog;
use crate::error::SupervisorError;
use crate::reconcile::Reconciler;
use crate::supervisor::{Supervisor, SupervisorAction};
use crate::types::{
    ActionRecord, ActionResult, Scope, ServiceOperation, ServiceStatus, Tracking,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Phrase an operator must type before a critical guard override is honored
pub const CRITICAL_OVERRIDE_PHRASE: &str = "I ASSUME THE RISK";

/// Operator request for one transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub identifier: String,
    pub operation: ServiceOperation,
    /// Allow stop/disable of a critical service
    #[serde(default)]
    pub override_critical_guard: bool,
    /// Allow acting on a service absent from the catalog
    #[serde(default)]
    pub acknowledge_untracked: bool,
}

impl ActionRequest {
    pub fn new(identifier: &str, operation: ServiceOperation) -> Self {
        Self {
            identifier: identifier.to_string(),
            operation,
            override_critical_guard: false,
            acknowledge_untracked: false,
        }
    }

    pub fn with_override(mut self, override_critical_guard: bool) -> Self {
        self.override_critical_guard = override_critical_guard;
        self
    }

    pub fn untracked(mut self, acknowledge: bool) -> Self {
        self.acknowledge_untracked = acknowledge;
        self
    }
}

/// Internal guard refusal. Never reaches the supervisor.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum PolicyRejection {
    #[error("'{identifier}' is not a known service")]
    UnknownService { identifier: String },

    #[error("'{identifier}' is not in the catalog; acknowledge it as untracked to act on it")]
    UntrackedNotAcknowledged { identifier: String },

    #[error("'{identifier}' is critical; refusing to {operation} it without an explicit override")]
    CriticalGuard {
        identifier: String,
        operation: ServiceOperation,
    },

    #[error("'{identifier}' is not loaded; nothing to restart")]
    NotLoaded { identifier: String },
}

/// Why a request was not planned
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionRefusal {
    #[error(transparent)]
    Policy(#[from] PolicyRejection),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Terminal state of a mediated action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Disposition {
    /// `noop` when the service was already in the requested state
    Succeeded { noop: bool },
    Rejected { rejection: PolicyRejection },
    Failed {
        error: SupervisorError,
        /// Supervisor call that failed
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<SupervisorAction>,
    },
}

impl Disposition {
    pub fn result(&self) -> ActionResult {
        match self {
            Disposition::Succeeded { .. } => ActionResult::Succeeded,
            Disposition::Rejected { .. } => ActionResult::Rejected,
            Disposition::Failed { .. } => ActionResult::Failed,
        }
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            Disposition::Succeeded { .. } => None,
            Disposition::Rejected { rejection } => Some(rejection.to_string()),
            Disposition::Failed { error, .. } => Some(error.to_string()),
        }
    }
}

/// Validated, not yet executed action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionPlan {
    pub request_id: Uuid,
    pub identifier: String,
    pub scope: Scope,
    pub tracking: Tracking,
    pub operation: ServiceOperation,
    /// Supervisor calls in execution order; empty for a no-op
    pub steps: Vec<SupervisorAction>,
    /// Shell equivalents of `steps`
    pub commands: Vec<String>,
    /// Status the plan was computed against
    pub current: ServiceStatus,
}

impl ActionPlan {
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Result of a mediated action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub request_id: Uuid,
    pub identifier: String,
    pub operation: ServiceOperation,
    /// None when the identifier could not be resolved to a scope
    pub scope: Option<Scope>,
    pub disposition: Disposition,
    /// Supervisor calls that completed
    pub executed: Vec<SupervisorAction>,
    /// Status after the action, re-reconciled unless the request was rejected
    pub status: Option<ServiceStatus>,
    /// The one operation that undoes this action, when it changed anything
    pub reverse: Option<ServiceOperation>,
    pub finished_at: DateTime<Utc>,
}

impl ActionOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.disposition, Disposition::Succeeded { .. })
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.disposition, Disposition::Succeeded { noop: true })
    }

    pub fn record(&self) -> ActionRecord {
        ActionRecord {
            request_id: self.request_id,
            operation: self.operation,
            result: self.disposition.result(),
            reason: self.disposition.reason(),
            at: self.finished_at,
        }
    }
}

/// Resolved action target
#[derive(Debug, Clone)]
struct Target {
    identifier: String,
    scope: Scope,
    tracking: Tracking,
    critical: bool,
}

pub struct ActionMediator {
    catalog: Arc<Catalog>,
    supervisor: Arc<dyn Supervisor>,
    reconciler: Reconciler,
    pipeline: Mutex<()>,
}

impl ActionMediator {
    pub fn new(catalog: Arc<Catalog>, supervisor: Arc<dyn Supervisor>) -> Self {
        let reconciler = Reconciler::new(catalog.clone(), supervisor.clone());
        Self {
            catalog,
            supervisor,
            reconciler,
            pipeline: Mutex::new(()),
        }
    }

    /// Validate a request and return the supervisor calls it would make, without making them
    pub async fn plan(&self, request: &ActionRequest) -> Result<ActionPlan, ActionRefusal> {
        let _guard = self.pipeline.lock().await;
        let request_id = Uuid::new_v4();
        let target = self.resolve_target(request).await?;
        self.check_guard(request, &target)?;
        self.build_plan(request_id, request, &target).await
    }

    /// Run the full pipeline for one request
    pub async fn submit(&self, request: &ActionRequest) -> ActionOutcome {
        let _guard = self.pipeline.lock().await;
        let request_id = Uuid::new_v4();
        debug!(
            "[{}] requested: {} {}",
            request_id, request.operation, request.identifier
        );

        let target = match self.resolve_target(request).await {
            Ok(target) => target,
            Err(ActionRefusal::Policy(rejection)) => {
                return self.rejected(request_id, request, None, rejection)
            }
            Err(ActionRefusal::Supervisor(error)) => {
                warn!("[{}] cannot locate {}: {}", request_id, request.identifier, error);
                let disposition = Disposition::Failed { error, step: None };
                return self.finish(request_id, request, None, disposition, vec![], None);
            }
        };

        if let Err(rejection) = self.check_guard(request, &target) {
            return self.rejected(request_id, request, Some(target.scope), rejection);
        }

        let plan = match self.build_plan(request_id, request, &target).await {
            Ok(plan) => plan,
            Err(ActionRefusal::Policy(rejection)) => {
                return self.rejected(request_id, request, Some(target.scope), rejection)
            }
            Err(ActionRefusal::Supervisor(error)) => {
                return self.finish(
                    request_id,
                    request,
                    Some(target.scope),
                    Disposition::Failed { error, step: None },
                    vec![],
                    None,
                )
            }
        };
        debug!("[{}] validated: {:?}", request_id, plan.steps);

        if plan.is_noop() {
            info!(
                "[{}] {} already {}, nothing to do",
                request_id,
                target.identifier,
                request.operation.past_tense()
            );
            return self.finish(
                request_id,
                request,
                Some(target.scope),
                Disposition::Succeeded { noop: true },
                vec![],
                Some(plan.current),
            );
        }

        let mut executed = Vec::with_capacity(plan.steps.len());
        let mut failure = None;
        for step in &plan.steps {
            debug!("[{}] executing {} {}", request_id, step, target.identifier);
            match self.supervisor.execute(*step, &target.identifier, target.scope).await {
                Ok(()) => executed.push(*step),
                Err(error) => {
                    warn!(
                        "[{}] {} {} failed: {}",
                        request_id, step, target.identifier, error
                    );
                    failure = Some(Disposition::Failed {
                        error,
                        step: Some(*step),
                    });
                    break;
                }
            }
        }

        let disposition = failure.unwrap_or(Disposition::Succeeded { noop: false });
        if disposition.result() == ActionResult::Succeeded {
            info!(
                "[{}] {} {}",
                request_id,
                target.identifier,
                request.operation.past_tense()
            );
        }

        let refreshed = self
            .reconciler
            .reconcile_one(&target.identifier, target.scope, target.tracking)
            .await;
        self.finish(
            request_id,
            request,
            Some(target.scope),
            disposition,
            executed,
            Some(refreshed),
        )
    }

    async fn resolve_target(&self, request: &ActionRequest) -> Result<Target, ActionRefusal> {
        if let Some(def) = self.catalog.get(&request.identifier) {
            return Ok(Target {
                identifier: def.identifier.clone(),
                scope: def.scope,
                tracking: Tracking::Cataloged,
                critical: def.is_critical(),
            });
        }

        if !request.acknowledge_untracked {
            return Err(PolicyRejection::UntrackedNotAcknowledged {
                identifier: request.identifier.clone(),
            }
            .into());
        }

        match self.reconciler.locate(&request.identifier).await? {
            Some(scope) => Ok(Target {
                identifier: request.identifier.clone(),
                scope,
                tracking: Tracking::Untracked,
                critical: false,
            }),
            None => Err(PolicyRejection::UnknownService {
                identifier: request.identifier.clone(),
            }
            .into()),
        }
    }

    /// Critical + stop/disable needs the override. Checked before any supervisor read.
    fn check_guard(&self, request: &ActionRequest, target: &Target) -> Result<(), PolicyRejection> {
        if !(target.critical && request.operation.is_destructive()) {
            return Ok(());
        }
        if !request.override_critical_guard {
            return Err(PolicyRejection::CriticalGuard {
                identifier: target.identifier.clone(),
                operation: request.operation,
            });
        }
        warn!(
            "Critical guard overridden: {} {}",
            request.operation, target.identifier
        );
        Ok(())
    }

    async fn build_plan(
        &self,
        request_id: Uuid,
        request: &ActionRequest,
        target: &Target,
    ) -> Result<ActionPlan, ActionRefusal> {
        let current = self
            .reconciler
            .reconcile_one(&target.identifier, target.scope, target.tracking)
            .await;
        let steps = steps_for(request.operation, &current)?;
        let commands = steps
            .iter()
            .map(|s| self.supervisor.command_line(*s, &target.identifier, target.scope))
            .collect();
        Ok(ActionPlan {
            request_id,
            identifier: target.identifier.clone(),
            scope: target.scope,
            tracking: target.tracking,
            operation: request.operation,
            steps,
            commands,
            current,
        })
    }

    fn rejected(
        &self,
        request_id: Uuid,
        request: &ActionRequest,
        scope: Option<Scope>,
        rejection: PolicyRejection,
    ) -> ActionOutcome {
        info!("[{}] rejected: {}", request_id, rejection);
        self.finish(
            request_id,
            request,
            scope,
            Disposition::Rejected { rejection },
            vec![],
            None,
        )
    }

    fn finish(
        &self,
        request_id: Uuid,
        request: &ActionRequest,
        scope: Option<Scope>,
        disposition: Disposition,
        executed: Vec<SupervisorAction>,
        status: Option<ServiceStatus>,
    ) -> ActionOutcome {
        let reverse = match disposition {
            Disposition::Succeeded { noop: false } => request.operation.inverse(),
            _ => None,
        };
        let mut outcome = ActionOutcome {
            request_id,
            identifier: request.identifier.clone(),
            operation: request.operation,
            scope,
            disposition,
            executed,
            status: None,
            reverse,
            finished_at: Utc::now(),
        };
        let record = outcome.record();
        outcome.status = status.map(|s| s.with_last_action(record));
        outcome
    }
}

/// Supervisor calls needed to move `current` to the requested state.
///
/// An `Unknown` status cannot prove a no-op, so the full mapping is issued and
/// the supervisor decides.
pub fn steps_for(
    operation: ServiceOperation,
    current: &ServiceStatus,
) -> Result<Vec<SupervisorAction>, PolicyRejection> {
    let state = current.state();
    let steps = match operation {
        ServiceOperation::Start => {
            // launchd refuses to bootstrap a disabled job, so enable goes first
            let mut steps = Vec::new();
            if state.map_or(true, |s| !s.enabled) {
                steps.push(SupervisorAction::Enable);
            }
            if state.map_or(true, |s| !s.loaded) {
                steps.push(SupervisorAction::Load);
            }
            steps
        }
        ServiceOperation::Stop => match state {
            Some(s) if !s.loaded => vec![],
            _ => vec![SupervisorAction::Unload],
        },
        ServiceOperation::Restart => match state {
            Some(s) if !s.loaded => {
                return Err(PolicyRejection::NotLoaded {
                    identifier: current.identifier.clone(),
                })
            }
            _ => vec![SupervisorAction::Restart],
        },
        ServiceOperation::Enable => match state {
            Some(s) if s.enabled => vec![],
            _ => vec![SupervisorAction::Enable],
        },
        ServiceOperation::Disable => match state {
            Some(s) if !s.enabled => vec![],
            _ => vec![SupervisorAction::Disable],
        },
    };
    Ok(steps)
}
