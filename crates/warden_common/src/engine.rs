//! Service engine: catalog, reconciler, mediator and façade wired together.

use crate::catalog::Catalog;
use crate::mediator::{ActionMediator, ActionOutcome, ActionPlan, ActionRefusal, ActionRequest};
use crate::query::{QueryFacade, ServiceFilter};
use crate::reconcile::{Reconciler, Snapshot, SnapshotEntry};
use crate::supervisor::Supervisor;
use crate::types::{Scope, ServiceOperation};
use std::sync::Arc;
use tracing::debug;

pub struct ServiceEngine {
    catalog: Arc<Catalog>,
    supervisor: Arc<dyn Supervisor>,
    query: QueryFacade,
    mediator: ActionMediator,
}

impl ServiceEngine {
    pub fn new(catalog: Catalog, supervisor: Arc<dyn Supervisor>) -> Self {
        let catalog = Arc::new(catalog);
        let reconciler = Reconciler::new(catalog.clone(), supervisor.clone());
        debug!("Engine ready with {} cataloged services", catalog.len());
        Self {
            query: QueryFacade::new(reconciler),
            mediator: ActionMediator::new(catalog.clone(), supervisor.clone()),
            catalog,
            supervisor,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn supervisor(&self) -> &dyn Supervisor {
        self.supervisor.as_ref()
    }

    pub fn query(&self) -> &QueryFacade {
        &self.query
    }

    /// Ordered (definition, status) pairs matching `filter`, freshly reconciled
    pub async fn list_services(&self, filter: &ServiceFilter) -> Vec<SnapshotEntry> {
        self.query.list(filter).await
    }

    pub async fn snapshot(&self, scopes: &[Scope], include_untracked: bool) -> Snapshot {
        self.query.refresh(scopes, include_untracked).await
    }

    pub async fn request_action(
        &self,
        identifier: &str,
        operation: ServiceOperation,
        override_critical_guard: bool,
    ) -> ActionOutcome {
        let request = ActionRequest::new(identifier, operation).with_override(override_critical_guard);
        self.submit(&request).await
    }

    /// Mediate a request; the refreshed status replaces the cached one
    pub async fn submit(&self, request: &ActionRequest) -> ActionOutcome {
        let outcome = self.mediator.submit(request).await;
        if let Some(status) = &outcome.status {
            self.query.remember(status.clone());
        }
        outcome
    }

    /// Dry run: validated plan without execution
    pub async fn plan(&self, request: &ActionRequest) -> Result<ActionPlan, ActionRefusal> {
        self.mediator.plan(request).await
    }
}
