//! Query/Filter Façade - read-only projections for the presentation layer.
//!
//! Every projection reconciles fresh; `cached()` hands back the last snapshot
//! without touching the supervisor.

use crate::reconcile::{Reconciler, Snapshot, SnapshotEntry};
use crate::types::{Category, Scope, ServiceStatus, StatusLabel};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Status predicate. Unknown statuses never match the state-based predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusPredicate {
    Running,
    Enabled,
    Disabled,
    /// Known and not running
    Stopped,
    /// Catalog criticality, independent of observed state
    Critical,
}

impl StatusPredicate {
    pub fn matches(&self, entry: &SnapshotEntry) -> bool {
        let status = &entry.status;
        match self {
            StatusPredicate::Running => status.running() == Some(true),
            StatusPredicate::Enabled => status.enabled() == Some(true),
            StatusPredicate::Disabled => status.enabled() == Some(false),
            StatusPredicate::Stopped => status.running() == Some(false),
            StatusPredicate::Critical => entry.definition.is_critical(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListOrder {
    /// Category, then identifier
    #[default]
    Catalog,
    /// Running, enabled, disabled, unknown, then identifier
    Status,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceFilter {
    pub category: Option<Category>,
    pub scope: Option<Scope>,
    pub predicate: Option<StatusPredicate>,
    pub order: ListOrder,
}

impl ServiceFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn predicate(mut self, predicate: StatusPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn ordered(mut self, order: ListOrder) -> Self {
        self.order = order;
        self
    }

    /// Scopes that must be reconciled to answer this filter
    pub fn scopes(&self) -> Vec<Scope> {
        match self.scope {
            Some(scope) => vec![scope],
            None => Scope::ALL.to_vec(),
        }
    }

    pub fn matches(&self, entry: &SnapshotEntry) -> bool {
        self.category.map_or(true, |c| entry.definition.category == c)
            && self.scope.map_or(true, |s| entry.definition.scope == s)
            && self.predicate.map_or(true, |p| p.matches(entry))
    }

    /// Apply this filter and ordering to a snapshot
    pub fn apply(&self, snapshot: &Snapshot) -> Vec<SnapshotEntry> {
        let mut entries: Vec<SnapshotEntry> = snapshot
            .entries
            .iter()
            .filter(|e| self.matches(e))
            .cloned()
            .collect();
        if self.order == ListOrder::Status {
            entries.sort_by(status_first);
        }
        entries
    }
}

fn status_rank(status: &ServiceStatus) -> u8 {
    match status.label() {
        StatusLabel::Running => 0,
        StatusLabel::Idle | StatusLabel::Stopped => 1,
        StatusLabel::Disabled => 2,
        StatusLabel::Unknown => 3,
    }
}

fn status_first(a: &SnapshotEntry, b: &SnapshotEntry) -> Ordering {
    status_rank(&a.status)
        .cmp(&status_rank(&b.status))
        .then_with(|| a.definition.identifier.cmp(&b.definition.identifier))
}

pub struct QueryFacade {
    reconciler: Reconciler,
    last: Mutex<Option<Snapshot>>,
}

impl QueryFacade {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler,
            last: Mutex::new(None),
        }
    }

    fn last(&self) -> MutexGuard<'_, Option<Snapshot>> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh reconciliation of the given scopes; becomes the cached snapshot
    pub async fn refresh(&self, scopes: &[Scope], include_untracked: bool) -> Snapshot {
        let snapshot = self.reconciler.reconcile(scopes, include_untracked).await;
        *self.last() = Some(snapshot.clone());
        snapshot
    }

    /// Last snapshot taken, with its timestamp. Never queries the supervisor.
    pub fn cached(&self) -> Option<Snapshot> {
        self.last().clone()
    }

    /// Patch one status into the cached snapshot
    pub fn remember(&self, status: ServiceStatus) {
        if let Some(snapshot) = self.last().as_mut() {
            snapshot.replace_status(status);
        }
    }

    pub async fn list(&self, filter: &ServiceFilter) -> Vec<SnapshotEntry> {
        let snapshot = self.refresh(&filter.scopes(), false).await;
        filter.apply(&snapshot)
    }

    pub async fn by_category(&self, category: Category) -> Vec<SnapshotEntry> {
        self.list(&ServiceFilter::all().category(category)).await
    }

    pub async fn by_scope(&self, scope: Scope) -> Vec<SnapshotEntry> {
        self.list(&ServiceFilter::all().scope(scope)).await
    }

    pub async fn by_status(&self, predicate: StatusPredicate) -> Vec<SnapshotEntry> {
        self.list(&ServiceFilter::all().predicate(predicate)).await
    }

    /// Single cataloged service, reconciled in its own scope
    pub async fn service(&self, identifier: &str) -> Option<SnapshotEntry> {
        let scope = self.reconciler.catalog().get(identifier)?.scope;
        let snapshot = self.refresh(&[scope], false).await;
        snapshot.get(identifier).cloned()
    }

    /// Loaded services absent from the catalog
    pub async fn untracked(&self, scope: Option<Scope>) -> Vec<ServiceStatus> {
        let scopes = match scope {
            Some(scope) => vec![scope],
            None => Scope::ALL.to_vec(),
        };
        let mut untracked = self.refresh(&scopes, true).await.untracked;
        untracked.sort_by(|a, b| {
            a.scope
                .cmp(&b.scope)
                .then_with(|| a.identifier.cmp(&b.identifier))
        });
        untracked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::supervisor::{FakeService, FakeSupervisor};
    use crate::types::{Criticality, ServiceDefinition};
    use std::sync::Arc;

    fn def(identifier: &str, category: Category, critical: bool) -> ServiceDefinition {
        ServiceDefinition {
            identifier: identifier.to_string(),
            category,
            description: "test".to_string(),
            impact: "test".to_string(),
            criticality: if critical {
                Criticality::Critical
            } else {
                Criticality::Normal
            },
            scope: Scope::User,
        }
    }

    fn facade() -> QueryFacade {
        let catalog = Catalog::from_definitions(vec![
            def("com.example.a-running", Category::Media, false),
            def("com.example.b-idle", Category::Media, true),
            def("com.example.c-disabled", Category::Analytics, false),
            def("com.example.d-stopped", Category::Misc, false),
        ])
        .unwrap();
        let fake = FakeSupervisor::new()
            .with_service(FakeService::running("com.example.a-running", Scope::User, 3))
            .with_service(FakeService::idle("com.example.b-idle", Scope::User))
            .with_service(FakeService::disabled("com.example.c-disabled", Scope::User))
            .with_service(FakeService::stopped("com.example.d-stopped", Scope::User));
        QueryFacade::new(Reconciler::new(Arc::new(catalog), Arc::new(fake)))
    }

    fn ids(entries: &[SnapshotEntry]) -> Vec<&str> {
        entries
            .iter()
            .map(|e| e.definition.identifier.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_predicates() {
        let q = facade();
        assert_eq!(
            ids(&q.by_status(StatusPredicate::Running).await),
            vec!["com.example.a-running"]
        );
        assert_eq!(
            ids(&q.by_status(StatusPredicate::Disabled).await),
            vec!["com.example.c-disabled"]
        );
        assert_eq!(
            ids(&q.by_status(StatusPredicate::Critical).await),
            vec!["com.example.b-idle"]
        );
        assert_eq!(q.by_status(StatusPredicate::Stopped).await.len(), 3);
        assert_eq!(q.by_status(StatusPredicate::Enabled).await.len(), 3);
    }

    #[tokio::test]
    async fn test_category_keeps_catalog_order() {
        let q = facade();
        assert_eq!(
            ids(&q.by_category(Category::Media).await),
            vec!["com.example.a-running", "com.example.b-idle"]
        );
    }

    #[tokio::test]
    async fn test_status_first_order() {
        let q = facade();
        let listed = q
            .list(&ServiceFilter::all().ordered(ListOrder::Status))
            .await;
        assert_eq!(
            ids(&listed),
            vec![
                "com.example.a-running",
                "com.example.b-idle",
                "com.example.d-stopped",
                "com.example.c-disabled",
            ]
        );
    }

    #[tokio::test]
    async fn test_cached_returns_last_snapshot() {
        let q = facade();
        assert!(q.cached().is_none());
        q.list(&ServiceFilter::all()).await;
        let cached = q.cached().unwrap();
        assert_eq!(cached.entries.len(), 4);
    }

    #[tokio::test]
    async fn test_service_lookup() {
        let q = facade();
        let entry = q.service("com.example.b-idle").await.unwrap();
        assert_eq!(entry.status.loaded(), Some(true));
        assert!(q.service("com.example.missing").await.is_none());
    }
}
