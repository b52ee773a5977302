//! State Reconciler - merges catalog metadata with live supervisor output.
//!
//! Per scope: one `list_loaded`, one `disabled_overrides`, then a run-state query
//! for each loaded target only. A scope whose list or overrides cannot be read
//! degrades to `Unknown` statuses without affecting the other scope.

use crate::catalog::Catalog;
use crate::error::SupervisorError;
use crate::supervisor::{RunState, Supervisor};
use crate::types::{Scope, ServiceDefinition, ServiceState, ServiceStatus, Tracking};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// A cataloged service and its reconciled status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEntry {
    pub definition: ServiceDefinition,
    pub status: ServiceStatus,
}

/// Complete result of one reconciliation pass. Only exposed once complete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    /// Scopes this snapshot covers
    pub scopes: Vec<Scope>,
    /// Cataloged services in catalog order
    pub entries: Vec<SnapshotEntry>,
    /// Loaded services absent from the catalog (only when requested)
    pub untracked: Vec<ServiceStatus>,
    /// Scopes that could not be observed, with the reason
    pub scope_errors: BTreeMap<Scope, String>,
}

impl Snapshot {
    pub fn get(&self, identifier: &str) -> Option<&SnapshotEntry> {
        self.entries
            .iter()
            .find(|e| e.definition.identifier == identifier)
    }

    /// Status for a cataloged or untracked identifier
    pub fn status(&self, identifier: &str) -> Option<&ServiceStatus> {
        self.get(identifier)
            .map(|e| &e.status)
            .or_else(|| self.untracked.iter().find(|s| s.identifier == identifier))
    }

    pub fn covers(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }

    /// Same observed state, ignoring when it was taken
    pub fn same_state(&self, other: &Snapshot) -> bool {
        self.scopes == other.scopes
            && self.entries == other.entries
            && self.untracked == other.untracked
            && self.scope_errors == other.scope_errors
    }

    /// Swap in a fresher status for one service. Returns false if the
    /// snapshot does not hold that identifier.
    pub fn replace_status(&mut self, status: ServiceStatus) -> bool {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.definition.identifier == status.identifier)
        {
            entry.status = status;
            return true;
        }
        if let Some(existing) = self
            .untracked
            .iter_mut()
            .find(|s| s.identifier == status.identifier && s.scope == status.scope)
        {
            *existing = status;
            return true;
        }
        false
    }
}

/// Live view of one supervisor scope
#[derive(Debug)]
struct ScopeView {
    scope: Scope,
    loaded: BTreeSet<String>,
    /// label -> disabled
    overrides: HashMap<String, bool>,
    requeried: bool,
}

impl ScopeView {
    fn enabled(&self, identifier: &str) -> bool {
        !self.overrides.get(identifier).copied().unwrap_or(false)
    }
}

#[derive(Clone)]
pub struct Reconciler {
    catalog: Arc<Catalog>,
    supervisor: Arc<dyn Supervisor>,
}

impl Reconciler {
    pub fn new(catalog: Arc<Catalog>, supervisor: Arc<dyn Supervisor>) -> Self {
        Self {
            catalog,
            supervisor,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Reconcile every cataloged service in `scopes`
    pub async fn reconcile(&self, scopes: &[Scope], include_untracked: bool) -> Snapshot {
        let mut statuses: HashMap<String, ServiceStatus> = HashMap::new();
        let mut untracked = Vec::new();
        let mut scope_errors = BTreeMap::new();

        let mut wanted: Vec<Scope> = scopes.to_vec();
        wanted.sort();
        wanted.dedup();

        for &scope in &wanted {
            let mut view = match self.observe_scope(scope).await {
                Ok(view) => view,
                Err(e) => {
                    warn!("Cannot observe {} scope: {}", scope, e);
                    let reason = e.to_string();
                    for def in self.catalog.in_scope(scope) {
                        statuses.insert(
                            def.identifier.clone(),
                            ServiceStatus::unknown(&def.identifier, scope, Tracking::Cataloged, &reason),
                        );
                    }
                    scope_errors.insert(scope, reason);
                    continue;
                }
            };

            let (cataloged, extra) = self.resolve_scope(&mut view, include_untracked).await;
            for status in cataloged {
                statuses.insert(status.identifier.clone(), status);
            }
            if include_untracked {
                debug!("{} scope has {} untracked services", scope, extra.len());
                // A stale untracked entry that vanished on re-query is not reported
                untracked.extend(extra.into_iter().filter(|s| s.loaded() != Some(false)));
            }
        }

        let entries = self
            .catalog
            .services()
            .iter()
            .filter_map(|def| {
                statuses.remove(&def.identifier).map(|status| SnapshotEntry {
                    definition: def.clone(),
                    status,
                })
            })
            .collect();

        Snapshot {
            taken_at: Utc::now(),
            scopes: wanted,
            entries,
            untracked,
            scope_errors,
        }
    }

    /// Reconcile a single identifier in a known scope
    pub async fn reconcile_one(
        &self,
        identifier: &str,
        scope: Scope,
        tracking: Tracking,
    ) -> ServiceStatus {
        match self.observe_scope(scope).await {
            Ok(mut view) => self.resolve(identifier, tracking, &mut view).await,
            Err(e) => ServiceStatus::unknown(identifier, scope, tracking, &e.to_string()),
        }
    }

    /// First scope whose loaded list contains `identifier`
    pub async fn locate(&self, identifier: &str) -> Result<Option<Scope>, SupervisorError> {
        let mut last_error = None;
        for scope in Scope::ALL {
            match self.supervisor.list_loaded(scope).await {
                Ok(loaded) if loaded.contains(identifier) => return Ok(Some(scope)),
                Ok(_) => {}
                Err(e) => {
                    debug!("Skipping {} scope while locating {}: {}", scope, identifier, e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    async fn observe_scope(&self, scope: Scope) -> Result<ScopeView, SupervisorError> {
        let loaded = self.supervisor.list_loaded(scope).await?;
        let overrides = self.supervisor.disabled_overrides(scope).await?;
        debug!(
            "{} scope: {} loaded, {} overrides",
            scope,
            loaded.len(),
            overrides.len()
        );
        Ok(ScopeView {
            scope,
            loaded,
            overrides,
            requeried: false,
        })
    }

    /// Resolve every cataloged (and optionally untracked) service in one scope.
    ///
    /// A stale read re-lists the scope part way through; statuses already
    /// resolved against the old listing are resolved again so the whole scope
    /// reflects a single listing.
    async fn resolve_scope(
        &self,
        view: &mut ScopeView,
        include_untracked: bool,
    ) -> (Vec<ServiceStatus>, Vec<ServiceStatus>) {
        let mut targets: Vec<(String, Tracking)> = self
            .catalog
            .in_scope(view.scope)
            .map(|def| (def.identifier.clone(), Tracking::Cataloged))
            .collect();
        let cataloged = targets.len();
        if include_untracked {
            self.add_untracked_targets(view, &mut targets);
        }

        let mut statuses: Vec<ServiceStatus> = Vec::with_capacity(targets.len());
        let mut next = 0;
        while next < targets.len() {
            let relisted = view.requeried;
            let (identifier, tracking) = targets[next].clone();
            statuses.push(self.resolve(&identifier, tracking, view).await);
            next += 1;

            if !relisted && view.requeried {
                debug!(
                    "{} scope re-listed, refreshing {} earlier statuses",
                    view.scope,
                    next - 1
                );
                for i in 0..next - 1 {
                    let (identifier, tracking) = targets[i].clone();
                    statuses[i] = self.resolve(&identifier, tracking, view).await;
                }
                if include_untracked {
                    self.add_untracked_targets(view, &mut targets);
                }
            }
        }

        let untracked = statuses.split_off(cataloged);
        (statuses, untracked)
    }

    /// Append loaded identifiers the catalog does not know and `targets` lacks
    fn add_untracked_targets(&self, view: &ScopeView, targets: &mut Vec<(String, Tracking)>) {
        for identifier in view.loaded.iter().filter(|id| !self.catalog.contains(id)) {
            if !targets.iter().any(|(t, _)| t == identifier) {
                targets.push((identifier.clone(), Tracking::Untracked));
            }
        }
    }

    async fn resolve(
        &self,
        identifier: &str,
        tracking: Tracking,
        view: &mut ScopeView,
    ) -> ServiceStatus {
        let scope = view.scope;

        if !view.loaded.contains(identifier) {
            let state = ServiceState::not_loaded(view.enabled(identifier));
            return ServiceStatus::known(identifier, scope, tracking, state);
        }

        let mut run_state = match self.supervisor.query_run_state(identifier, scope).await {
            Ok(state) => state,
            Err(e) => return ServiceStatus::unknown(identifier, scope, tracking, &e.to_string()),
        };

        if run_state == RunState::NotFound {
            warn!("{} listed as loaded but not found, re-querying {} scope", identifier, scope);
            run_state = match self.requery(identifier, view).await {
                Ok(state) => state,
                Err(e) => {
                    return ServiceStatus::unknown(identifier, scope, tracking, &e.to_string())
                }
            };
        }

        let enabled = view.enabled(identifier);
        let state = match run_state {
            RunState::Running { pid } => ServiceState {
                loaded: true,
                enabled,
                running: true,
                pid,
            },
            RunState::Idle => ServiceState {
                loaded: true,
                enabled,
                running: false,
                pid: None,
            },
            RunState::NotFound => {
                debug!("{} still not found after re-query, recording as not loaded", identifier);
                view.loaded.remove(identifier);
                ServiceState::not_loaded(enabled)
            }
        };
        ServiceStatus::known(identifier, scope, tracking, state)
    }

    /// One fresh look at the scope after a stale read. Only the first stale
    /// read in a pass re-lists the scope.
    async fn requery(
        &self,
        identifier: &str,
        view: &mut ScopeView,
    ) -> Result<RunState, SupervisorError> {
        if view.requeried {
            return Ok(RunState::NotFound);
        }
        let fresh = self.observe_scope(view.scope).await?;
        view.loaded = fresh.loaded;
        view.overrides = fresh.overrides;
        view.requeried = true;

        if !view.loaded.contains(identifier) {
            return Ok(RunState::NotFound);
        }
        self.supervisor.query_run_state(identifier, view.scope).await
    }
}
