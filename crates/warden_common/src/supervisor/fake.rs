//! In-memory supervisor for deterministic testing.
//!
//! Holds scripted per-service state, applies actions the way launchd does, and
//! records every call so tests can count mutations.
//!
//! ## Example
//!
//! ```
//! use warden_common::supervisor::{FakeService, FakeSupervisor};
//! use warden_common::Scope;
//!
//! let fake = FakeSupervisor::new()
//!     .with_service(FakeService::idle("com.apple.photoanalysisd", Scope::User))
//!     .with_service(FakeService::disabled("com.apple.analyticsd", Scope::System));
//! assert_eq!(fake.mutations(), 0);
//! ```

use super::{RunState, Supervisor, SupervisorAction};
use crate::error::SupervisorError;
use crate::types::Scope;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Scripted state of one fake service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeService {
    pub identifier: String,
    pub scope: Scope,
    pub loaded: bool,
    pub enabled: bool,
    pub running: bool,
    pub pid: Option<u32>,
}

impl FakeService {
    /// Loaded and enabled, no process
    pub fn idle(identifier: &str, scope: Scope) -> Self {
        Self {
            identifier: identifier.to_string(),
            scope,
            loaded: true,
            enabled: true,
            running: false,
            pid: None,
        }
    }

    pub fn running(identifier: &str, scope: Scope, pid: u32) -> Self {
        Self {
            running: true,
            pid: Some(pid),
            ..Self::idle(identifier, scope)
        }
    }

    /// Enabled but not loaded
    pub fn stopped(identifier: &str, scope: Scope) -> Self {
        Self {
            loaded: false,
            ..Self::idle(identifier, scope)
        }
    }

    /// Administratively disabled and not loaded
    pub fn disabled(identifier: &str, scope: Scope) -> Self {
        Self {
            loaded: false,
            enabled: false,
            ..Self::idle(identifier, scope)
        }
    }
}

/// One recorded call against the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorCall {
    ListLoaded(Scope),
    QueryRunState { identifier: String, scope: Scope },
    DisabledOverrides(Scope),
    Execute {
        action: SupervisorAction,
        identifier: String,
        scope: Scope,
    },
}

impl SupervisorCall {
    pub fn is_mutation(&self) -> bool {
        matches!(self, SupervisorCall::Execute { .. })
    }
}

#[derive(Debug, Default)]
struct FakeInner {
    services: HashMap<(Scope, String), FakeService>,
    calls: Vec<SupervisorCall>,
    list_failures: HashMap<Scope, SupervisorError>,
    override_failures: HashMap<Scope, SupervisorError>,
    query_failures: HashMap<String, SupervisorError>,
    action_failures: HashMap<SupervisorAction, SupervisorError>,
    /// identifier -> remaining run-state queries that answer NotFound
    stale_reads: HashMap<String, usize>,
    /// (list_loaded call number, state to apply just before it answers)
    scheduled: Vec<(usize, FakeService)>,
    next_pid: u32,
    unprivileged: bool,
}

/// Fake supervisor with scripted state and a call log
#[derive(Debug, Default)]
pub struct FakeSupervisor {
    inner: Mutex<FakeInner>,
}

impl FakeSupervisor {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.lock().next_pid = 1000;
        fake
    }

    fn lock(&self) -> MutexGuard<'_, FakeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_service(self, service: FakeService) -> Self {
        self.set_service(service);
        self
    }

    /// Refuse every System scope call with `PrivilegeRequired`
    pub fn unprivileged(self) -> Self {
        self.lock().unprivileged = true;
        self
    }

    /// Replace a service's state, simulating an external change
    pub fn set_service(&self, service: FakeService) {
        let key = (service.scope, service.identifier.clone());
        self.lock().services.insert(key, service);
    }

    pub fn service(&self, identifier: &str, scope: Scope) -> Option<FakeService> {
        self.lock()
            .services
            .get(&(scope, identifier.to_string()))
            .cloned()
    }

    /// Process exits outside our control; the job stays loaded
    pub fn crash(&self, identifier: &str, scope: Scope) {
        if let Some(svc) = self
            .lock()
            .services
            .get_mut(&(scope, identifier.to_string()))
        {
            svc.running = false;
            svc.pid = None;
        }
    }

    pub fn fail_list(&self, scope: Scope, error: SupervisorError) {
        self.lock().list_failures.insert(scope, error);
    }

    pub fn fail_overrides(&self, scope: Scope, error: SupervisorError) {
        self.lock().override_failures.insert(scope, error);
    }

    pub fn fail_query(&self, identifier: &str, error: SupervisorError) {
        self.lock()
            .query_failures
            .insert(identifier.to_string(), error);
    }

    pub fn fail_action(&self, action: SupervisorAction, error: SupervisorError) {
        self.lock().action_failures.insert(action, error);
    }

    /// Clear all injected failures
    pub fn heal(&self) {
        let mut inner = self.lock();
        inner.list_failures.clear();
        inner.override_failures.clear();
        inner.query_failures.clear();
        inner.action_failures.clear();
    }

    /// The next `count` run-state queries for `identifier` answer NotFound even
    /// though the service is listed as loaded
    pub fn stale_reads(&self, identifier: &str, count: usize) {
        self.lock()
            .stale_reads
            .insert(identifier.to_string(), count);
    }

    /// Apply `service` just before the `nth` (1-based) `list_loaded` call
    /// answers, simulating a change that lands between two listings
    pub fn change_on_list(&self, nth: usize, service: FakeService) {
        self.lock().scheduled.push((nth, service));
    }

    pub fn calls(&self) -> Vec<SupervisorCall> {
        self.lock().calls.clone()
    }

    /// Number of imperative calls issued
    pub fn mutations(&self) -> usize {
        self.lock().calls.iter().filter(|c| c.is_mutation()).count()
    }

    pub fn executed(&self) -> Vec<(SupervisorAction, String)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                SupervisorCall::Execute {
                    action, identifier, ..
                } => Some((*action, identifier.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

impl FakeInner {
    fn check_privilege(&self, scope: Scope) -> Result<(), SupervisorError> {
        if self.unprivileged && scope.requires_privilege() {
            return Err(SupervisorError::PrivilegeRequired { scope });
        }
        Ok(())
    }

    fn apply(
        &mut self,
        action: SupervisorAction,
        identifier: &str,
        scope: Scope,
    ) -> Result<(), SupervisorError> {
        let key = (scope, identifier.to_string());
        let rejected = |reason: &str| SupervisorError::ActionRejected {
            reason: reason.to_string(),
        };

        match action {
            SupervisorAction::Enable | SupervisorAction::Disable => {
                let svc = self.services.entry(key).or_insert_with(|| FakeService {
                    loaded: false,
                    ..FakeService::idle(identifier, scope)
                });
                svc.enabled = action == SupervisorAction::Enable;
                Ok(())
            }
            SupervisorAction::Load => {
                let svc = self
                    .services
                    .get_mut(&key)
                    .ok_or_else(|| rejected("no launchd plist found"))?;
                if !svc.enabled {
                    return Err(rejected("Load failed: 5: Input/output error (service is disabled)"));
                }
                if svc.loaded {
                    return Err(rejected("Load failed: 37: Operation already in progress"));
                }
                svc.loaded = true;
                Ok(())
            }
            SupervisorAction::Unload => {
                let svc = self
                    .services
                    .get_mut(&key)
                    .filter(|s| s.loaded)
                    .ok_or_else(|| rejected("Boot-out failed: 3: No such process"))?;
                svc.loaded = false;
                svc.running = false;
                svc.pid = None;
                Ok(())
            }
            SupervisorAction::Restart => {
                self.next_pid += 1;
                let pid = self.next_pid;
                let svc = self
                    .services
                    .get_mut(&key)
                    .filter(|s| s.loaded)
                    .ok_or_else(|| rejected("Could not find service in domain"))?;
                svc.running = true;
                svc.pid = Some(pid);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Supervisor for FakeSupervisor {
    async fn list_loaded(&self, scope: Scope) -> Result<BTreeSet<String>, SupervisorError> {
        let mut inner = self.lock();
        inner.calls.push(SupervisorCall::ListLoaded(scope));
        let lists = inner
            .calls
            .iter()
            .filter(|c| matches!(c, SupervisorCall::ListLoaded(_)))
            .count();
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.scheduled)
            .into_iter()
            .partition(|(nth, _)| *nth == lists);
        inner.scheduled = pending;
        for (_, service) in due {
            inner
                .services
                .insert((service.scope, service.identifier.clone()), service);
        }
        inner.check_privilege(scope)?;
        if let Some(err) = inner.list_failures.get(&scope) {
            return Err(err.clone());
        }
        Ok(inner
            .services
            .values()
            .filter(|s| s.scope == scope && s.loaded)
            .map(|s| s.identifier.clone())
            .collect())
    }

    async fn query_run_state(
        &self,
        identifier: &str,
        scope: Scope,
    ) -> Result<RunState, SupervisorError> {
        let mut inner = self.lock();
        inner.calls.push(SupervisorCall::QueryRunState {
            identifier: identifier.to_string(),
            scope,
        });
        inner.check_privilege(scope)?;
        if let Some(err) = inner.query_failures.get(identifier) {
            return Err(err.clone());
        }
        if let Some(remaining) = inner.stale_reads.get_mut(identifier) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(RunState::NotFound);
            }
        }
        let state = match inner.services.get(&(scope, identifier.to_string())) {
            Some(svc) if svc.loaded && svc.running => RunState::Running { pid: svc.pid },
            Some(svc) if svc.loaded => RunState::Idle,
            _ => RunState::NotFound,
        };
        Ok(state)
    }

    async fn disabled_overrides(
        &self,
        scope: Scope,
    ) -> Result<HashMap<String, bool>, SupervisorError> {
        let mut inner = self.lock();
        inner.calls.push(SupervisorCall::DisabledOverrides(scope));
        inner.check_privilege(scope)?;
        if let Some(err) = inner.override_failures.get(&scope) {
            return Err(err.clone());
        }
        Ok(inner
            .services
            .values()
            .filter(|s| s.scope == scope)
            .map(|s| (s.identifier.clone(), !s.enabled))
            .collect())
    }

    async fn execute(
        &self,
        action: SupervisorAction,
        identifier: &str,
        scope: Scope,
    ) -> Result<(), SupervisorError> {
        let mut inner = self.lock();
        inner.calls.push(SupervisorCall::Execute {
            action,
            identifier: identifier.to_string(),
            scope,
        });
        inner.check_privilege(scope)?;
        if let Some(err) = inner.action_failures.get(&action) {
            return Err(err.clone());
        }
        inner.apply(action, identifier, scope)
    }
}
