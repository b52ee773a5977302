//! Engine behaviour against the bundled catalog and a fake supervisor.
//!
//! Deterministic: no launchctl, no root. Each test scripts the supervisor state
//! it needs and counts the imperative calls the engine makes.

use std::sync::Arc;
use warden_common::supervisor::{FakeService, FakeSupervisor};
use warden_common::{
    Catalog, Disposition, PolicyRejection, Scope, ServiceEngine, ServiceFilter, ServiceOperation,
    StatusPredicate, SupervisorAction, SupervisorError,
};

const PHOTOANALYSISD: &str = "com.apple.photoanalysisd";
const DONOTDISTURBD: &str = "com.apple.donotdisturbd";
const AIRPLAY_HELPER: &str = "com.apple.AirPlayXPCHelper";

fn engine(fake: Arc<FakeSupervisor>) -> ServiceEngine {
    let catalog = Catalog::bundled().expect("bundled catalog loads");
    ServiceEngine::new(catalog, fake)
}

fn desktop() -> Arc<FakeSupervisor> {
    Arc::new(
        FakeSupervisor::new()
            .with_service(FakeService::idle(PHOTOANALYSISD, Scope::User))
            .with_service(FakeService::running(DONOTDISTURBD, Scope::User, 412))
            .with_service(FakeService::running("com.apple.cloudd", Scope::User, 388))
            .with_service(FakeService::disabled("com.apple.assistantd", Scope::User))
            .with_service(FakeService::running(AIRPLAY_HELPER, Scope::System, 97))
            .with_service(FakeService::idle("com.apple.analyticsd", Scope::System))
            .with_service(FakeService::running("org.thirdparty.updater", Scope::User, 2001)),
    )
}

// ============================================================================
// Reconciliation
// ============================================================================

#[tokio::test]
async fn test_running_implies_loaded_in_every_snapshot() {
    let fake = desktop();
    // transient and persistent stale reads both resolve to a consistent state
    fake.stale_reads("com.apple.cloudd", 1);
    fake.stale_reads(PHOTOANALYSISD, 5);
    let engine = engine(fake);

    let snapshot = engine.snapshot(&Scope::ALL, true).await;
    for entry in &snapshot.entries {
        if entry.status.running() == Some(true) {
            assert_eq!(
                entry.status.loaded(),
                Some(true),
                "{} running but not loaded",
                entry.definition.identifier
            );
        }
    }
    for status in &snapshot.untracked {
        if status.running() == Some(true) {
            assert_eq!(status.loaded(), Some(true));
        }
    }
    assert_eq!(
        snapshot.status("com.apple.cloudd").unwrap().running(),
        Some(true)
    );
}

#[tokio::test]
async fn test_system_list_failure_degrades_only_system() {
    let fake = desktop();
    fake.fail_list(
        Scope::System,
        SupervisorError::Unavailable("launchctl print system timed out".to_string()),
    );
    let engine = engine(fake);

    let entries = engine.list_services(&ServiceFilter::all()).await;
    assert!(!entries.is_empty());
    for entry in &entries {
        match entry.definition.scope {
            Scope::System => assert!(entry.status.is_unknown()),
            Scope::User => assert!(!entry.status.is_unknown()),
        }
    }
    let dnd = entries
        .iter()
        .find(|e| e.definition.identifier == DONOTDISTURBD)
        .unwrap();
    assert_eq!(dnd.status.running(), Some(true));
}

#[tokio::test]
async fn test_unprivileged_system_scope_is_unknown_not_error() {
    let fake = Arc::new(
        FakeSupervisor::new()
            .with_service(FakeService::running(AIRPLAY_HELPER, Scope::System, 97))
            .unprivileged(),
    );
    let engine = engine(fake);

    let snapshot = engine.snapshot(&Scope::ALL, false).await;
    let reason = snapshot.scope_errors.get(&Scope::System).unwrap();
    assert!(reason.contains("administrator"));
    assert!(snapshot.status(AIRPLAY_HELPER).unwrap().is_unknown());
}

#[tokio::test]
async fn test_repeated_queries_are_identical_modulo_timestamp() {
    let engine = engine(desktop());

    let first = engine.snapshot(&Scope::ALL, true).await;
    let second = engine.snapshot(&Scope::ALL, true).await;
    assert!(first.same_state(&second));
    assert!(second.taken_at >= first.taken_at);

    let a = engine.list_services(&ServiceFilter::all()).await;
    let b = engine.list_services(&ServiceFilter::all()).await;
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_external_change_is_visible_on_next_query() {
    let fake = desktop();
    let engine = engine(fake.clone());

    let running = engine
        .list_services(&ServiceFilter::all().predicate(StatusPredicate::Running))
        .await;
    assert!(running
        .iter()
        .any(|e| e.definition.identifier == "com.apple.cloudd"));

    fake.crash("com.apple.cloudd", Scope::User);
    let running = engine
        .list_services(&ServiceFilter::all().predicate(StatusPredicate::Running))
        .await;
    assert!(!running
        .iter()
        .any(|e| e.definition.identifier == "com.apple.cloudd"));
}

#[tokio::test]
async fn test_untracked_services_stay_out_of_catalog_views() {
    let engine = engine(desktop());

    let listed = engine.list_services(&ServiceFilter::all()).await;
    assert!(listed
        .iter()
        .all(|e| e.definition.identifier != "org.thirdparty.updater"));

    let untracked = engine.query().untracked(Some(Scope::User)).await;
    assert_eq!(untracked.len(), 1);
    assert_eq!(untracked[0].identifier, "org.thirdparty.updater");
}

// ============================================================================
// Criticality guard
// ============================================================================

#[tokio::test]
async fn test_critical_disable_without_override_is_rejected() {
    let fake = desktop();
    let engine = engine(fake.clone());

    let outcome = engine
        .request_action(DONOTDISTURBD, ServiceOperation::Disable, false)
        .await;

    assert!(matches!(
        outcome.disposition,
        Disposition::Rejected {
            rejection: PolicyRejection::CriticalGuard { .. }
        }
    ));
    assert!(fake.calls().is_empty(), "guard must not reach the supervisor");
    assert_eq!(outcome.reverse, None);

    let svc = fake.service(DONOTDISTURBD, Scope::User).unwrap();
    assert!(svc.enabled && svc.running);
}

#[tokio::test]
async fn test_critical_stop_without_override_is_rejected() {
    let fake = desktop();
    let engine = engine(fake.clone());

    let outcome = engine
        .request_action(DONOTDISTURBD, ServiceOperation::Stop, false)
        .await;
    assert!(matches!(outcome.disposition, Disposition::Rejected { .. }));
    assert_eq!(fake.mutations(), 0);
}

#[tokio::test]
async fn test_critical_disable_with_override_makes_one_call() {
    let fake = desktop();
    let engine = engine(fake.clone());

    let outcome = engine
        .request_action(DONOTDISTURBD, ServiceOperation::Disable, true)
        .await;

    assert!(outcome.succeeded());
    assert_eq!(fake.mutations(), 1);
    assert_eq!(
        fake.executed(),
        vec![(SupervisorAction::Disable, DONOTDISTURBD.to_string())]
    );
    assert_eq!(outcome.reverse, Some(ServiceOperation::Enable));

    let status = outcome.status.unwrap();
    assert_eq!(status.enabled(), Some(false));
    assert!(status.last_action.is_some());

    let entry = engine.query().service(DONOTDISTURBD).await.unwrap();
    assert_eq!(entry.status.enabled(), Some(false));
    // full refresh clears the transient action record
    assert!(entry.status.last_action.is_none());
}

#[tokio::test]
async fn test_critical_guard_does_not_block_enable_or_restart() {
    let fake = desktop();
    let engine = engine(fake.clone());

    let outcome = engine
        .request_action(DONOTDISTURBD, ServiceOperation::Restart, false)
        .await;
    assert!(outcome.succeeded());
    assert_eq!(fake.executed(), vec![(SupervisorAction::Restart, DONOTDISTURBD.to_string())]);
}

#[tokio::test]
async fn test_core_daemon_stays_guarded_when_acknowledged_as_untracked() {
    let fake = desktop();
    fake.set_service(FakeService::running(
        "com.apple.audio.coreaudiod",
        Scope::System,
        171,
    ));
    let engine = engine(fake.clone());

    let request =
        warden_common::ActionRequest::new("com.apple.audio.coreaudiod", ServiceOperation::Stop)
            .untracked(true);
    let outcome = engine.submit(&request).await;
    assert!(matches!(
        outcome.disposition,
        Disposition::Rejected {
            rejection: PolicyRejection::CriticalGuard { .. }
        }
    ));
    assert!(fake.calls().is_empty());
}

// ============================================================================
// Mediated transitions
// ============================================================================

#[tokio::test]
async fn test_photoanalysisd_stop_then_start() {
    let fake = desktop();
    let engine = engine(fake.clone());

    let stopped = engine
        .request_action(PHOTOANALYSISD, ServiceOperation::Stop, false)
        .await;
    assert!(stopped.succeeded());
    assert_eq!(stopped.executed, vec![SupervisorAction::Unload]);
    assert_eq!(stopped.reverse, Some(ServiceOperation::Start));
    let status = stopped.status.unwrap();
    assert_eq!(status.loaded(), Some(false));
    assert_eq!(status.running(), Some(false));

    let started = engine
        .request_action(PHOTOANALYSISD, ServiceOperation::Start, false)
        .await;
    assert!(started.succeeded());
    assert_eq!(started.executed, vec![SupervisorAction::Load]);
    let status = started.status.unwrap();
    assert_eq!(status.loaded(), Some(true));
    assert_eq!(status.enabled(), Some(true));
    assert_eq!(fake.mutations(), 2);
}

#[tokio::test]
async fn test_start_disabled_service_enables_before_loading() {
    let fake = desktop();
    let engine = engine(fake.clone());

    let outcome = engine
        .request_action("com.apple.assistantd", ServiceOperation::Start, false)
        .await;
    assert!(outcome.succeeded());
    assert_eq!(
        outcome.executed,
        vec![SupervisorAction::Enable, SupervisorAction::Load]
    );
    let status = outcome.status.unwrap();
    assert_eq!(status.loaded(), Some(true));
    assert_eq!(status.enabled(), Some(true));
}

#[tokio::test]
async fn test_noop_start_makes_no_mutations() {
    let fake = desktop();
    let engine = engine(fake.clone());

    let outcome = engine
        .request_action(PHOTOANALYSISD, ServiceOperation::Start, false)
        .await;
    assert!(outcome.is_noop());
    assert!(outcome.executed.is_empty());
    assert_eq!(outcome.reverse, None);
    assert_eq!(fake.mutations(), 0);
}

#[tokio::test]
async fn test_restart_of_unloaded_service_is_rejected() {
    let fake = desktop();
    let engine = engine(fake.clone());

    let outcome = engine
        .request_action("com.apple.assistantd", ServiceOperation::Restart, false)
        .await;
    assert!(matches!(
        outcome.disposition,
        Disposition::Rejected {
            rejection: PolicyRejection::NotLoaded { .. }
        }
    ));
    assert_eq!(fake.mutations(), 0);
}

#[tokio::test]
async fn test_supervisor_refusal_is_failed_outcome_with_fresh_status() {
    let fake = desktop();
    fake.fail_action(
        SupervisorAction::Disable,
        SupervisorError::ActionRejected {
            reason: "Operation not permitted while System Integrity Protection is engaged"
                .to_string(),
        },
    );
    let engine = engine(fake.clone());

    let outcome = engine
        .request_action("com.apple.analyticsd", ServiceOperation::Disable, false)
        .await;
    match &outcome.disposition {
        Disposition::Failed { error, step } => {
            assert_eq!(error.code(), "action_rejected");
            assert_eq!(*step, Some(SupervisorAction::Disable));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(outcome.executed.is_empty());
    assert_eq!(outcome.status.unwrap().enabled(), Some(true));
    // exactly one attempt, no retry
    assert_eq!(fake.mutations(), 1);
}

#[tokio::test]
async fn test_privilege_required_surfaces_as_failure() {
    let fake = Arc::new(
        FakeSupervisor::new()
            .with_service(FakeService::idle("com.apple.analyticsd", Scope::System))
            .unprivileged(),
    );
    let engine = engine(fake.clone());

    let outcome = engine
        .request_action("com.apple.analyticsd", ServiceOperation::Disable, false)
        .await;
    match outcome.disposition {
        Disposition::Failed { error, .. } => assert_eq!(
            error,
            SupervisorError::PrivilegeRequired {
                scope: Scope::System
            }
        ),
        other => panic!("expected privilege failure, got {:?}", other),
    }
    assert!(outcome.status.unwrap().is_unknown());
}

#[tokio::test]
async fn test_untracked_requires_acknowledgement() {
    let fake = desktop();
    let engine = engine(fake.clone());

    let outcome = engine
        .request_action("org.thirdparty.updater", ServiceOperation::Stop, false)
        .await;
    assert!(matches!(
        outcome.disposition,
        Disposition::Rejected {
            rejection: PolicyRejection::UntrackedNotAcknowledged { .. }
        }
    ));
    assert!(fake.calls().is_empty());

    let request = warden_common::ActionRequest::new("org.thirdparty.updater", ServiceOperation::Stop)
        .untracked(true);
    let outcome = engine.submit(&request).await;
    assert!(outcome.succeeded());
    assert_eq!(outcome.scope, Some(Scope::User));
    assert!(outcome.status.unwrap().is_untracked());
}

#[tokio::test]
async fn test_acknowledged_but_absent_is_unknown_service() {
    let engine = engine(desktop());
    let request = warden_common::ActionRequest::new("org.nowhere.agent", ServiceOperation::Start)
        .untracked(true);
    let outcome = engine.submit(&request).await;
    assert!(matches!(
        outcome.disposition,
        Disposition::Rejected {
            rejection: PolicyRejection::UnknownService { .. }
        }
    ));
    assert_eq!(outcome.scope, None);
}

#[tokio::test]
async fn test_plan_reports_commands_without_executing() {
    let fake = desktop();
    let engine = engine(fake.clone());

    let request = warden_common::ActionRequest::new("com.apple.assistantd", ServiceOperation::Start);
    let plan = engine.plan(&request).await.unwrap();
    assert_eq!(
        plan.steps,
        vec![SupervisorAction::Enable, SupervisorAction::Load]
    );
    assert_eq!(plan.commands.len(), 2);
    assert_eq!(fake.mutations(), 0);

    let guarded = warden_common::ActionRequest::new(DONOTDISTURBD, ServiceOperation::Disable);
    assert!(matches!(
        engine.plan(&guarded).await,
        Err(warden_common::ActionRefusal::Policy(
            PolicyRejection::CriticalGuard { .. }
        ))
    ));
}

#[tokio::test]
async fn test_action_updates_cached_snapshot() {
    let fake = desktop();
    let engine = engine(fake.clone());

    engine.list_services(&ServiceFilter::all()).await;
    engine
        .request_action(PHOTOANALYSISD, ServiceOperation::Stop, false)
        .await;

    let cached = engine.query().cached().unwrap();
    let status = cached.status(PHOTOANALYSISD).unwrap();
    assert_eq!(status.loaded(), Some(false));
    assert!(status.last_action.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_submissions_are_serialized() {
    let fake = desktop();
    let engine = Arc::new(engine(fake.clone()));

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .request_action(PHOTOANALYSISD, ServiceOperation::Stop, false)
                .await
        })
    };
    let second = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .request_action(PHOTOANALYSISD, ServiceOperation::Stop, false)
                .await
        })
    };
    let first = first.await.unwrap();
    let second = second.await.unwrap();

    let mut dispositions = vec![first.disposition, second.disposition];
    dispositions.sort_by_key(|d| matches!(d, Disposition::Succeeded { noop: true }));
    assert_eq!(
        dispositions,
        vec![
            Disposition::Succeeded { noop: false },
            Disposition::Succeeded { noop: true },
        ]
    );
    // the second pipeline saw the first one's result before planning
    assert_eq!(fake.mutations(), 1);
}
