//! Command handlers against the fake supervisor: exit codes and side effects.

use std::sync::Arc;
use warden_common::config::ColorMode;
use warden_common::supervisor::{FakeService, FakeSupervisor};
use warden_common::{Config, Scope, SupervisorAction};
use wardenctl::cli::{ActionArgs, Commands, ListArgs};
use wardenctl::commands::{self, Context};
use wardenctl::errors::{
    EXIT_GENERAL_ERROR, EXIT_POLICY_REJECTED, EXIT_PRIVILEGE_REQUIRED, EXIT_SUCCESS,
};

fn context(fake: Arc<FakeSupervisor>) -> Context {
    let mut config = Config::default();
    config.display.color = ColorMode::Never;
    Context::with_supervisor(config, fake).unwrap()
}

fn desktop() -> Arc<FakeSupervisor> {
    Arc::new(
        FakeSupervisor::new()
            .with_service(FakeService::idle("com.apple.photoanalysisd", Scope::User))
            .with_service(FakeService::running("com.apple.donotdisturbd", Scope::User, 412))
            .with_service(FakeService::disabled("com.apple.assistantd", Scope::User))
            .with_service(FakeService::idle("com.apple.analyticsd", Scope::System)),
    )
}

fn action(identifier: &str) -> ActionArgs {
    ActionArgs {
        identifier: identifier.to_string(),
        force: false,
        untracked: false,
        dry_run: false,
        json: false,
    }
}

#[tokio::test]
async fn test_stop_succeeds() {
    let fake = desktop();
    let ctx = context(fake.clone());

    let code = commands::run(&ctx, &Commands::Stop(action("com.apple.photoanalysisd")))
        .await
        .unwrap();
    assert_eq!(code, EXIT_SUCCESS);
    assert_eq!(
        fake.executed(),
        vec![(SupervisorAction::Unload, "com.apple.photoanalysisd".to_string())]
    );
}

#[tokio::test]
async fn test_critical_disable_without_force_is_policy_rejected() {
    let fake = desktop();
    let ctx = context(fake.clone());

    let code = commands::run(&ctx, &Commands::Disable(action("com.apple.donotdisturbd")))
        .await
        .unwrap();
    assert_eq!(code, EXIT_POLICY_REJECTED);
    assert_eq!(fake.mutations(), 0);
}

#[tokio::test]
async fn test_dry_run_makes_no_mutations() {
    let fake = desktop();
    let ctx = context(fake.clone());

    let mut args = action("com.apple.assistantd");
    args.dry_run = true;
    let code = commands::run(&ctx, &Commands::Start(args)).await.unwrap();
    assert_eq!(code, EXIT_SUCCESS);
    assert_eq!(fake.mutations(), 0);
}

#[tokio::test]
async fn test_restart_not_loaded_is_policy_rejected() {
    let ctx = context(desktop());
    let code = commands::run(&ctx, &Commands::Restart(action("com.apple.assistantd")))
        .await
        .unwrap();
    assert_eq!(code, EXIT_POLICY_REJECTED);
}

#[tokio::test]
async fn test_system_action_without_root_exits_noperm() {
    let fake = Arc::new(
        FakeSupervisor::new()
            .with_service(FakeService::idle("com.apple.analyticsd", Scope::System))
            .unprivileged(),
    );
    let ctx = context(fake);
    let code = commands::run(&ctx, &Commands::Disable(action("com.apple.analyticsd")))
        .await
        .unwrap();
    assert_eq!(code, EXIT_PRIVILEGE_REQUIRED);
}

#[tokio::test]
async fn test_list_with_degraded_scope_still_succeeds() {
    let fake = Arc::new(
        FakeSupervisor::new()
            .with_service(FakeService::idle("com.apple.photoanalysisd", Scope::User))
            .unprivileged(),
    );
    let ctx = context(fake);
    let code = commands::run(&ctx, &Commands::List(ListArgs::default()))
        .await
        .unwrap();
    assert_eq!(code, EXIT_SUCCESS);

    let snapshot = ctx.engine.query().cached().unwrap();
    assert!(snapshot.scope_errors.contains_key(&Scope::System));
}

#[tokio::test]
async fn test_show_unknown_identifier() {
    let ctx = context(desktop());
    let code = commands::run(
        &ctx,
        &Commands::Show {
            identifier: "org.nowhere.agent".to_string(),
            json: false,
        },
    )
    .await
    .unwrap();
    assert_eq!(code, EXIT_GENERAL_ERROR);
}

#[tokio::test]
async fn test_catalog_needs_no_supervisor() {
    let fake = desktop();
    let ctx = context(fake.clone());
    let code = commands::run(
        &ctx,
        &Commands::Catalog {
            category: None,
            json: true,
        },
    )
    .await
    .unwrap();
    assert_eq!(code, EXIT_SUCCESS);
    assert!(fake.calls().is_empty());
}
