//! Command handlers. Each returns the process exit code.

pub mod action;
pub mod catalog;
pub mod doctor;
pub mod list;
pub mod show;
pub mod untracked;

use crate::cli::Commands;
use crate::output::Palette;
use anyhow::Result;
use std::sync::Arc;
use warden_common::supervisor::LaunchctlSupervisor;
use warden_common::{Catalog, Config, ServiceEngine, ServiceOperation, Supervisor};

/// Everything a command needs for one invocation
pub struct Context {
    pub config: Config,
    pub engine: ServiceEngine,
    pub palette: Palette,
}

impl Context {
    /// Production context backed by launchctl
    pub fn new(config: Config) -> Result<Self> {
        let supervisor = Arc::new(LaunchctlSupervisor::new(&config.supervisor));
        Self::with_supervisor(config, supervisor)
    }

    pub fn with_supervisor(config: Config, supervisor: Arc<dyn Supervisor>) -> Result<Self> {
        let catalog = Catalog::bundled()?;
        let palette = Palette::new(config.display.color);
        Ok(Self {
            engine: ServiceEngine::new(catalog, supervisor),
            config,
            palette,
        })
    }
}

pub async fn run(ctx: &Context, command: &Commands) -> Result<i32> {
    match command {
        Commands::List(args) => list::run(ctx, args).await,
        Commands::Show { identifier, json } => show::run(ctx, identifier, *json).await,
        Commands::Start(args) => action::run(ctx, ServiceOperation::Start, args).await,
        Commands::Stop(args) => action::run(ctx, ServiceOperation::Stop, args).await,
        Commands::Restart(args) => action::run(ctx, ServiceOperation::Restart, args).await,
        Commands::Enable(args) => action::run(ctx, ServiceOperation::Enable, args).await,
        Commands::Disable(args) => action::run(ctx, ServiceOperation::Disable, args).await,
        Commands::Untracked { scope, json } => untracked::run(ctx, *scope, *json).await,
        Commands::Catalog { category, json } => catalog::run(ctx, *category, *json),
        Commands::Doctor => doctor::run(ctx).await,
    }
}
