//! wardenctl - inspect and control macOS launchd services

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::debug;
use warden_common::Config;
use wardenctl::cli::Cli;
use wardenctl::commands::{self, Context};
use wardenctl::{errors, logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            errors::for_error(&e)
        }
    };
    std::process::exit(code);
}

async fn run(cli: &Cli) -> Result<i32> {
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    logging::init(cli.verbose, &config.logging.level);
    debug!("wardenctl {} starting", wardenctl::cli::VERSION);

    let ctx = Context::new(config)?;
    commands::run(&ctx, &cli.command).await
}
