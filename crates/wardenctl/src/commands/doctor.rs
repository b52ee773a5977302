//! Doctor Command - diagnostics for privilege, SIP and launchd reachability
//!
//! Exit codes:
//! - 0:  user scope reachable
//! - 69: launchctl unreachable for the user scope

use super::Context;
use crate::cli::VERSION;
use crate::errors::{EXIT_SUCCESS, EXIT_SUPERVISOR_UNAVAILABLE};
use anyhow::Result;
use owo_colors::OwoColorize;
use std::time::Duration;
use warden_common::privilege::{console_uid, is_elevated, sip_status, SipStatus};
use warden_common::{Scope, SupervisorError};

pub async fn run(ctx: &Context) -> Result<i32> {
    println!();
    println!("{}", format!("wardenctl doctor v{}", VERSION).bold());
    println!("────────────────────────────────────────");

    print_privilege_state();
    print_sip_state(ctx).await;
    let user_ok = print_supervisor_state(ctx).await;

    println!();
    println!("────────────────────────────────────────");
    println!("Catalog:    {} services", ctx.engine.catalog().len());

    if user_ok {
        println!("{}", "✓ launchd reachable".green());
        Ok(EXIT_SUCCESS)
    } else {
        println!("{}", "✗ launchd unreachable for the user scope".red());
        Ok(EXIT_SUPERVISOR_UNAVAILABLE)
    }
}

fn print_privilege_state() {
    println!();
    println!("{}", "[PRIVILEGE]".cyan());
    println!("  Console uid: {}", console_uid());
    if is_elevated() {
        println!("  Effective:   {}", "root".green());
    } else {
        println!(
            "  Effective:   {} (system daemons need sudo)",
            "unprivileged".yellow()
        );
    }
}

async fn print_sip_state(ctx: &Context) {
    println!();
    println!("{}", "[SIP]".cyan());
    let supervisor = &ctx.config.supervisor;
    let timeout = Duration::from_secs(supervisor.timeout_secs);
    match sip_status(&supervisor.csrutil_path, timeout).await {
        SipStatus::Enabled => println!(
            "  Status:      {} (most Apple daemons cannot be changed)",
            "enabled".yellow()
        ),
        SipStatus::Disabled => println!("  Status:      {}", "disabled".green()),
        SipStatus::Unknown => println!("  Status:      {}", "unknown".dimmed()),
    }
}

/// Returns whether the user scope answered
async fn print_supervisor_state(ctx: &Context) -> bool {
    println!();
    println!("{}", "[LAUNCHD]".cyan());
    println!(
        "  launchctl:   {}",
        ctx.config.supervisor.launchctl_path.display()
    );

    let supervisor = ctx.engine.supervisor();
    let mut user_ok = false;
    for scope in Scope::ALL {
        let label = format!("{}:", scope);
        match supervisor.list_loaded(scope).await {
            Ok(loaded) => {
                if scope == Scope::User {
                    user_ok = true;
                }
                println!("  {:<12} {} ({} loaded)", label, "reachable".green(), loaded.len());
            }
            Err(SupervisorError::PrivilegeRequired { .. }) => {
                println!("  {:<12} {}", label, "needs root".yellow());
            }
            Err(e) => {
                println!("  {:<12} {}", label, e.to_string().red());
            }
        }
    }
    user_ok
}
