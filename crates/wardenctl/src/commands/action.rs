//! `wardenctl start|stop|restart|enable|disable <identifier>`

use super::Context;
use crate::cli::ActionArgs;
use crate::confirm::{confirm_override, Confirmation};
use crate::errors::{self, EXIT_POLICY_REJECTED, EXIT_SUCCESS};
use crate::output::{self, print_json};
use anyhow::Result;
use serde_json::json;
use tracing::info;
use warden_common::{
    ActionOutcome, ActionRequest, Disposition, ServiceOperation, SupervisorError,
};

pub async fn run(ctx: &Context, operation: ServiceOperation, args: &ActionArgs) -> Result<i32> {
    let request = ActionRequest::new(&args.identifier, operation)
        .with_override(args.force)
        .untracked(args.untracked);

    if args.dry_run {
        return dry_run(ctx, &request, args.json).await;
    }

    if let Some(code) = confirm_if_critical(ctx, &request)? {
        return Ok(code);
    }

    let spinner = if args.json {
        None
    } else {
        output::spinner(&format!("{} {}...", operation, args.identifier))
    };
    let outcome = ctx.engine.submit(&request).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if args.json {
        print_json(&outcome)?;
    } else {
        let manual = manual_command(ctx, &outcome);
        print!(
            "{}",
            output::render_outcome(&ctx.palette, &outcome, manual.as_deref())
        );
    }
    Ok(errors::for_disposition(&outcome.disposition))
}

/// Ask for the override phrase when `--force` would bypass the critical guard.
/// Returns an exit code when the action must not proceed.
fn confirm_if_critical(ctx: &Context, request: &ActionRequest) -> Result<Option<i32>> {
    if !request.override_critical_guard || !request.operation.is_destructive() {
        return Ok(None);
    }
    let Some(def) = ctx
        .engine
        .catalog()
        .get(&request.identifier)
        .filter(|d| d.is_critical())
    else {
        return Ok(None);
    };

    match confirm_override(def, request.operation)? {
        Confirmation::Confirmed => {
            info!("Operator confirmed critical override for {}", def.identifier);
            Ok(None)
        }
        Confirmation::Declined => {
            eprintln!(
                "{}",
                ctx.palette
                    .fail("confirmation phrase not entered; nothing changed")
            );
            Ok(Some(EXIT_POLICY_REJECTED))
        }
        Confirmation::NotInteractive => {
            eprintln!(
                "{}",
                ctx.palette.fail(
                    "refusing critical override without an interactive terminal to confirm on"
                )
            );
            Ok(Some(EXIT_POLICY_REJECTED))
        }
    }
}

async fn dry_run(ctx: &Context, request: &ActionRequest, as_json: bool) -> Result<i32> {
    match ctx.engine.plan(request).await {
        Ok(plan) => {
            if as_json {
                print_json(&plan)?;
            } else {
                print!("{}", output::render_plan(&ctx.palette, &plan));
            }
            Ok(EXIT_SUCCESS)
        }
        Err(refusal) => {
            if as_json {
                print_json(&json!({ "refused": refusal.to_string() }))?;
            } else {
                eprintln!("{}", ctx.palette.fail(&format!("refused: {}", refusal)));
            }
            Ok(errors::for_refusal(&refusal))
        }
    }
}

/// Shell command to finish a failed step by hand (with sudo where needed)
fn manual_command(ctx: &Context, outcome: &ActionOutcome) -> Option<String> {
    let Disposition::Failed {
        error: SupervisorError::PrivilegeRequired { scope },
        step,
    } = &outcome.disposition
    else {
        return None;
    };
    match step {
        Some(step) => Some(
            ctx.engine
                .supervisor()
                .command_line(*step, &outcome.identifier, *scope),
        ),
        None => Some(format!(
            "sudo wardenctl {} {}",
            outcome.operation, outcome.identifier
        )),
    }
}
