//! `wardenctl untracked`

use super::Context;
use crate::errors::EXIT_SUCCESS;
use crate::output::{self, print_json};
use anyhow::Result;
use warden_common::Scope;

pub async fn run(ctx: &Context, scope: Option<Scope>, json: bool) -> Result<i32> {
    let spinner = if json {
        None
    } else {
        output::spinner("Reading launchd state...")
    };
    let untracked = ctx.engine.query().untracked(scope).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if json {
        print_json(&untracked)?;
        return Ok(EXIT_SUCCESS);
    }

    if untracked.is_empty() {
        println!("No untracked services loaded.");
    } else {
        print!("{}", output::render_untracked(&ctx.palette, &untracked));
        println!();
        println!(
            "{}",
            ctx.palette.dim(&format!(
                "{} untracked; act on one with --untracked",
                untracked.len()
            ))
        );
    }
    if let Some(snapshot) = ctx.engine.query().cached() {
        eprint!(
            "{}",
            output::render_scope_errors(&ctx.palette, &snapshot.scope_errors)
        );
    }
    Ok(EXIT_SUCCESS)
}
