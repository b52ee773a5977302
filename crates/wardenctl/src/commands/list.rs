//! `wardenctl list`

use super::Context;
use crate::cli::ListArgs;
use crate::errors::EXIT_SUCCESS;
use crate::output::{self, print_json};
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use warden_common::{ListOrder, Scope, ServiceFilter, SnapshotEntry};

/// JSON shape of `list --json`
#[derive(Serialize)]
struct ListReport<'a> {
    taken_at: Option<String>,
    services: &'a [SnapshotEntry],
    scope_errors: BTreeMap<Scope, String>,
}

pub fn filter_for(args: &ListArgs, status_order_default: bool) -> ServiceFilter {
    let order = if args.by_status || status_order_default {
        ListOrder::Status
    } else {
        ListOrder::Catalog
    };
    ServiceFilter {
        category: args.category,
        scope: args.scope,
        predicate: args.predicate(),
        order,
    }
}

pub async fn run(ctx: &Context, args: &ListArgs) -> Result<i32> {
    let filter = filter_for(args, ctx.config.display.status_order);

    let spinner = if args.json {
        None
    } else {
        output::spinner("Reading launchd state...")
    };
    let entries = ctx.engine.list_services(&filter).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let snapshot = ctx.engine.query().cached();
    let scope_errors = snapshot
        .as_ref()
        .map(|s| s.scope_errors.clone())
        .unwrap_or_default();

    if args.json {
        print_json(&ListReport {
            taken_at: snapshot.map(|s| s.taken_at.to_rfc3339()),
            services: &entries,
            scope_errors,
        })?;
        return Ok(EXIT_SUCCESS);
    }

    let palette = &ctx.palette;
    if entries.is_empty() {
        println!("No services match.");
    } else if filter.order == ListOrder::Status {
        print!("{}", output::render_flat(palette, &entries));
    } else {
        print!("{}", output::render_grouped(palette, &entries));
    }

    let running = entries
        .iter()
        .filter(|e| e.status.running() == Some(true))
        .count();
    println!();
    println!(
        "{}",
        palette.dim(&format!("{} services, {} running", entries.len(), running))
    );
    eprint!("{}", output::render_scope_errors(palette, &scope_errors));
    Ok(EXIT_SUCCESS)
}
