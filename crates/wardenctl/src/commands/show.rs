//! `wardenctl show <identifier>`

use super::Context;
use crate::errors::{EXIT_GENERAL_ERROR, EXIT_SUCCESS};
use crate::output::{self, print_json};
use anyhow::Result;

pub async fn run(ctx: &Context, identifier: &str, json: bool) -> Result<i32> {
    if !ctx.engine.catalog().contains(identifier) {
        eprintln!(
            "{}",
            ctx.palette.fail(&format!(
                "'{}' is not in the catalog (see `wardenctl untracked`)",
                identifier
            ))
        );
        return Ok(EXIT_GENERAL_ERROR);
    }

    let Some(entry) = ctx.engine.query().service(identifier).await else {
        return Ok(EXIT_GENERAL_ERROR);
    };

    if json {
        print_json(&entry)?;
    } else {
        print!("{}", output::render_detail(&ctx.palette, &entry));
    }
    Ok(EXIT_SUCCESS)
}
