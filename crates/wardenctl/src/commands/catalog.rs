//! `wardenctl catalog` - bundled definitions only, no supervisor access

use super::Context;
use crate::errors::EXIT_SUCCESS;
use crate::output::{self, print_json};
use anyhow::Result;
use warden_common::{Category, ServiceDefinition};

pub fn run(ctx: &Context, category: Option<Category>, json: bool) -> Result<i32> {
    let definitions: Vec<&ServiceDefinition> = ctx
        .engine
        .catalog()
        .services()
        .iter()
        .filter(|d| category.map_or(true, |c| d.category == c))
        .collect();

    if json {
        print_json(&definitions)?;
    } else {
        print!("{}", output::render_catalog(&ctx.palette, &definitions));
        let critical = definitions.iter().filter(|d| d.is_critical()).count();
        println!();
        println!(
            "{}",
            ctx.palette.dim(&format!(
                "{} services, {} critical",
                definitions.len(),
                critical
            ))
        );
    }
    Ok(EXIT_SUCCESS)
}
