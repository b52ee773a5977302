//! Confirmation for critical-service overrides

use anyhow::Result;
use console::Term;
use owo_colors::OwoColorize;
use warden_common::{ServiceDefinition, ServiceOperation, CRITICAL_OVERRIDE_PHRASE};

/// How the override prompt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
    /// No interactive terminal to ask on
    NotInteractive,
}

/// Exact phrase match, surrounding whitespace ignored
pub fn phrase_matches(input: &str) -> bool {
    input.trim() == CRITICAL_OVERRIDE_PHRASE
}

/// Warn about the consequences and require the override phrase
pub fn confirm_override(def: &ServiceDefinition, operation: ServiceOperation) -> Result<Confirmation> {
    let term = Term::stderr();
    if !term.is_term() || !console::user_attended() {
        return Ok(Confirmation::NotInteractive);
    }

    term.write_line("")?;
    term.write_line(&format!(
        "{} {} is marked critical.",
        "WARNING:".red().bold(),
        def.identifier.bold()
    ))?;
    term.write_line(&format!("  {}", def.description))?;
    term.write_line(&format!("  If you {} it: {}", operation, def.impact))?;
    term.write_line("")?;
    term.write_line(&format!(
        "Type '{}' to continue:",
        CRITICAL_OVERRIDE_PHRASE.yellow()
    ))?;

    let input = term.read_line()?;
    if phrase_matches(&input) {
        Ok(Confirmation::Confirmed)
    } else {
        Ok(Confirmation::Declined)
    }
}
