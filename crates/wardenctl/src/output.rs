//! Human and JSON rendering

use console::{pad_str, Alignment};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::io::IsTerminal;
use std::time::Duration;
use warden_common::config::ColorMode;
use warden_common::{
    ActionOutcome, ActionPlan, Category, Disposition, Scope, ServiceDefinition, ServiceStatus,
    SnapshotEntry, StatusLabel,
};

/// Identifier column width
const ID_WIDTH: usize = 44;

/// Colors on or off for one invocation
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    color: bool,
}

impl Palette {
    pub fn new(mode: ColorMode) -> Self {
        let color = match mode {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => {
                std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
            }
        };
        Self { color }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    pub fn status(&self, label: StatusLabel) -> String {
        let text = label.as_str();
        if !self.color {
            return text.to_string();
        }
        match label {
            StatusLabel::Running => text.green().to_string(),
            StatusLabel::Idle => text.cyan().to_string(),
            StatusLabel::Stopped => text.yellow().to_string(),
            StatusLabel::Disabled => text.red().to_string(),
            StatusLabel::Unknown => text.dimmed().to_string(),
        }
    }

    pub fn heading(&self, text: &str) -> String {
        if self.color {
            text.bold().cyan().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn critical(&self) -> String {
        if self.color {
            "CRITICAL".red().bold().to_string()
        } else {
            "CRITICAL".to_string()
        }
    }

    pub fn ok(&self, text: &str) -> String {
        if self.color {
            format!("{} {}", "✓".green(), text)
        } else {
            format!("✓ {}", text)
        }
    }

    pub fn fail(&self, text: &str) -> String {
        if self.color {
            format!("{} {}", "✗".red(), text.red())
        } else {
            format!("✗ {}", text)
        }
    }

    pub fn warn(&self, text: &str) -> String {
        if self.color {
            format!("{} {}", "!".yellow(), text.yellow())
        } else {
            format!("! {}", text)
        }
    }

    pub fn dim(&self, text: &str) -> String {
        if self.color {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Spinner on stderr while the supervisor is queried; None when not attached to a terminal
pub fn spinner(message: &str) -> Option<ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"])
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    Some(spinner)
}

fn state_detail(status: &ServiceStatus) -> String {
    match status.state() {
        Some(state) => {
            let mut parts = vec![
                if state.loaded { "loaded" } else { "not loaded" },
                if state.enabled { "enabled" } else { "disabled" },
            ];
            if state.running {
                parts.push("running");
            }
            let mut detail = parts.join(", ");
            if let Some(pid) = state.pid {
                detail.push_str(&format!(" (pid {})", pid));
            }
            detail
        }
        None => "unknown".to_string(),
    }
}

fn service_row(palette: &Palette, def: &ServiceDefinition, status: &ServiceStatus) -> String {
    let label = pad_str(&palette.status(status.label()), 9, Alignment::Left, None).to_string();
    let id = pad_str(&def.identifier, ID_WIDTH, Alignment::Left, Some("…")).to_string();
    let scope = pad_str(def.scope.as_str(), 7, Alignment::Left, None).to_string();
    let mut row = format!("  {} {} {} {}", label, scope, id, def.description);
    if def.is_critical() {
        row.push_str(&format!("  [{}]", palette.critical()));
    }
    row
}

/// Catalog order: grouped under category headings
pub fn render_grouped(palette: &Palette, entries: &[SnapshotEntry]) -> String {
    let mut out = String::new();
    let mut current: Option<Category> = None;
    for entry in entries {
        if current != Some(entry.definition.category) {
            if current.is_some() {
                out.push('\n');
            }
            current = Some(entry.definition.category);
            out.push_str(&palette.heading(&format!("[{}]", entry.definition.category.label())));
            out.push('\n');
        }
        out.push_str(&service_row(palette, &entry.definition, &entry.status));
        out.push('\n');
    }
    out
}

/// Status order: one flat list
pub fn render_flat(palette: &Palette, entries: &[SnapshotEntry]) -> String {
    entries
        .iter()
        .map(|e| service_row(palette, &e.definition, &e.status) + "\n")
        .collect()
}

pub fn render_detail(palette: &Palette, entry: &SnapshotEntry) -> String {
    let def = &entry.definition;
    let status = &entry.status;
    let mut lines = vec![
        palette.heading(&def.identifier),
        format!("  Category:    {}", def.category.label()),
        format!("  Scope:       {}", def.scope),
        format!(
            "  Criticality: {}",
            if def.is_critical() {
                palette.critical()
            } else {
                "normal".to_string()
            }
        ),
        format!("  Status:      {}", palette.status(status.label())),
        format!("  State:       {}", state_detail(status)),
        format!("  Description: {}", def.description),
        format!("  Impact:      {}", def.impact),
    ];
    if let warden_common::Observation::Unknown { reason } = &status.observation {
        lines.push(format!("  Reason:      {}", palette.dim(reason)));
    }
    lines.join("\n") + "\n"
}

pub fn render_untracked(palette: &Palette, statuses: &[ServiceStatus]) -> String {
    statuses
        .iter()
        .map(|s| {
            let label = pad_str(&palette.status(s.label()), 9, Alignment::Left, None).to_string();
            let scope = pad_str(s.scope.as_str(), 7, Alignment::Left, None).to_string();
            format!("  {} {} {}\n", label, scope, s.identifier)
        })
        .collect()
}

pub fn render_catalog(palette: &Palette, definitions: &[&ServiceDefinition]) -> String {
    let mut out = String::new();
    let mut current: Option<Category> = None;
    for def in definitions {
        if current != Some(def.category) {
            if current.is_some() {
                out.push('\n');
            }
            current = Some(def.category);
            out.push_str(&palette.heading(&format!("[{}]", def.category.label())));
            out.push('\n');
        }
        let scope = pad_str(def.scope.as_str(), 7, Alignment::Left, None).to_string();
        let id = pad_str(&def.identifier, ID_WIDTH, Alignment::Left, Some("…")).to_string();
        let mut row = format!("  {} {} {}", scope, id, def.description);
        if def.is_critical() {
            row.push_str(&format!("  [{}]", palette.critical()));
        }
        out.push_str(&row);
        out.push('\n');
    }
    out
}

pub fn render_scope_errors<'a>(
    palette: &Palette,
    errors: impl IntoIterator<Item = (&'a Scope, &'a String)>,
) -> String {
    errors
        .into_iter()
        .map(|(scope, reason)| {
            palette.warn(&format!("{} scope not observed: {}", scope, reason)) + "\n"
        })
        .collect()
}

pub fn render_plan(palette: &Palette, plan: &ActionPlan) -> String {
    if plan.is_noop() {
        return format!(
            "{} already {}; nothing would run\n",
            plan.identifier,
            plan.operation.past_tense()
        );
    }
    let mut out = palette.heading(&format!(
        "Would {} {} ({} scope):",
        plan.operation, plan.identifier, plan.scope
    ));
    out.push('\n');
    for command in &plan.commands {
        out.push_str(&format!("  {}\n", command));
    }
    out
}

/// Outcome summary; `manual` is the shell command to retry a failed step by hand
pub fn render_outcome(palette: &Palette, outcome: &ActionOutcome, manual: Option<&str>) -> String {
    let mut out = String::new();
    match &outcome.disposition {
        Disposition::Succeeded { noop: true } => {
            out.push_str(&palette.ok(&format!(
                "{} already {} (no changes)",
                outcome.identifier,
                outcome.operation.past_tense()
            )));
        }
        Disposition::Succeeded { noop: false } => {
            out.push_str(&palette.ok(&format!(
                "{} {}",
                outcome.identifier,
                outcome.operation.past_tense()
            )));
        }
        Disposition::Rejected { rejection } => {
            out.push_str(&palette.fail(&format!("rejected: {}", rejection)));
        }
        Disposition::Failed { error, .. } => {
            out.push_str(&palette.fail(&format!("failed: {}", error)));
        }
    }
    out.push('\n');

    if let Some(status) = &outcome.status {
        out.push_str(&format!(
            "  now: {} ({})\n",
            palette.status(status.label()),
            state_detail(status)
        ));
    }
    if let Some(reverse) = outcome.reverse {
        out.push_str(&palette.dim(&format!(
            "  undo: wardenctl {} {}\n",
            reverse, outcome.identifier
        )));
    }
    if let Some(command) = manual {
        out.push_str(&format!("  run manually: {}\n", command));
    }
    out
}
