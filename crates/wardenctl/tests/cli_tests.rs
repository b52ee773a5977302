//! CLI integration tests for wardenctl
//!
//! Only surfaces that never reach launchctl run the real binary:
//! - wardenctl --help / --version
//! - wardenctl catalog [--category] [--json]
//! - argument and config errors
//!
//! Command handlers run in-process against the fake supervisor in `commands_tests.rs`.

use std::io::Write;
use std::process::{Command, Output};

fn wardenctl(args: &[&str]) -> Output {
    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(config, "[display]\ncolor = \"never\"").unwrap();

    Command::new(env!("CARGO_BIN_EXE_wardenctl"))
        .arg("--config")
        .arg(config.path())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run wardenctl")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_help_lists_commands() {
    let output = wardenctl(&["--help"]);
    assert!(output.status.success());
    let text = stdout(&output);
    for command in ["list", "show", "start", "stop", "restart", "enable", "disable", "untracked", "catalog", "doctor"] {
        assert!(text.contains(command), "help is missing {}", command);
    }
}

#[test]
fn test_version() {
    let output = wardenctl(&["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("wardenctl "));
}

#[test]
fn test_catalog_groups_by_category() {
    let output = wardenctl(&["catalog"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("[iCloud]"));
    assert!(text.contains("com.apple.photoanalysisd"));
    assert!(text.contains("[CRITICAL]"));
    // color = "never"
    assert!(!text.contains('\u{1b}'));
}

#[test]
fn test_catalog_json_filtered_by_category() {
    let output = wardenctl(&["catalog", "--category", "media", "--json"]);
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let services = value.as_array().unwrap();
    assert!(!services.is_empty());
    assert!(services.iter().all(|s| s["category"] == "media"));
    assert!(services
        .iter()
        .any(|s| s["identifier"] == "com.apple.photoanalysisd"));
}

#[test]
fn test_conflicting_status_flags_are_usage_errors() {
    let output = wardenctl(&["list", "--running", "--disabled"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_missing_explicit_config_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_wardenctl"))
        .args(["--config", "/nonexistent/launchwarden.toml", "catalog"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("loading configuration"));
}
