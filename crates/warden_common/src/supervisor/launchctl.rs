//! launchd adapter.
//!
//! Domain mapping: `User` -> `gui/<uid>`, `System` -> `system`.
//!
//! | operation          | command                                      |
//! |--------------------|----------------------------------------------|
//! | list loaded        | `launchctl print <domain>` (services block)  |
//! | run state          | `launchctl print <domain>/<label>`           |
//! | admin overrides    | `launchctl print-disabled <domain>`          |
//! | load               | `launchctl bootstrap <domain> <plist>`       |
//! | unload             | `launchctl bootout <domain>/<label>`         |
//! | enable / disable   | `launchctl enable|disable <domain>/<label>`  |
//! | restart            | `launchctl kickstart -k <domain>/<label>`    |

use super::{RunState, Supervisor, SupervisorAction};
use crate::config::SupervisorConfig;
use crate::error::SupervisorError;
use crate::privilege;
use crate::types::Scope;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace};

/// launchctl exit code for "Could not find service"
const EXIT_NO_SUCH_SERVICE: i32 = 113;

/// `<pid|-> <status|-> <label>` rows inside a `services = { ... }` block
static SERVICE_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:-|\d+)\s+(?:-|-?\d+|\(.*\))\s+([A-Za-z0-9._-]+)\s*$")
        .expect("service row pattern is valid")
});

/// `"label" => disabled` rows from `print-disabled`
static OVERRIDE_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*"([^"]+)"\s*=>\s*(enabled|disabled|true|false)\s*$"#)
        .expect("override row pattern is valid")
});

static STATE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*state = (.+?)\s*$").expect("state pattern is valid"));

static PID_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*pid = (\d+)\s*$").expect("pid pattern is valid"));

/// Captured output of one launchctl invocation
#[derive(Debug)]
struct LaunchctlOutput {
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl LaunchctlOutput {
    fn success(&self) -> bool {
        self.code == Some(0)
    }

    fn message(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        if text.is_empty() {
            format!("launchctl exited with code {}", self.code.unwrap_or(-1))
        } else {
            text.to_string()
        }
    }
}

/// Supervisor backed by the `launchctl` command
#[derive(Debug, Clone)]
pub struct LaunchctlSupervisor {
    launchctl: PathBuf,
    timeout: Duration,
    uid: u32,
    elevated: bool,
    agent_dirs: Vec<PathBuf>,
    daemon_dirs: Vec<PathBuf>,
}

impl LaunchctlSupervisor {
    pub fn new(config: &SupervisorConfig) -> Self {
        Self::with_identity(config, privilege::console_uid(), privilege::is_elevated())
    }

    /// Construct with an explicit uid and privilege level
    pub fn with_identity(config: &SupervisorConfig, uid: u32, elevated: bool) -> Self {
        Self {
            launchctl: config.launchctl_path.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            uid,
            elevated,
            agent_dirs: config.agent_dirs(),
            daemon_dirs: config.daemon_dirs(),
        }
    }

    /// launchd domain for a scope
    pub fn domain(&self, scope: Scope) -> String {
        match scope {
            Scope::User => format!("gui/{}", self.uid),
            Scope::System => "system".to_string(),
        }
    }

    fn service_target(&self, identifier: &str, scope: Scope) -> String {
        format!("{}/{}", self.domain(scope), identifier)
    }

    fn require_privilege(&self, scope: Scope) -> Result<(), SupervisorError> {
        if scope.requires_privilege() && !self.elevated {
            return Err(SupervisorError::PrivilegeRequired { scope });
        }
        Ok(())
    }

    /// Find the job's plist in the standard launchd directories for the scope
    pub fn resolve_plist(&self, identifier: &str, scope: Scope) -> Option<PathBuf> {
        let dirs = match scope {
            Scope::User => &self.agent_dirs,
            Scope::System => &self.daemon_dirs,
        };
        let file = format!("{}.plist", identifier);
        dirs.iter().map(|d| d.join(&file)).find(|p| p.is_file())
    }

    fn action_args(
        &self,
        action: SupervisorAction,
        identifier: &str,
        scope: Scope,
    ) -> Result<Vec<String>, SupervisorError> {
        let target = self.service_target(identifier, scope);
        let args = match action {
            SupervisorAction::Load => {
                let plist = self.resolve_plist(identifier, scope).ok_or_else(|| {
                    SupervisorError::ActionRejected {
                        reason: format!("no launchd plist found for {}", identifier),
                    }
                })?;
                vec![
                    "bootstrap".to_string(),
                    self.domain(scope),
                    plist.display().to_string(),
                ]
            }
            SupervisorAction::Unload => vec!["bootout".to_string(), target],
            SupervisorAction::Enable => vec!["enable".to_string(), target],
            SupervisorAction::Disable => vec!["disable".to_string(), target],
            SupervisorAction::Restart => vec!["kickstart".to_string(), "-k".to_string(), target],
        };
        Ok(args)
    }

    /// Run launchctl once, bounded by the configured timeout
    async fn run(&self, args: &[String]) -> Result<LaunchctlOutput, SupervisorError> {
        trace!("{} {}", self.launchctl.display(), args.join(" "));

        let mut command = Command::new(&self.launchctl);
        command.args(args).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(SupervisorError::Unavailable(format!(
                    "cannot run {}: {}",
                    self.launchctl.display(),
                    e
                )))
            }
            Err(_) => {
                return Err(SupervisorError::Unavailable(format!(
                    "launchctl {} timed out after {}s",
                    args.first().map(String::as_str).unwrap_or(""),
                    self.timeout.as_secs()
                )))
            }
        };

        Ok(LaunchctlOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[async_trait]
impl Supervisor for LaunchctlSupervisor {
    async fn list_loaded(&self, scope: Scope) -> Result<BTreeSet<String>, SupervisorError> {
        self.require_privilege(scope)?;
        let output = self.run(&["print".to_string(), self.domain(scope)]).await?;
        if !output.success() {
            return Err(SupervisorError::Unavailable(output.message()));
        }
        let loaded = parse_services_block(&output.stdout);
        debug!("{} reports {} loaded services", self.domain(scope), loaded.len());
        Ok(loaded)
    }

    async fn query_run_state(
        &self,
        identifier: &str,
        scope: Scope,
    ) -> Result<RunState, SupervisorError> {
        self.require_privilege(scope)?;
        let output = self
            .run(&["print".to_string(), self.service_target(identifier, scope)])
            .await?;
        if output.code == Some(EXIT_NO_SUCH_SERVICE)
            || output.message().contains("Could not find service")
        {
            return Ok(RunState::NotFound);
        }
        if !output.success() {
            return Err(SupervisorError::Unavailable(output.message()));
        }
        Ok(parse_run_state(&output.stdout))
    }

    async fn disabled_overrides(
        &self,
        scope: Scope,
    ) -> Result<HashMap<String, bool>, SupervisorError> {
        self.require_privilege(scope)?;
        let output = self
            .run(&["print-disabled".to_string(), self.domain(scope)])
            .await?;
        if !output.success() {
            return Err(SupervisorError::Unavailable(output.message()));
        }
        Ok(parse_disabled_overrides(&output.stdout))
    }

    async fn execute(
        &self,
        action: SupervisorAction,
        identifier: &str,
        scope: Scope,
    ) -> Result<(), SupervisorError> {
        self.require_privilege(scope)?;
        let args = self.action_args(action, identifier, scope)?;
        let output = self.run(&args).await?;
        if output.success() {
            debug!("launchctl {} {} succeeded", action, identifier);
            return Ok(());
        }
        Err(classify_failure(&output, scope))
    }

    fn command_line(&self, action: SupervisorAction, identifier: &str, scope: Scope) -> String {
        let args = self.action_args(action, identifier, scope).unwrap_or_else(|_| {
            // Unresolvable plist: still show the shape of the command
            vec![
                "bootstrap".to_string(),
                self.domain(scope),
                format!("<{}.plist>", identifier),
            ]
        });
        let prefix = if scope.requires_privilege() { "sudo " } else { "" };
        format!("{}launchctl {}", prefix, args.join(" "))
    }
}

/// Map a failed mutating call onto the error taxonomy
fn classify_failure(output: &LaunchctlOutput, scope: Scope) -> SupervisorError {
    let message = output.message();
    let lower = message.to_lowercase();
    if lower.contains("system integrity protection") {
        // SIP refusals are final: elevation would not help
        return SupervisorError::ActionRejected { reason: message };
    }
    if lower.contains("not privileged") || lower.contains("permission denied") {
        return SupervisorError::PrivilegeRequired { scope };
    }
    SupervisorError::ActionRejected { reason: message }
}

/// Labels listed in the `services = { ... }` block of `launchctl print <domain>`
pub fn parse_services_block(output: &str) -> BTreeSet<String> {
    let mut labels = BTreeSet::new();
    let mut in_block = false;
    for line in output.lines() {
        let trimmed = line.trim();
        if !in_block {
            if trimmed == "services = {" {
                in_block = true;
            }
            continue;
        }
        if trimmed == "}" {
            break;
        }
        if let Some(caps) = SERVICE_ROW.captures(line) {
            labels.insert(caps[1].to_string());
        }
    }
    labels
}

/// label -> disabled, from `launchctl print-disabled <domain>`
pub fn parse_disabled_overrides(output: &str) -> HashMap<String, bool> {
    output
        .lines()
        .filter_map(|line| OVERRIDE_ROW.captures(line))
        .map(|caps| {
            let disabled = matches!(&caps[2], "disabled" | "true");
            (caps[1].to_string(), disabled)
        })
        .collect()
}

/// Run state from `launchctl print <domain>/<label>`; the first `state =` line is the job's
pub fn parse_run_state(output: &str) -> RunState {
    let state = output
        .lines()
        .find_map(|l| STATE_LINE.captures(l).map(|c| c[1].to_string()));
    let pid = output
        .lines()
        .find_map(|l| PID_LINE.captures(l).and_then(|c| c[1].parse::<u32>().ok()));

    match state.as_deref() {
        Some("running") => RunState::Running { pid },
        Some(_) => RunState::Idle,
        None if pid.is_some() => RunState::Running { pid },
        None => RunState::Idle,
    }
}

/// Standard launch agent directories, most specific first
pub fn default_agent_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(home) = dirs::home_dir() {
        dirs.push(home.join("Library/LaunchAgents"));
    }
    dirs.push(Path::new("/Library/LaunchAgents").to_path_buf());
    dirs.push(Path::new("/System/Library/LaunchAgents").to_path_buf());
    dirs
}

/// Standard launch daemon directories, most specific first
pub fn default_daemon_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/Library/LaunchDaemons"),
        PathBuf::from("/System/Library/LaunchDaemons"),
    ]
}
