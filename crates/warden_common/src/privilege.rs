//! Privilege and platform protection checks

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Check if we're running as root
pub fn is_elevated() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Uid whose GUI domain holds the operator's launch agents.
///
/// Under `sudo` the effective uid is 0, so the invoking user comes from `SUDO_UID`.
pub fn console_uid() -> u32 {
    if is_elevated() {
        if let Some(uid) = std::env::var("SUDO_UID")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
        {
            return uid;
        }
    }
    unsafe { libc::getuid() }
}

/// System Integrity Protection state as reported by `csrutil status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SipStatus {
    Enabled,
    Disabled,
    Unknown,
}

impl SipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SipStatus::Enabled => "enabled",
            SipStatus::Disabled => "disabled",
            SipStatus::Unknown => "unknown",
        }
    }
}

/// Query SIP, giving up after `timeout`. With SIP enabled most system daemon
/// changes are refused by launchd.
pub async fn sip_status(csrutil: &Path, timeout: Duration) -> SipStatus {
    let mut command = Command::new(csrutil);
    command.arg("status").kill_on_drop(true);

    match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) if output.status.success() => {
            parse_sip_status(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(Ok(output)) => {
            debug!("csrutil exited with {:?}", output.status.code());
            SipStatus::Unknown
        }
        Ok(Err(e)) => {
            debug!("csrutil unavailable: {}", e);
            SipStatus::Unknown
        }
        Err(_) => {
            debug!("csrutil status timed out after {}s", timeout.as_secs());
            SipStatus::Unknown
        }
    }
}

pub fn parse_sip_status(output: &str) -> SipStatus {
    let line = output
        .lines()
        .find(|l| l.contains("System Integrity Protection status"))
        .unwrap_or("");
    if line.contains("disabled") {
        SipStatus::Disabled
    } else if line.contains("enabled") {
        SipStatus::Enabled
    } else {
        SipStatus::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sip_enabled() {
        assert_eq!(
            parse_sip_status("System Integrity Protection status: enabled.\n"),
            SipStatus::Enabled
        );
    }

    #[test]
    fn test_parse_sip_disabled_with_custom_configuration() {
        let output = "System Integrity Protection status: disabled.\n\nConfiguration:\n\tKext Signing: enabled\n";
        assert_eq!(parse_sip_status(output), SipStatus::Disabled);
    }

    #[test]
    fn test_parse_sip_garbage() {
        assert_eq!(parse_sip_status("command not found"), SipStatus::Unknown);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_csrutil_is_unknown() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("csrutil");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let started = std::time::Instant::now();
        assert_eq!(
            sip_status(&script, Duration::from_secs(1)).await,
            SipStatus::Unknown
        );
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_missing_csrutil_is_unknown() {
        assert_eq!(
            sip_status(Path::new("/nonexistent/csrutil"), Duration::from_secs(1)).await,
            SipStatus::Unknown
        );
    }
}
