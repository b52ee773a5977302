//! Error types for launchwarden.

use crate::types::Scope;
use serde::Serialize;
use thiserror::Error;

/// Bundled catalog could not be loaded. Always fatal: no partial catalog is served.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog corrupt: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("catalog corrupt: unsupported catalog version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("catalog corrupt: entry #{index}: {reason}")]
    InvalidEntry { index: usize, reason: String },

    #[error("catalog corrupt: duplicate identifier '{0}'")]
    DuplicateIdentifier(String),

    #[error("catalog corrupt: catalog contains no services")]
    Empty,
}

/// Failure reported by the supervisor boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum SupervisorError {
    /// Control channel could not be reached, or the call timed out.
    #[error("supervisor unavailable: {0}")]
    Unavailable(String),

    /// Scope needs elevated privilege the process does not have.
    #[error("{scope} scope requires administrator privileges")]
    PrivilegeRequired { scope: Scope },

    /// The supervisor executed the call and refused it.
    #[error("supervisor rejected the action: {reason}")]
    ActionRejected { reason: String },
}

impl SupervisorError {
    /// Stable short code for logs and JSON output
    pub fn code(&self) -> &'static str {
        match self {
            SupervisorError::Unavailable(_) => "supervisor_unavailable",
            SupervisorError::PrivilegeRequired { .. } => "privilege_required",
            SupervisorError::ActionRejected { .. } => "action_rejected",
        }
    }
}

/// Configuration file problems. A missing file is not an error; a malformed one is.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value: {0}")]
    Invalid(String),
}
