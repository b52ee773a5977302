//! Core service model: definitions from the catalog, statuses from the supervisor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// Classification
// =============================================================================

/// Supervisor namespace a service lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Per-user launch agent (`gui/<uid>`)
    User,
    /// Machine-wide launch daemon (`system`), needs root
    System,
}

impl Scope {
    pub const ALL: [Scope; 2] = [Scope::User, Scope::System];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::User => "user",
            Scope::System => "system",
        }
    }

    pub fn requires_privilege(&self) -> bool {
        matches!(self, Scope::System)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" | "agent" => Ok(Scope::User),
            "system" | "daemon" => Ok(Scope::System),
            other => Err(format!("unknown scope '{}' (expected user or system)", other)),
        }
    }
}

/// Fixed set of service categories. Declaration order is display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    SiriIntelligence,
    #[serde(rename = "icloud")]
    ICloud,
    Location,
    Family,
    Media,
    Sharing,
    Analytics,
    Accessibility,
    Misc,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::SiriIntelligence,
        Category::ICloud,
        Category::Location,
        Category::Family,
        Category::Media,
        Category::Sharing,
        Category::Analytics,
        Category::Accessibility,
        Category::Misc,
    ];

    /// Machine name, as used in the catalog file and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::SiriIntelligence => "siri_intelligence",
            Category::ICloud => "icloud",
            Category::Location => "location",
            Category::Family => "family",
            Category::Media => "media",
            Category::Sharing => "sharing",
            Category::Analytics => "analytics",
            Category::Accessibility => "accessibility",
            Category::Misc => "misc",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::SiriIntelligence => "Siri & Intelligence",
            Category::ICloud => "iCloud",
            Category::Location => "Location",
            Category::Family => "Family & Screen Time",
            Category::Media => "Photos & Media",
            Category::Sharing => "Sharing & Continuity",
            Category::Analytics => "Analytics & Diagnostics",
            Category::Accessibility => "Accessibility",
            Category::Misc => "Miscellaneous",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Compare alphanumerics only so "Siri & Intelligence" and "siri-intelligence" both match
        let squash = |v: &str| -> String {
            v.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        };
        let wanted = squash(s);
        match wanted.as_str() {
            "siri" | "intelligence" => Ok(Category::SiriIntelligence),
            _ => Category::ALL
                .iter()
                .find(|c| squash(c.as_str()) == wanted || squash(c.label()) == wanted)
                .copied()
                .ok_or_else(|| format!("unknown category '{}'", s)),
        }
    }
}

/// Whether disabling the service is known to break core OS functionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    #[default]
    Normal,
    Critical,
}

impl Criticality {
    pub fn is_critical(&self) -> bool {
        matches!(self, Criticality::Critical)
    }
}

// =============================================================================
// Service Definition
// =============================================================================

/// Static metadata for one known service. Immutable after catalog load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Reverse-domain launchd label (e.g., "com.apple.photoanalysisd")
    pub identifier: String,
    pub category: Category,
    /// What the service does
    pub description: String,
    /// What breaks when it is disabled
    pub impact: String,
    pub criticality: Criticality,
    pub scope: Scope,
}

impl ServiceDefinition {
    pub fn is_critical(&self) -> bool {
        self.criticality.is_critical()
    }
}

// =============================================================================
// Operations
// =============================================================================

/// Operator-requested service transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceOperation {
    Start,
    Stop,
    Restart,
    Enable,
    Disable,
}

impl ServiceOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceOperation::Start => "start",
            ServiceOperation::Stop => "stop",
            ServiceOperation::Restart => "restart",
            ServiceOperation::Enable => "enable",
            ServiceOperation::Disable => "disable",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            ServiceOperation::Start => "started",
            ServiceOperation::Stop => "stopped",
            ServiceOperation::Restart => "restarted",
            ServiceOperation::Enable => "enabled",
            ServiceOperation::Disable => "disabled",
        }
    }

    /// The one reverse action that undoes this operation. Restart has none.
    pub fn inverse(&self) -> Option<Self> {
        match self {
            ServiceOperation::Start => Some(ServiceOperation::Stop),
            ServiceOperation::Stop => Some(ServiceOperation::Start),
            ServiceOperation::Restart => None,
            ServiceOperation::Enable => Some(ServiceOperation::Disable),
            ServiceOperation::Disable => Some(ServiceOperation::Enable),
        }
    }

    /// Operations that take a service away from the operator
    pub fn is_destructive(&self) -> bool {
        matches!(self, ServiceOperation::Stop | ServiceOperation::Disable)
    }
}

impl fmt::Display for ServiceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "start" => Ok(ServiceOperation::Start),
            "stop" => Ok(ServiceOperation::Stop),
            "restart" => Ok(ServiceOperation::Restart),
            "enable" => Ok(ServiceOperation::Enable),
            "disable" => Ok(ServiceOperation::Disable),
            other => Err(format!("unknown operation '{}'", other)),
        }
    }
}

// =============================================================================
// Service Status
// =============================================================================

/// Whether a status belongs to a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tracking {
    Cataloged,
    /// Reported by the supervisor but absent from the catalog
    Untracked,
}

/// Observed supervisor state for one service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceState {
    /// Supervisor has a record of the service this session
    pub loaded: bool,
    /// Not administratively disabled
    pub enabled: bool,
    /// Has an active process
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl ServiceState {
    pub fn not_loaded(enabled: bool) -> Self {
        Self {
            loaded: false,
            enabled,
            running: false,
            pid: None,
        }
    }
}

/// Either a confirmed observation, or an explicit "could not determine"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    Known(ServiceState),
    Unknown { reason: String },
}

/// Coarse status used for display and status-first ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLabel {
    Running,
    /// Loaded, no process
    Idle,
    /// Enabled, not loaded
    Stopped,
    Disabled,
    Unknown,
}

impl StatusLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusLabel::Running => "running",
            StatusLabel::Idle => "idle",
            StatusLabel::Stopped => "stopped",
            StatusLabel::Disabled => "disabled",
            StatusLabel::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a mediated action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionResult {
    Succeeded,
    Rejected,
    Failed,
}

/// Most recent mediated action against a service. Transient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub request_id: Uuid,
    pub operation: ServiceOperation,
    pub result: ActionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// Derived per-service status. Recomputed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub identifier: String,
    pub scope: Scope,
    pub tracking: Tracking,
    pub observation: Observation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action: Option<ActionRecord>,
}

impl ServiceStatus {
    pub fn known(identifier: &str, scope: Scope, tracking: Tracking, state: ServiceState) -> Self {
        Self {
            identifier: identifier.to_string(),
            scope,
            tracking,
            observation: Observation::Known(state),
            last_action: None,
        }
    }

    pub fn unknown(identifier: &str, scope: Scope, tracking: Tracking, reason: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            scope,
            tracking,
            observation: Observation::Unknown {
                reason: reason.to_string(),
            },
            last_action: None,
        }
    }

    pub fn state(&self) -> Option<&ServiceState> {
        match &self.observation {
            Observation::Known(state) => Some(state),
            Observation::Unknown { .. } => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.observation, Observation::Unknown { .. })
    }

    pub fn is_untracked(&self) -> bool {
        self.tracking == Tracking::Untracked
    }

    pub fn loaded(&self) -> Option<bool> {
        self.state().map(|s| s.loaded)
    }

    pub fn enabled(&self) -> Option<bool> {
        self.state().map(|s| s.enabled)
    }

    pub fn running(&self) -> Option<bool> {
        self.state().map(|s| s.running)
    }

    pub fn label(&self) -> StatusLabel {
        match self.state() {
            None => StatusLabel::Unknown,
            Some(s) if s.running => StatusLabel::Running,
            Some(s) if !s.enabled => StatusLabel::Disabled,
            Some(s) if s.loaded => StatusLabel::Idle,
            Some(_) => StatusLabel::Stopped,
        }
    }

    pub fn with_last_action(mut self, record: ActionRecord) -> Self {
        self.last_action = Some(record);
        self
    }
}
