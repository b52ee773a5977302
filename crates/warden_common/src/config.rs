//! Configuration management for launchwarden.
//!
//! Loads settings from `--config`, `$LAUNCHWARDEN_CONFIG`, or
//! `<config_dir>/launchwarden/config.toml`, falling back to defaults.

use crate::error::ConfigError;
use crate::supervisor::launchctl::{default_agent_dirs, default_daemon_dirs};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "LAUNCHWARDEN_CONFIG";

/// Longest accepted per-call supervisor timeout
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// Supervisor adapter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_launchctl_path")]
    pub launchctl_path: PathBuf,

    #[serde(default = "default_csrutil_path")]
    pub csrutil_path: PathBuf,

    /// Per-call timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Launch agent plist search path. Empty means the standard directories.
    #[serde(default)]
    pub agent_dirs: Vec<PathBuf>,

    /// Launch daemon plist search path. Empty means the standard directories.
    #[serde(default)]
    pub daemon_dirs: Vec<PathBuf>,
}

fn default_launchctl_path() -> PathBuf {
    PathBuf::from("/bin/launchctl")
}

fn default_csrutil_path() -> PathBuf {
    PathBuf::from("/usr/bin/csrutil")
}

fn default_timeout() -> u64 {
    10
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            launchctl_path: default_launchctl_path(),
            csrutil_path: default_csrutil_path(),
            timeout_secs: default_timeout(),
            agent_dirs: Vec::new(),
            daemon_dirs: Vec::new(),
        }
    }
}

impl SupervisorConfig {
    pub fn agent_dirs(&self) -> Vec<PathBuf> {
        if self.agent_dirs.is_empty() {
            default_agent_dirs()
        } else {
            self.agent_dirs.clone()
        }
    }

    pub fn daemon_dirs(&self) -> Vec<PathBuf> {
        if self.daemon_dirs.is_empty() {
            default_daemon_dirs()
        } else {
            self.daemon_dirs.clone()
        }
    }
}

/// When to emit ANSI colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

/// Presentation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// List running services first, then enabled, disabled, unknown
    #[serde(default)]
    pub status_order: bool,

    #[serde(default)]
    pub color: ColorMode,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            status_order: false,
            color: ColorMode::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("launchwarden").join("config.toml"))
    }

    /// Load config. An explicit path (argument or environment) must exist;
    /// the default location is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return Self::load_from_path(Path::new(&path));
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            Some(path) => {
                debug!("No config at {}, using defaults", path.display());
                Ok(Config::default())
            }
            None => Ok(Config::default()),
        }
    }

    /// Load config from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeout = self.supervisor.timeout_secs;
        if timeout == 0 || timeout > MAX_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "supervisor.timeout_secs must be between 1 and {} (got {})",
                MAX_TIMEOUT_SECS, timeout
            )));
        }
        if self.supervisor.launchctl_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "supervisor.launchctl_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.supervisor.launchctl_path, PathBuf::from("/bin/launchctl"));
        assert_eq!(config.supervisor.timeout_secs, 10);
        assert_eq!(config.logging.level, "warn");
        assert!(!config.display.status_order);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_partial_sections() {
        let toml = r#"
[supervisor]
timeout_secs = 3
daemon_dirs = ["/opt/daemons"]

[display]
status_order = true
color = "never"
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.supervisor.timeout_secs, 3);
        assert_eq!(config.supervisor.launchctl_path, PathBuf::from("/bin/launchctl"));
        assert_eq!(config.supervisor.daemon_dirs(), vec![PathBuf::from("/opt/daemons")]);
        assert!(config.display.status_order);
        assert_eq!(config.display.color, ColorMode::Never);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_standard_plist_dirs_when_unset() {
        let config = SupervisorConfig::default();
        assert!(config
            .daemon_dirs()
            .contains(&PathBuf::from("/System/Library/LaunchDaemons")));
        assert!(config
            .agent_dirs()
            .contains(&PathBuf::from("/Library/LaunchAgents")));
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[supervisor]\ntimeout_secs = \"soon\"").unwrap();
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[supervisor]\ntimeout_secs = 0").unwrap();
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Invalid(_))
        ));
    }
}
