//! Command-line surface

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use warden_common::{Category, Scope, StatusPredicate};

// Version is embedded at build time
pub const VERSION: &str = env!("WARDEN_VERSION");

#[derive(Parser, Debug)]
#[command(name = "wardenctl")]
#[command(about = "Inspect and control macOS launchd services", long_about = None)]
#[command(version = VERSION)]
pub struct Cli {
    /// Config file (default: $LAUNCHWARDEN_CONFIG or <config dir>/launchwarden/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List cataloged services with live status
    List(ListArgs),

    /// Show one service in detail
    Show {
        identifier: String,

        #[arg(long)]
        json: bool,
    },

    /// Load (and enable if needed) a service
    Start(ActionArgs),

    /// Unload a service
    Stop(ActionArgs),

    /// Kill and restart a loaded service
    Restart(ActionArgs),

    /// Clear the administrative disable override
    Enable(ActionArgs),

    /// Set the administrative disable override
    Disable(ActionArgs),

    /// Loaded services that are not in the catalog
    Untracked {
        #[arg(long)]
        scope: Option<Scope>,

        #[arg(long)]
        json: bool,
    },

    /// Print the bundled service catalog (no supervisor access)
    Catalog {
        #[arg(long)]
        category: Option<Category>,

        #[arg(long)]
        json: bool,
    },

    /// Check privileges, SIP and supervisor reachability
    Doctor,
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    #[arg(long)]
    pub category: Option<Category>,

    #[arg(long)]
    pub scope: Option<Scope>,

    /// Only running services
    #[arg(long, group = "status")]
    pub running: bool,

    /// Only enabled services
    #[arg(long, group = "status")]
    pub enabled: bool,

    /// Only disabled services
    #[arg(long, group = "status")]
    pub disabled: bool,

    /// Only services without a process
    #[arg(long, group = "status")]
    pub stopped: bool,

    /// Only critical services
    #[arg(long, group = "status")]
    pub critical: bool,

    /// Running first, then enabled, disabled, unknown
    #[arg(long)]
    pub by_status: bool,

    #[arg(long)]
    pub json: bool,
}

impl ListArgs {
    pub fn predicate(&self) -> Option<StatusPredicate> {
        if self.running {
            Some(StatusPredicate::Running)
        } else if self.enabled {
            Some(StatusPredicate::Enabled)
        } else if self.disabled {
            Some(StatusPredicate::Disabled)
        } else if self.stopped {
            Some(StatusPredicate::Stopped)
        } else if self.critical {
            Some(StatusPredicate::Critical)
        } else {
            None
        }
    }
}

#[derive(Args, Debug)]
pub struct ActionArgs {
    /// launchd label, e.g. com.apple.photoanalysisd
    pub identifier: String,

    /// Override the critical-service guard (asks for confirmation)
    #[arg(long)]
    pub force: bool,

    /// Act on a service that is not in the catalog
    #[arg(long)]
    pub untracked: bool,

    /// Show the launchctl commands without running them
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long)]
    pub json: bool,
}
