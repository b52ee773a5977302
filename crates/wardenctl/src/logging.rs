//! tracing setup. Logs go to stderr so stdout stays parseable.

use tracing_subscriber::EnvFilter;

/// Filter directive for a `-v` count, falling back to the configured level
pub fn level_for(verbosity: u8, configured: &str) -> String {
    match verbosity {
        0 => configured.to_string(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber. RUST_LOG wins over flags and config.
pub fn init(verbosity: u8, configured: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for(verbosity, configured)));

    // A subscriber may already be set (tests); keep the existing one
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
