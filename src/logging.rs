//! Tracing initialisation for the `mcsim` binary.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! because the global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set. Events go to stderr so
/// command output on stdout stays machine-readable. With `json`, events are
/// written as newline-delimited JSON.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

/// Initialise from a [`LoggingConfig`], letting command-line flags win.
pub fn init_from_config(config: &LoggingConfig, force_json: bool, verbose: bool) {
    let level = if verbose {
        Level::DEBUG
    } else {
        config.level.into()
    };
    init_tracing(config.json || force_json, level);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
        tracing::info!("still logging after second init");
    }

    #[test]
    fn test_init_from_config() {
        init_from_config(&LoggingConfig::default(), false, true);
    }
}
