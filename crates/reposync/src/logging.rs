//! Process-wide log output.
//!
//! Library code logs through the `log` facade. [`init_logging`] bridges
//! those records into `tracing` and installs a `tracing-subscriber` fmt
//! subscriber filtered by `RUST_LOG` (default `info`).

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

static INSTALLED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to bridge log records into tracing: {0}")]
    Bridge(String),

    #[error("Failed to set global tracing subscriber: {0}")]
    Subscriber(String),
}

/// Builds the filter from `RUST_LOG`, falling back to `default_directive`.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Installs the global subscriber once.
///
/// Returns `Ok(false)` if this process already installed it. Fails instead
/// of panicking when some other subscriber or logger got there first.
pub fn init_logging(format: LogFormat) -> Result<bool, LoggingError> {
    if INSTALLED.swap(true, Ordering::AcqRel) {
        return Ok(false);
    }

    let result = install(format);
    if result.is_err() {
        INSTALLED.store(false, Ordering::Release);
    }
    result.map(|_| true)
}

fn install(format: LogFormat) -> Result<(), LoggingError> {
    tracing_log::LogTracer::init().map_err(|e| LoggingError::Bridge(e.to_string()))?;

    let filter = env_filter("info");
    let outcome = match format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            Registry::default()
                .with(filter)
                .with(fmt::layer().with_target(true)),
        ),
        LogFormat::Json => tracing::subscriber::set_global_default(
            Registry::default()
                .with(filter)
                .with(fmt::layer().json().with_current_span(false)),
        ),
    };
    outcome.map_err(|e| LoggingError::Subscriber(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        // Another test binary may own the global logger; either way a second
        // call must not panic or report a fresh install.
        let first = init_logging(LogFormat::Pretty);
        if matches!(first, Ok(true)) {
            assert!(matches!(init_logging(LogFormat::Json), Ok(false)));
        }
    }

    #[test]
    fn test_env_filter_fallback() {
        let filter = env_filter("debug");
        assert!(!filter.to_string().is_empty());
    }
}
