//! Global subscriber setup.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Error returned when a global subscriber is already installed.
#[derive(Debug, Error)]
#[error("failed to initialise logging: {0}")]
pub struct LoggingError(String);

/// Build the filter used by [`init_logging`].
///
/// `RUST_LOG` takes precedence over `level` when it is set and valid.
pub fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()))
}

/// Install a JSON formatter as the global subscriber.
///
/// # Errors
/// Returns `LoggingError` if a global subscriber has already been set.
pub fn init_logging(level: Level) -> Result<(), LoggingError> {
    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt::layer().json().flatten_event(true).with_target(true))
        .try_init()
        .map_err(|e| LoggingError(e.to_string()))
}
