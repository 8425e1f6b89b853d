//! Tracing subscriber setup for hosts embedding the engine.

use tracing::Level;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level used when `RUST_LOG` is not set
    pub level: Level,
    /// Include the event target (module path)
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            with_target: false,
        }
    }
}

impl LogConfig {
    /// Verbose output at debug level.
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            ..Self::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_ascii_lowercase()))
    }
}

/// Installs a global compact subscriber.
///
/// Returns an error if a global subscriber is already set.
pub fn try_init(config: &LogConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(config.with_target)
                .with_level(true)
                .compact(),
        )
        .with(config.filter())
        .try_init()
}

/// Installs a global compact subscriber, ignoring an already installed one.
pub fn init(config: &LogConfig) {
    if try_init(config).is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
