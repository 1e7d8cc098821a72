use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{PanoplyError, PanoplyResult};

/// Builds the filter from `RUST_LOG` when set, otherwise from the configured level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Installs the global subscriber. Output goes to stdout.
///
/// Fails if a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> PanoplyResult<()> {
    let filter = env_filter(config);

    let result = if config.json_format {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stdout))
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stdout),
            )
            .with(filter)
            .try_init()
    };

    result.map_err(|e| PanoplyError::Internal(format!("Failed to initialize logging: {}", e)))
}
