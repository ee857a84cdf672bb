use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Parse a configured level string into a filter.
pub fn parse_level(level: &str) -> Result<LevelFilter, String> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        other => Err(format!(
            "Invalid logging.level '{}'. Valid values: trace, debug, info, warn, error",
            other
        )),
    }
}

/// Install the global tracing subscriber.
///
/// The configured level is the default directive; `RUST_LOG` may refine it.
pub fn init_logging(logging_config: &LoggingConfig) -> Result<(), String> {
    let level_filter = parse_level(&logging_config.level)?;

    let filter_layer = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .from_env_lossy();

    let result = match logging_config.format.to_lowercase().as_str() {
        "json" => {
            // Structured output, one object per line
            tracing_subscriber::registry()
                .with(filter_layer)
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(false)
                        .with_file(true)
                        .with_line_number(true),
                )
                .try_init()
        }
        "console" => tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt::layer().pretty())
            .try_init(),
        other => {
            // Fallback to console if unknown
            let result = tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt::layer().pretty())
                .try_init();
            tracing::warn!(
                format = other,
                "Unknown logging.format, falling back to console output"
            );
            result
        }
    };

    result.map_err(|e| format!("Failed to install tracing subscriber: {}", e))?;

    tracing::debug!(
        service_name = logging_config.service_name.as_str(),
        service_version = logging_config.service_version.as_str(),
        "logging initialized"
    );
    Ok(())
}
