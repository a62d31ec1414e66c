//! Log subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies.

use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogFormat;

/// Install the global subscriber.
///
/// Returns an error if a subscriber is already installed, which callers may ignore.
pub fn init_tracing(
    log_level: &str,
    format: LogFormat,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(false)
                    .with_current_span(true),
            )
            .try_init()?,
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).compact())
            .try_init()?,
    }

    Ok(())
}
