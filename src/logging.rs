//! Structured logging with `tracing`.
//!
//! Log lines go to stderr so that stdout stays reserved for command output
//! (e.g. the ingestion summary). The filter is taken from `DOCQA_LOG` when
//! set, otherwise from `logging.level`.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::LoggingConfig;

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "DOCQA_LOG";

/// Install the global subscriber. Call once, before any other work.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_env(LOG_ENV) {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| anyhow!("Invalid logging.level '{}': {}", config.level, e))?,
    };

    let registry = Registry::default().with(filter);
    if config.json {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()?;
    }

    Ok(())
}
