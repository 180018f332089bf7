//! Tracing subscriber setup for the sync binary.

use crate::config::LogConfig;
use crate::error::SyncError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `log.filter`.
pub fn init_tracing(config: &LogConfig) -> Result<(), SyncError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| SyncError::Logging(format!("invalid filter {:?}: {}", config.filter, e)))?,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(config.json.then(|| fmt::layer().json()))
        .with((!config.json).then(fmt::layer))
        .try_init()
        .map_err(|e| SyncError::Logging(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(filter = %config.filter, json = config.json, "Logging initialized");
    Ok(())
}
