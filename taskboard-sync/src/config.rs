//! Configuration loading for the sync client.
//!
//! All fields are required. No defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use taskboard_gateway::{SessionConfig, StoreConfig};

pub const CONFIG_ENV: &str = "TASKBOARD_CONFIG";

/// Upper bound for the realtime coalescing window.
const MAX_COALESCE_MS: u64 = 10_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    pub store: StoreConfig,
    pub session: SessionConfig,
    pub refresh: RefreshConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshConfig {
    /// How long a change event waits for more events before refreshing.
    /// Zero refreshes immediately.
    pub coalesce_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or TASKBOARD_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl SyncConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args(std::env::args().skip(1)).or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_url("store.rest_url", &self.store.rest_url, &["http://", "https://"])?;
        require_url("store.realtime_url", &self.store.realtime_url, &["ws://", "wss://"])?;
        if self.store.api_key.trim().is_empty() {
            return Err(invalid("store.api_key", "must not be empty"));
        }
        if self.store.request_timeout_ms == 0 {
            return Err(invalid("store.request_timeout_ms", "must be > 0"));
        }
        if self.store.heartbeat_interval_ms == 0 {
            return Err(invalid("store.heartbeat_interval_ms", "must be > 0"));
        }

        let reconnect = &self.store.reconnect;
        if reconnect.initial_ms == 0 {
            return Err(invalid("store.reconnect.initial_ms", "must be > 0"));
        }
        if reconnect.max_ms < reconnect.initial_ms {
            return Err(invalid("store.reconnect.max_ms", "must be >= initial_ms"));
        }
        if !reconnect.multiplier.is_finite() || reconnect.multiplier < 1.0 {
            return Err(invalid("store.reconnect.multiplier", "must be >= 1.0"));
        }

        if self.session.access_token.trim().is_empty() {
            return Err(invalid("session.access_token", "must not be empty"));
        }
        if self.session.user_id.is_nil() {
            return Err(invalid("session.user_id", "must not be the nil uuid"));
        }

        if self.refresh.coalesce_ms > MAX_COALESCE_MS {
            return Err(ConfigError::InvalidValue {
                field: "refresh.coalesce_ms",
                reason: format!("must be <= {}", MAX_COALESCE_MS),
            });
        }
        if self.log.filter.trim().is_empty() {
            return Err(invalid("log.filter", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

fn require_url(field: &'static str, url: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    if url.trim().is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    if !schemes.iter().any(|scheme| url.starts_with(scheme)) {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("must start with one of {}", schemes.join(", ")),
        });
    }
    Ok(())
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV).ok().map(PathBuf::from)
}

fn config_path_from_args<I>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_flag_is_found_in_either_form() {
        let args = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            config_path_from_args(args(&["--verbose", "--config", "board.toml"])),
            Some(PathBuf::from("board.toml"))
        );
        assert_eq!(
            config_path_from_args(args(&["--config=/etc/board.toml"])),
            Some(PathBuf::from("/etc/board.toml"))
        );
        assert_eq!(config_path_from_args(args(&["--config"])), None);
        assert_eq!(config_path_from_args(args(&[])), None);
    }
}
