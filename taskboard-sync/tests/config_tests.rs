use proptest::prelude::*;
use std::io::Write;
use taskboard_gateway::{ReconnectConfig, SessionConfig, StoreConfig};
use taskboard_sync::config::{ConfigError, LogConfig, RefreshConfig, SyncConfig};
use uuid::Uuid;

fn base_config() -> SyncConfig {
    SyncConfig {
        store: StoreConfig {
            rest_url: "https://board.example.co/rest/v1".to_string(),
            realtime_url: "wss://board.example.co/realtime/v1/websocket".to_string(),
            api_key: "anon-key".to_string(),
            request_timeout_ms: 5_000,
            heartbeat_interval_ms: 30_000,
            reconnect: ReconnectConfig {
                initial_ms: 250,
                max_ms: 5_000,
                multiplier: 1.5,
                jitter_ms: 100,
            },
        },
        session: SessionConfig {
            access_token: "jwt".to_string(),
            user_id: Uuid::now_v7(),
        },
        refresh: RefreshConfig { coalesce_ms: 50 },
        log: LogConfig {
            filter: "taskboard_sync=debug,info".to_string(),
            json: false,
        },
    }
}

const SAMPLE: &str = r#"
[store]
rest_url = "https://board.example.co/rest/v1"
realtime_url = "wss://board.example.co/realtime/v1/websocket"
api_key = "anon-key"
request_timeout_ms = 5000
heartbeat_interval_ms = 30000

[store.reconnect]
initial_ms = 250
max_ms = 5000
multiplier = 2.0
jitter_ms = 100

[session]
access_token = "jwt"
user_id = "0190b5d2-7c1e-7a3b-9f2e-4d5c6b7a8e9f"

[refresh]
coalesce_ms = 0

[log]
filter = "info"
json = true
"#;

fn invalid_field(result: Result<(), ConfigError>) -> &'static str {
    match result {
        Err(ConfigError::InvalidValue { field, .. }) => field,
        other => panic!("expected InvalidValue, got {other:?}"),
    }
}

#[test]
fn base_config_is_valid() {
    base_config().validate().unwrap();
}

#[test]
fn config_file_round_trips_through_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SAMPLE.as_bytes()).unwrap();

    let config = SyncConfig::from_path(file.path()).unwrap();
    config.validate().unwrap();
    assert_eq!(config.store.reconnect.multiplier, 2.0);
    assert_eq!(config.refresh.coalesce_ms, 0);
    assert!(config.log.json);
    assert_eq!(
        config.session.owner().as_uuid().to_string(),
        "0190b5d2-7c1e-7a3b-9f2e-4d5c6b7a8e9f"
    );
}

#[test]
fn unknown_keys_are_rejected() {
    let text = SAMPLE.replace("[refresh]", "[refresh]\ninterval_ms = 10");
    assert!(matches!(
        SyncConfig::from_toml(&text),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = SyncConfig::from_path(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn config_requires_urls_with_the_right_scheme() {
    let mut config = base_config();
    config.store.rest_url = "  ".to_string();
    assert_eq!(invalid_field(config.validate()), "store.rest_url");

    let mut config = base_config();
    config.store.realtime_url = "https://board.example.co/realtime".to_string();
    assert_eq!(invalid_field(config.validate()), "store.realtime_url");
}

#[test]
fn config_requires_credentials() {
    let mut config = base_config();
    config.store.api_key = String::new();
    assert_eq!(invalid_field(config.validate()), "store.api_key");

    let mut config = base_config();
    config.session.access_token = " ".to_string();
    assert_eq!(invalid_field(config.validate()), "session.access_token");

    let mut config = base_config();
    config.session.user_id = Uuid::nil();
    assert_eq!(invalid_field(config.validate()), "session.user_id");
}

#[test]
fn config_requires_sane_reconnect_settings() {
    let mut config = base_config();
    config.store.reconnect.max_ms = 100;
    assert_eq!(invalid_field(config.validate()), "store.reconnect.max_ms");

    let mut config = base_config();
    config.store.reconnect.multiplier = f64::NAN;
    assert_eq!(invalid_field(config.validate()), "store.reconnect.multiplier");
}

#[test]
fn config_requires_a_log_filter() {
    let mut config = base_config();
    config.log.filter = String::new();
    assert_eq!(invalid_field(config.validate()), "log.filter");
}

proptest! {
    #[test]
    fn zero_durations_are_rejected(which in 0usize..3) {
        let mut config = base_config();
        let expected = match which {
            0 => { config.store.request_timeout_ms = 0; "store.request_timeout_ms" }
            1 => { config.store.heartbeat_interval_ms = 0; "store.heartbeat_interval_ms" }
            _ => { config.store.reconnect.initial_ms = 0; "store.reconnect.initial_ms" }
        };
        prop_assert_eq!(invalid_field(config.validate()), expected);
    }

    #[test]
    fn coalesce_window_is_bounded(coalesce_ms in 0u64..20_000) {
        let mut config = base_config();
        config.refresh.coalesce_ms = coalesce_ms;
        prop_assert_eq!(config.validate().is_ok(), coalesce_ms <= 10_000);
    }

    #[test]
    fn multipliers_below_one_are_rejected(multiplier in 0.0f64..3.0) {
        let mut config = base_config();
        config.store.reconnect.multiplier = multiplier;
        prop_assert_eq!(config.validate().is_ok(), multiplier >= 1.0);
    }
}
