//! Gateway configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides
//! (except `RUST_LOG`, which the log filter honours).
//! Default config path: `/etc/geotrack/gateway.toml`.
//!
//! # Required fields
//! - `schema_version = 1`
//! - `store.database_url`

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/geotrack/gateway.toml";

const DEFAULT_BIND: &str = "0.0.0.0:5555";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;
const DEFAULT_LOG_PATH: &str = "loc.json";
const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;
const DEFAULT_SINK_TIMEOUT_MS: u64 = 5000;
const DEFAULT_LOG_LEVEL: &str = "info";

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub schema_version: u32,
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub append_log: AppendLogConfig,
    pub limits: LimitsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Bound on establishing (and later acquiring) a store connection.
    pub connect_timeout: Duration,
    pub run_migrations: bool,
}

#[derive(Debug, Clone)]
pub struct AppendLogConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub max_message_bytes: usize,
    /// Bounded wait applied to every append-log and store call.
    pub sink_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default `EnvFilter` directive.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    server: Option<RawServerConfig>,
    store: Option<RawStoreConfig>,
    append_log: Option<RawAppendLogConfig>,
    limits: Option<RawLimitsConfig>,
    log: Option<RawLogConfig>,
}

#[derive(Debug, Deserialize)]
struct RawServerConfig {
    bind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStoreConfig {
    database_url: Option<String>,
    max_connections: Option<u32>,
    connect_timeout_ms: Option<u64>,
    run_migrations: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawAppendLogConfig {
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawLimitsConfig {
    max_message_bytes: Option<usize>,
    sink_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawLogConfig {
    level: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn load_config_from_path(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

pub fn load_config_from_str(toml_str: &str) -> Result<GatewayConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let schema_version = raw
        .schema_version
        .ok_or_else(|| ConfigError::MissingField("schema_version".to_owned()))?;
    if schema_version != 1 {
        return Err(ConfigError::InvalidValue(format!(
            "schema_version must be 1, got {schema_version}"
        )));
    }

    let server = ServerConfig {
        bind: raw
            .server
            .and_then(|s| s.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_owned()),
    };

    let raw_store = raw
        .store
        .ok_or_else(|| ConfigError::MissingField("store".to_owned()))?;
    let database_url = raw_store
        .database_url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingField("store.database_url".to_owned()))?;
    let max_connections = raw_store.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS);
    if max_connections == 0 {
        return Err(ConfigError::InvalidValue(
            "store.max_connections must be at least 1".to_owned(),
        ));
    }
    let store = StoreConfig {
        database_url,
        max_connections,
        connect_timeout: positive_millis(
            "store.connect_timeout_ms",
            raw_store.connect_timeout_ms,
            DEFAULT_CONNECT_TIMEOUT_MS,
        )?,
        run_migrations: raw_store.run_migrations.unwrap_or(true),
    };

    let append_log = AppendLogConfig {
        path: raw
            .append_log
            .and_then(|a| a.path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH)),
    };

    let limits = match raw.limits {
        Some(l) => LimitsConfig {
            max_message_bytes: l.max_message_bytes.unwrap_or(DEFAULT_MAX_MESSAGE_BYTES),
            sink_timeout: positive_millis(
                "limits.sink_timeout_ms",
                l.sink_timeout_ms,
                DEFAULT_SINK_TIMEOUT_MS,
            )?,
        },
        None => LimitsConfig {
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            sink_timeout: Duration::from_millis(DEFAULT_SINK_TIMEOUT_MS),
        },
    };
    if limits.max_message_bytes == 0 {
        return Err(ConfigError::InvalidValue(
            "limits.max_message_bytes must be greater than 0".to_owned(),
        ));
    }

    let log = LogConfig {
        level: raw
            .log
            .and_then(|l| l.level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned()),
    };

    Ok(GatewayConfig {
        schema_version,
        server,
        store,
        append_log,
        limits,
        log,
    })
}

fn positive_millis(field: &str, value: Option<u64>, default: u64) -> Result<Duration, ConfigError> {
    match value.unwrap_or(default) {
        0 => Err(ConfigError::InvalidValue(format!(
            "{field} must be greater than 0"
        ))),
        ms => Ok(Duration::from_millis(ms)),
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}
