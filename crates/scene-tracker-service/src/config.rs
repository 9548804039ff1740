//! Service configuration: JSON file + schema validation + environment
//! overrides.
//!
//! Layering, highest priority first:
//!
//! 1. `TRACKER_*` environment variables (empty values are treated as
//!    unset)
//! 2. The JSON configuration file, validated against the operator-supplied
//!    schema
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use scene_tracker_core::TrackerError;

use crate::scenes::ScenesConfig;
use crate::schema::Schema;

/// Environment variable names for runtime configuration overrides.
pub mod env {
    /// Log level override (trace/debug/info/warn/error)
    pub const LOG_LEVEL: &str = "TRACKER_LOG_LEVEL";
    /// Healthcheck port override (1024-65535)
    pub const HEALTHCHECK_PORT: &str = "TRACKER_HEALTHCHECK_PORT";
    /// Bus broker host override
    pub const BUS_HOST: &str = "TRACKER_BUS_HOST";
    /// Bus broker port override
    pub const BUS_PORT: &str = "TRACKER_BUS_PORT";
    /// Bus insecure-transport override (true/false)
    pub const BUS_INSECURE: &str = "TRACKER_BUS_INSECURE";
    /// Scene file path override
    pub const SCENES_FILE_PATH: &str = "TRACKER_SCENES_FILE_PATH";
    /// Schema validation toggle override (true/false)
    pub const SCHEMA_VALIDATION: &str = "TRACKER_SCHEMA_VALIDATION";
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// TLS material for the bus connection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    /// CA certificate path
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
    /// Client certificate path
    #[serde(default)]
    pub client_cert: Option<PathBuf>,
    /// Client private key path
    #[serde(default)]
    pub client_key: Option<PathBuf>,
    /// Verify the server certificate (default true)
    #[serde(default = "default_true")]
    pub verify_server: bool,
}

/// Bus endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Broker hostname
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Plain TCP instead of TLS
    #[serde(default)]
    pub insecure: bool,
    /// TLS material, used when `insecure` is false
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    /// Upper bound on the reconnect backoff, seconds (default 30)
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_reconnect_delay() -> u64 {
    30
}

/// Fully resolved service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Log level: trace, debug, info, warn, or error
    pub log_level: String,
    /// Healthcheck server port
    pub healthcheck_port: u16,
    /// Bus endpoint
    pub bus: BusConfig,
    /// Scene source
    pub scenes: ScenesConfig,
    /// Validate bus payloads against the message schemas
    pub schema_validation: bool,
    /// Directory of the config file, used to resolve relative paths
    pub config_dir: PathBuf,
}

// Raw shape of the JSON config file.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    observability: Observability,
    #[serde(default)]
    infrastructure: Infrastructure,
    bus: BusConfig,
    scenes: ScenesConfig,
    #[serde(default = "default_true")]
    schema_validation: bool,
}

#[derive(Debug, Default, Deserialize)]
struct Observability {
    #[serde(default)]
    logging: Logging,
}

#[derive(Debug, Deserialize)]
struct Logging {
    #[serde(default = "default_log_level")]
    level: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Infrastructure {
    #[serde(default)]
    tracker: TrackerInfra,
}

#[derive(Debug, Default, Deserialize)]
struct TrackerInfra {
    #[serde(default)]
    healthcheck: Healthcheck,
}

#[derive(Debug, Deserialize)]
struct Healthcheck {
    #[serde(default = "default_healthcheck_port")]
    port: u16,
}

impl Default for Healthcheck {
    fn default() -> Self {
        Self {
            port: default_healthcheck_port(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_healthcheck_port() -> u16 {
    8080
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load and validate the service configuration.
///
/// The config file is validated against the schema at `schema_path` before
/// field extraction; environment overrides apply afterwards and are
/// themselves validated.
pub fn load_config(config_path: &Path, schema_path: &Path) -> Result<ServiceConfig, TrackerError> {
    let config_text = std::fs::read_to_string(config_path).map_err(|e| {
        TrackerError::config(format!(
            "failed to open config file {}: {e}",
            config_path.display()
        ))
    })?;
    let config_doc: Value = serde_json::from_str(&config_text).map_err(|e| {
        TrackerError::config(format!(
            "failed to parse config JSON {}: {e}",
            config_path.display()
        ))
    })?;

    let schema_text = std::fs::read_to_string(schema_path).map_err(|e| {
        TrackerError::config(format!(
            "failed to open schema file {}: {e}",
            schema_path.display()
        ))
    })?;
    let schema = Schema::from_str(&schema_text)?;
    schema.validate(&config_doc).map_err(|e| {
        TrackerError::config(format!(
            "config validation failed for {}: {e}",
            config_path.display()
        ))
    })?;

    let raw: RawConfig = serde_json::from_value(config_doc)
        .map_err(|e| TrackerError::config(format!("invalid config structure: {e}")))?;

    let config_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut config = ServiceConfig {
        log_level: raw.observability.logging.level,
        healthcheck_port: raw.infrastructure.tracker.healthcheck.port,
        bus: raw.bus,
        scenes: raw.scenes,
        schema_validation: raw.schema_validation,
        config_dir,
    };

    apply_env_overrides(&mut config)?;
    validate(&config)?;
    Ok(config)
}

/// Optional environment variable; empty values count as unset.
fn get_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn apply_env_overrides(config: &mut ServiceConfig) -> Result<(), TrackerError> {
    if let Some(level) = get_env(env::LOG_LEVEL) {
        config.log_level = level;
    }
    if let Some(port) = get_env(env::HEALTHCHECK_PORT) {
        config.healthcheck_port = parse_port(&port, env::HEALTHCHECK_PORT)?;
    }
    if let Some(host) = get_env(env::BUS_HOST) {
        config.bus.host = host;
    }
    if let Some(port) = get_env(env::BUS_PORT) {
        config.bus.port = port
            .parse()
            .map_err(|_| TrackerError::config(format!("invalid {}: {port}", env::BUS_PORT)))?;
    }
    if let Some(insecure) = get_env(env::BUS_INSECURE) {
        config.bus.insecure = parse_bool(&insecure, env::BUS_INSECURE)?;
    }
    if let Some(path) = get_env(env::SCENES_FILE_PATH) {
        config.scenes.file_path = Some(PathBuf::from(path));
    }
    if let Some(validation) = get_env(env::SCHEMA_VALIDATION) {
        config.schema_validation = parse_bool(&validation, env::SCHEMA_VALIDATION)?;
    }
    Ok(())
}

fn parse_port(value: &str, source: &str) -> Result<u16, TrackerError> {
    let port: u32 = value
        .parse()
        .map_err(|_| TrackerError::config(format!("invalid {source}: {value}")))?;
    if !(1024..=65535).contains(&port) {
        return Err(TrackerError::config(format!(
            "{source} out of range: {value} (must be 1024-65535)"
        )));
    }
    Ok(port as u16)
}

fn parse_bool(value: &str, source: &str) -> Result<bool, TrackerError> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(TrackerError::config(format!(
            "invalid {source}: {value} (must be true|false)"
        ))),
    }
}

fn validate(config: &ServiceConfig) -> Result<(), TrackerError> {
    match config.log_level.as_str() {
        "trace" | "debug" | "info" | "warn" | "warning" | "error" => {}
        other => {
            return Err(TrackerError::config(format!(
                "invalid log level: {other} (must be trace|debug|info|warn|error)"
            )))
        }
    }

    if config.healthcheck_port < 1024 {
        return Err(TrackerError::config(format!(
            "healthcheck port out of range: {} (must be 1024-65535)",
            config.healthcheck_port
        )));
    }

    // TLS material must exist on disk when a secure connection names it.
    if !config.bus.insecure {
        if let Some(tls) = &config.bus.tls {
            for (label, path) in [
                ("ca_cert", &tls.ca_cert),
                ("client_cert", &tls.client_cert),
                ("client_key", &tls.client_key),
            ] {
                if let Some(path) = path {
                    let resolved = if path.is_absolute() {
                        path.clone()
                    } else {
                        config.config_dir.join(path)
                    };
                    if !resolved.exists() {
                        return Err(TrackerError::config(format!(
                            "TLS {label} file not found: {}",
                            resolved.display()
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
