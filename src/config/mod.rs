pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// How the upstream chatbot is consulted for a classification turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierMode {
    /// Stream the turn and watch for tool-call deltas inline.
    #[default]
    Incremental,
    /// Buffer one non-streaming completion and read the tool call off it.
    SingleShot,
}

impl fmt::Display for ClassifierMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierMode::Incremental => write!(f, "incremental"),
            ClassifierMode::SingleShot => write!(f, "single_shot"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
}

fn default_port() -> u16 {
    8787
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    180
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
        }
    }
}

/// Upstream chatbot configuration (the classifier backend).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub chat_url: String,
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub classifier_mode: ClassifierMode,
}

/// One department backend: endpoint plus bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentConfig {
    pub chat_url: String,
    pub api_key: String,
}

/// The fixed set of department backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentsConfig {
    pub sports: DepartmentConfig,
    pub electronics: DepartmentConfig,
    pub travel: DepartmentConfig,
}

/// Cross-origin settings for the browser-facing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

fn default_allowed_origin() -> String {
    "*".to_string()
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origin: default_allowed_origin(),
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub departments: DepartmentsConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Resolve a `${VAR}` credential reference against the process environment.
///
/// Inline values pass through unchanged. An unset variable resolves to the
/// empty string; the entry check at request time reports it as a missing
/// credential.
#[must_use]
pub fn resolve_key(raw: &str) -> String {
    let Some(name) = raw.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) else {
        return raw.to_string();
    };
    match std::env::var(name) {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!("environment variable '{name}' referenced by config is not set");
            String::new()
        }
    }
}

fn resolve_credentials(config: &mut AppConfig) {
    config.upstream.api_key = resolve_key(&config.upstream.api_key);
    for department in [
        &mut config.departments.sports,
        &mut config.departments.electronics,
        &mut config.departments.travel,
    ] {
        department.api_key = resolve_key(&department.api_key);
    }
}

/// Load configuration from a YAML file, resolve credential references, and
/// validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let mut config: AppConfig = serde_yaml::from_str(&contents)?;
    resolve_credentials(&mut config);
    validate_config(&config)?;
    Ok(config)
}
