//! Configuration loading and validation.
//!
//! JSON5 file at `~/.identity/identity.json`, with `IDENTITY_*` environment
//! overrides applied on top.

mod auth;

pub use auth::{
    AuthConfig, AuthConfigBuilder, PLACEHOLDER_SECRETS, PasswordConfig, SymmetricAlgorithm,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Token, key and password settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Storage backend selection.
    #[serde(default)]
    pub store: StoreConfig,

    /// Domain event publishing.
    #[serde(default)]
    pub events: EventsConfig,

    /// External company registry.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Per-client request limits.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Global settings.
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns error if config cannot be loaded or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a path.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("identity.json")
    }

    /// Get the service state directory.
    ///
    /// Uses `IDENTITY_STATE_DIR` env var if set, otherwise `~/.identity`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("IDENTITY_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".identity")
        } else {
            PathBuf::from(".identity")
        }
    }

    /// Directory of the persistent store, unless overridden by `store.path`.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| Self::state_dir().join("data"))
    }

    /// Whether the service runs with production safeguards.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.settings.app_env.eq_ignore_ascii_case("production")
    }

    /// Apply `IDENTITY_*` environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if a numeric or JSON variable is malformed.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        self.auth = self.auth.with_env_overrides();

        if let Ok(host) = std::env::var("IDENTITY_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("IDENTITY_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::Validation(format!("IDENTITY_PORT is not a port: {port}")))?;
        }
        if let Ok(origins) = std::env::var("IDENTITY_CORS_ORIGINS") {
            self.server.cors_origins = serde_json::from_str(&origins).map_err(|e| {
                ConfigError::Validation(format!("IDENTITY_CORS_ORIGINS must be a JSON array: {e}"))
            })?;
        }
        if let Ok(backend) = std::env::var("IDENTITY_STORE_BACKEND") {
            self.store.backend = backend.parse().map_err(ConfigError::Validation)?;
        }
        if let Ok(path) = std::env::var("IDENTITY_STORE_PATH") {
            self.store.path = Some(PathBuf::from(path));
        }
        if let Ok(url) = std::env::var("IDENTITY_REGISTRY_URL") {
            self.registry.base_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Ok(env) = std::env::var("IDENTITY_APP_ENV") {
            self.settings.app_env = env;
        }
        if let Ok(level) = std::env::var("IDENTITY_LOG_LEVEL") {
            self.settings.log_level = level;
        }

        Ok(self)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.auth.access_token_expire_minutes == 0 {
            return Err(ConfigError::Validation(
                "accessTokenExpireMinutes must be positive".to_string(),
            ));
        }

        if self.auth.refresh_token_expire_days == 0 {
            return Err(ConfigError::Validation(
                "refreshTokenExpireDays must be positive".to_string(),
            ));
        }

        if self.auth.confirmation_code_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "confirmationCodeTtlSecs must be positive".to_string(),
            ));
        }

        if self.is_production()
            && self.auth.jwt_private_key_path.is_none()
            && self.auth.has_placeholder_secret()
        {
            return Err(ConfigError::Validation(
                "jwtSecret must be set to a strong value in production \
                 (or configure jwtPrivateKeyPath)"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8200
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
    ]
}

const fn default_timeout() -> u64 {
    30
}

const fn default_true() -> bool {
    true
}

/// Storage backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Embedded sled database.
    #[default]
    Sled,
    /// Process memory, lost on restart.
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sled" => Ok(Self::Sled),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Which backend to open at startup.
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database directory. Defaults to `<state dir>/data`.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Use the in-memory store if the persistent one cannot be opened.
    #[serde(default = "default_true")]
    pub fallback_to_memory: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: None,
            fallback_to_memory: true,
        }
    }
}

/// Domain event publishing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsConfig {
    /// Whether events are published at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Broadcast channel capacity.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_capacity: default_channel_capacity(),
        }
    }
}

const fn default_channel_capacity() -> usize {
    256
}

/// External company registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Base URL of the lookup API. Lookups are disabled when unset.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Lookup timeout in seconds.
    #[serde(default = "default_registry_timeout")]
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_registry_timeout(),
        }
    }
}

const fn default_registry_timeout() -> u64 {
    5
}

/// Rate limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Requests per minute per client on signup, login and refresh.
    #[serde(default = "default_auth_rpm")]
    pub auth_rpm: u32,

    /// Requests per minute per client on everything else.
    #[serde(default = "default_api_rpm")]
    pub api_rpm: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth_rpm: default_auth_rpm(),
            api_rpm: default_api_rpm(),
        }
    }
}

const fn default_auth_rpm() -> u32 {
    20
}

const fn default_api_rpm() -> u32 {
    300
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    /// Deployment environment (`development`, `production`, ...).
    #[serde(default = "default_app_env")]
    pub app_env: String,

    /// Default log level filter.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            app_env: default_app_env(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

fn default_app_env() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format.
    #[default]
    Pretty,
    /// JSON format.
    Json,
}
