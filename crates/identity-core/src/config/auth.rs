//! Authentication configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default access token lifetime in minutes.
const DEFAULT_ACCESS_EXPIRE_MINUTES: u64 = 60;
/// Default refresh token lifetime in days.
const DEFAULT_REFRESH_EXPIRE_DAYS: u64 = 7;
/// Default confirmation code lifetime in seconds.
const DEFAULT_CODE_TTL_SECS: u64 = 15 * 60;

/// Secrets that must never sign tokens outside development.
pub const PLACEHOLDER_SECRETS: &[&str] = &["CHANGE_ME_IN_PRODUCTION", "secret", "changeme", ""];

/// Symmetric JWT algorithm used when no private key is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SymmetricAlgorithm {
    /// HMAC with SHA-256.
    #[default]
    HS256,
    /// HMAC with SHA-384.
    HS384,
    /// HMAC with SHA-512.
    HS512,
}

impl std::str::FromStr for SymmetricAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            other => Err(format!("unsupported symmetric algorithm: {other}")),
        }
    }
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordConfig {
    /// Memory cost in KiB.
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,

    /// Number of passes.
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Degree of parallelism.
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

impl PasswordConfig {
    /// The cheapest parameters argon2 accepts. Only meant for tests.
    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

const fn default_memory_kib() -> u32 {
    19 * 1024
}

const fn default_iterations() -> u32 {
    2
}

const fn default_parallelism() -> u32 {
    1
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Shared secret for symmetric signing. Generated at startup if not set.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Algorithm used with the shared secret.
    #[serde(default)]
    pub jwt_algorithm: SymmetricAlgorithm,

    /// Access token lifetime in minutes.
    #[serde(default = "default_access_expire")]
    pub access_token_expire_minutes: u64,

    /// Refresh token lifetime in days.
    #[serde(default = "default_refresh_expire")]
    pub refresh_token_expire_days: u64,

    /// PEM file holding the RSA private key. Enables RS256 signing.
    #[serde(default)]
    pub jwt_private_key_path: Option<PathBuf>,

    /// PEM file holding the RSA public key. Used for verification and JWKS.
    #[serde(default)]
    pub jwt_public_key_path: Option<PathBuf>,

    /// Lifetime of email confirmation codes in seconds.
    #[serde(default = "default_code_ttl")]
    pub confirmation_code_ttl_secs: u64,

    /// Make refresh tokens single-use.
    #[serde(default = "default_true")]
    pub refresh_rotation: bool,

    /// Password hashing cost.
    #[serde(default)]
    pub password: PasswordConfig,
}

const fn default_access_expire() -> u64 {
    DEFAULT_ACCESS_EXPIRE_MINUTES
}

const fn default_refresh_expire() -> u64 {
    DEFAULT_REFRESH_EXPIRE_DAYS
}

const fn default_code_ttl() -> u64 {
    DEFAULT_CODE_TTL_SECS
}

const fn default_true() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_algorithm: SymmetricAlgorithm::default(),
            access_token_expire_minutes: default_access_expire(),
            refresh_token_expire_days: default_refresh_expire(),
            jwt_private_key_path: None,
            jwt_public_key_path: None,
            confirmation_code_ttl_secs: default_code_ttl(),
            refresh_rotation: true,
            password: PasswordConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Create a new auth config builder.
    #[must_use]
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Access token lifetime.
    #[must_use]
    pub const fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_expire_minutes * 60)
    }

    /// Refresh token lifetime.
    #[must_use]
    pub const fn refresh_token_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_expire_days * 24 * 3600)
    }

    /// Confirmation code lifetime.
    #[must_use]
    pub const fn confirmation_code_ttl(&self) -> Duration {
        Duration::from_secs(self.confirmation_code_ttl_secs)
    }

    /// Whether the configured secret is missing or a well-known placeholder.
    #[must_use]
    pub fn has_placeholder_secret(&self) -> bool {
        self.jwt_secret
            .as_deref()
            .is_none_or(|s| PLACEHOLDER_SECRETS.contains(&s))
    }

    /// Apply `IDENTITY_*` environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var("IDENTITY_JWT_SECRET") {
            self.jwt_secret = Some(secret);
        }

        if let Some(alg) = std::env::var("IDENTITY_JWT_ALGORITHM")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.jwt_algorithm = alg;
        }

        if let Some(minutes) = std::env::var("IDENTITY_ACCESS_TOKEN_EXPIRE_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.access_token_expire_minutes = minutes;
        }

        if let Ok(path) = std::env::var("IDENTITY_JWT_PRIVATE_KEY_PATH") {
            self.jwt_private_key_path = non_empty_path(path);
        }

        if let Ok(path) = std::env::var("IDENTITY_JWT_PUBLIC_KEY_PATH") {
            self.jwt_public_key_path = non_empty_path(path);
        }

        self
    }
}

fn non_empty_path(value: String) -> Option<PathBuf> {
    if value.trim().is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

/// Builder for `AuthConfig`.
#[derive(Debug, Default)]
pub struct AuthConfigBuilder {
    config: AuthConfig,
}

impl AuthConfigBuilder {
    /// Set the shared secret.
    #[must_use]
    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.jwt_secret = Some(secret.into());
        self
    }

    /// Set the symmetric algorithm.
    #[must_use]
    pub const fn jwt_algorithm(mut self, alg: SymmetricAlgorithm) -> Self {
        self.config.jwt_algorithm = alg;
        self
    }

    /// Set access token lifetime in minutes.
    #[must_use]
    pub const fn access_token_expire_minutes(mut self, minutes: u64) -> Self {
        self.config.access_token_expire_minutes = minutes;
        self
    }

    /// Set refresh token lifetime in days.
    #[must_use]
    pub const fn refresh_token_expire_days(mut self, days: u64) -> Self {
        self.config.refresh_token_expire_days = days;
        self
    }

    /// Set the private key path.
    #[must_use]
    pub fn private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.jwt_private_key_path = Some(path.into());
        self
    }

    /// Set the public key path.
    #[must_use]
    pub fn public_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.jwt_public_key_path = Some(path.into());
        self
    }

    /// Set confirmation code lifetime in seconds.
    #[must_use]
    pub const fn confirmation_code_ttl_secs(mut self, secs: u64) -> Self {
        self.config.confirmation_code_ttl_secs = secs;
        self
    }

    /// Enable or disable single-use refresh tokens.
    #[must_use]
    pub const fn refresh_rotation(mut self, enabled: bool) -> Self {
        self.config.refresh_rotation = enabled;
        self
    }

    /// Set password hashing cost.
    #[must_use]
    pub const fn password(mut self, password: PasswordConfig) -> Self {
        self.config.password = password;
        self
    }

    /// Build the config.
    #[must_use]
    pub fn build(self) -> AuthConfig {
        self.config
    }
}
