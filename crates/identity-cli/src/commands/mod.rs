//! CLI command implementations.

pub mod admin;
pub mod config;
pub mod hash_password;
pub mod keys;
pub mod serve;

pub use admin::run_admin;
pub use config::run_config;
pub use hash_password::run_hash_password;
pub use keys::run_keys;
pub use serve::run_serve;

use std::path::Path;

use identity_core::config::{Config, ConfigError};

/// Load the config file at `path`, or defaults when it doesn't exist, then
/// apply `IDENTITY_*` environment overrides.
///
/// # Errors
///
/// Returns error if the file can't be parsed or an override is malformed.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config = if path.exists() {
        Config::load(path)?
    } else {
        Config::default()
    };
    config.with_env_overrides()
}
