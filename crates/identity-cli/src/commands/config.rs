//! Config show/validate/path command.

use std::path::Path;

use anyhow::Result;
use serde_json::Value;

use identity_core::config::Config;

use crate::ui;

const REDACTED: &str = "********";

/// Config actions.
#[derive(Debug, Clone, Copy)]
pub enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Check the configuration and report problems.
    Validate,
    /// Print the config file location.
    Path,
}

/// Run the config command.
///
/// # Errors
///
/// Returns error if the configuration can't be loaded or is invalid.
pub fn run_config(config_path: &Path, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => {
            println!("{}", config_path.display());
            Ok(())
        }
        ConfigAction::Show => show_config(config_path),
        ConfigAction::Validate => validate_config(config_path),
    }
}

fn show_config(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        ui::info(&format!(
            "Config file not found: {}; showing defaults",
            config_path.display()
        ));
    }

    let config = super::load_config(config_path)?;
    println!("{}", serde_json::to_string_pretty(&redacted(&config)?)?);
    Ok(())
}

fn validate_config(config_path: &Path) -> Result<()> {
    let config = match super::load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            ui::error(&format!("Invalid configuration: {e}"));
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        ui::error(&format!("Invalid configuration: {e}"));
        return Err(e.into());
    }

    if config.auth.has_placeholder_secret() && config.auth.jwt_private_key_path.is_none() {
        ui::warning("No strong signing secret configured; a random one is generated at startup");
    }
    for (label, path) in [
        ("jwtPrivateKeyPath", &config.auth.jwt_private_key_path),
        ("jwtPublicKeyPath", &config.auth.jwt_public_key_path),
    ] {
        if let Some(path) = path.as_ref().filter(|p| !p.exists()) {
            ui::warning(&format!("{label} does not exist: {}", path.display()));
        }
    }

    ui::success("Configuration is valid");
    Ok(())
}

/// Serialize the config with the shared secret masked.
fn redacted(config: &Config) -> Result<Value> {
    let mut value = serde_json::to_value(config)?;
    if let Some(secret) = value.pointer_mut("/auth/jwtSecret").filter(|v| !v.is_null()) {
        *secret = Value::String(REDACTED.to_string());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_masks_secret() {
        let mut config = Config::default();
        config.auth.jwt_secret = Some("super-secret-value".to_string());

        let value = redacted(&config).unwrap();
        assert_eq!(value["auth"]["jwtSecret"], REDACTED);
        assert!(!value.to_string().contains("super-secret-value"));
    }

    #[test]
    fn test_redacted_keeps_missing_secret_null() {
        let value = redacted(&Config::default()).unwrap();
        assert!(value["auth"]["jwtSecret"].is_null());
    }
}
