//! Serve command - run the HTTP server in the foreground.

use std::path::PathBuf;

use anyhow::Result;

use crate::ui;

/// Serve command arguments.
#[derive(Debug, Clone)]
pub struct ServeArgs {
    /// Config file.
    pub config_path: PathBuf,
    /// Port override.
    pub port: Option<u16>,
    /// Bind address override.
    pub bind: Option<String>,
}

/// Start the server and block until it exits.
///
/// # Errors
///
/// Returns error if configuration is invalid or the server fails.
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = super::load_config(&args.config_path)?;
    if !args.config_path.exists() {
        ui::warning("No configuration file found, using defaults");
    }

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.host = bind;
    }
    config.validate()?;

    if config.auth.jwt_secret.is_none() && config.auth.jwt_private_key_path.is_none() {
        ui::warning("No signing key configured; tokens won't survive a restart");
        ui::info("Run 'identity keys secret' or 'identity keys generate' to create one");
    }

    ui::header("Starting identity service");
    ui::kv(
        "Address",
        &format!("{}:{}", config.server.host, config.server.port),
    );
    ui::kv("Environment", &config.settings.app_env);
    ui::kv("Store", &format!("{:?}", config.store.backend).to_lowercase());
    ui::kv("Data", &config.data_dir().display().to_string());

    identity_server::start(config).await?;
    Ok(())
}
