//! Identity CLI - run and administer the identity service.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use identity_core::config::{Config, LogFormat};

#[derive(Parser)]
#[command(name = "identity")]
#[command(about = "Identity - registration, login and organization service")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $IDENTITY_STATE_DIR/identity.json)
    #[arg(long, global = true, env = "IDENTITY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(long)]
        bind: Option<String>,
    },

    /// User administration against the local store
    Admin {
        #[command(subcommand)]
        action: AdminCommands,
    },

    /// Signing key utilities
    Keys {
        #[command(subcommand)]
        action: KeysCommands,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigCommands>,
    },

    /// Hash a password read from the terminal
    HashPassword,
}

#[derive(Subcommand)]
enum AdminCommands {
    /// List all users
    List,

    /// Block a user account
    Block {
        /// User id or email
        user: String,
    },

    /// Unblock a user account
    Unblock {
        /// User id or email
        user: String,
    },

    /// Change a user's platform role
    SetRole {
        /// User id or email
        user: String,

        /// Role: viewer, accountant, director, or admin
        role: String,
    },
}

#[derive(Subcommand)]
enum KeysCommands {
    /// Generate an RSA-2048 key pair for RS256 signing
    Generate {
        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,

        /// Overwrite existing key files
        #[arg(long)]
        force: bool,
    },

    /// Print a random shared secret for HS256 signing
    Secret,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration, secrets redacted
    Show,

    /// Validate configuration
    Validate,

    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(Config::default_path);

    // Logging settings come from the file when it parses; commands report
    // load errors themselves.
    let settings = commands::load_config(&config_path)
        .map(|c| c.settings)
        .unwrap_or_default();
    init_logging(cli.verbose, &settings.log_level, settings.log_format);

    match cli.command {
        Commands::Serve { port, bind } => {
            commands::run_serve(commands::serve::ServeArgs {
                config_path,
                port,
                bind,
            })
            .await?;
        }

        Commands::Admin { action } => {
            let action = match action {
                AdminCommands::List => commands::admin::AdminAction::List,
                AdminCommands::Block { user } => commands::admin::AdminAction::Block { user },
                AdminCommands::Unblock { user } => commands::admin::AdminAction::Unblock { user },
                AdminCommands::SetRole { user, role } => {
                    commands::admin::AdminAction::SetRole { user, role }
                }
            };
            commands::run_admin(commands::admin::AdminArgs {
                action,
                config_path,
            })
            .await?;
        }

        Commands::Keys { action } => {
            let action = match action {
                KeysCommands::Generate { out, force } => {
                    commands::keys::KeysAction::Generate { out, force }
                }
                KeysCommands::Secret => commands::keys::KeysAction::Secret,
            };
            commands::run_keys(action)?;
        }

        Commands::Config { action } => {
            let action = match action {
                Some(ConfigCommands::Validate) => commands::config::ConfigAction::Validate,
                Some(ConfigCommands::Path) => commands::config::ConfigAction::Path,
                Some(ConfigCommands::Show) | None => commands::config::ConfigAction::Show,
            };
            commands::run_config(&config_path, action)?;
        }

        Commands::HashPassword => {
            commands::run_hash_password(&config_path)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, level: &str, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}
