//! # Identity Server
//!
//! HTTP identity service: registration with email confirmation, login,
//! JWT access and refresh tokens, organizations and role-based access.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod auth;
pub mod error;
pub mod events;
pub mod middleware;
pub mod models;
pub mod orgs;
pub mod registry;
mod server;

pub use audit::{AuditLog, AuditRecord};
pub use auth::{
    AuthService, CurrentUser, CurrentUserResolver, KeyProvider, PasswordHasher, TokenCodec,
};
pub use error::IdentityError;
pub use events::BroadcastPublisher;
pub use orgs::OrganizationService;
pub use server::{ApiJson, AppState, SERVICE_NAME, Server, ServerBuilder, router};

use identity_core::config::Config;

/// Start the identity server.
///
/// # Errors
///
/// Returns error if server fails to start.
pub async fn start(config: Config) -> Result<(), ServerError> {
    let server = Server::new(config)?;
    server.run().await
}

/// Server startup errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
