//! # Identity Core
//!
//! Domain types, configuration, and storage for the identity service.
//!
//! This crate provides:
//! - Configuration loading and validation (JSON5 format)
//! - User, organization and membership types
//! - The `IdentityStore` trait with sled and in-memory backends
//! - Domain event contracts
//! - Input validation and secret wrappers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod events;
pub mod secrets;
pub mod store;
pub mod types;
pub mod validation;

pub use config::{AuthConfig, Config, ConfigError};
pub use events::{DomainEvent, EventError, EventPublisher};
pub use secrets::{Password, SigningSecret};
pub use store::{IdentityStore, MemoryStore, SledStore, StoreError, open_store};
pub use types::{OrgId, OrgRole, Organization, Role, User, UserId, UserStatus, UserView};
pub use validation::ValidationError;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::events::{DomainEvent, EventPublisher, emit};
    pub use crate::store::IdentityStore;
    pub use crate::types::*;
}
