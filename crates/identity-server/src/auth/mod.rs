//! Authentication and authorization.
//!
//! This module provides:
//! - Password hashing and verification (argon2id)
//! - Signing key management and JWT issue/verify
//! - Email confirmation codes and refresh token rotation
//! - Role and permission checks
//! - The current-user extractor for axum handlers

pub mod codes;
pub mod jwks;
pub mod jwt;
pub mod keys;
pub mod middleware;
pub mod password;
pub mod rbac;
pub mod refresh;
pub mod service;

pub use codes::{ConfirmationCodeStore, ConsumedCode};
pub use jwks::{Jwk, JwkSet};
pub use jwt::{Claims, IssuedToken, TokenCodec, TokenPair, TokenType};
pub use keys::{KeyMode, KeyProvider};
pub use middleware::{CurrentUser, CurrentUserResolver};
pub use password::PasswordHasher;
pub use refresh::RefreshLedger;
pub use service::AuthService;
