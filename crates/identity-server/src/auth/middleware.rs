//! Per-request user resolution for axum.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

use identity_core::store::IdentityStore;
use identity_core::types::{UserId, UserView};

use super::jwt::{TokenCodec, extract_bearer};
use super::rbac;
use crate::error::IdentityError;

/// Turns a bearer credential into the user it belongs to.
pub struct CurrentUserResolver {
    codec: Arc<TokenCodec>,
    store: Arc<dyn IdentityStore>,
}

impl CurrentUserResolver {
    /// Create a resolver.
    #[must_use]
    pub fn new(codec: Arc<TokenCodec>, store: Arc<dyn IdentityStore>) -> Self {
        Self { codec, store }
    }

    /// Resolve the `Authorization` header value to a user.
    ///
    /// The returned view carries the effective role: the token's role claim
    /// when present, else the stored role.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Authentication` for a missing or malformed
    /// header, an invalid token, or an unknown user, and
    /// `IdentityError::Authorization` for a blocked user.
    pub async fn resolve(&self, header: Option<&str>) -> Result<UserView, IdentityError> {
        let header = header
            .ok_or_else(|| IdentityError::authentication("Authorization header is required"))?;

        let token = extract_bearer(header).ok_or_else(|| {
            IdentityError::authentication("Authorization header must start with 'Bearer'")
        })?;

        let claims = self
            .codec
            .verify_access(token)
            .map_err(|_| IdentityError::authentication("Invalid token"))?;

        if claims.sub.is_empty() {
            return Err(IdentityError::authentication("Token payload missing subject"));
        }

        let Ok(user_id) = claims.sub.parse::<UserId>() else {
            tracing::debug!(sub = %claims.sub, "Token subject is not a user id");
            return Err(IdentityError::authentication("User not found"));
        };

        let user = self
            .store
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| IdentityError::authentication("User not found"))?;

        if user.is_blocked() {
            return Err(IdentityError::authorization("Account is blocked"));
        }

        let mut view = user.view();
        view.role = claims.effective_role(user.role);
        Ok(view)
    }
}

impl std::fmt::Debug for CurrentUserResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrentUserResolver")
            .field("codec", &self.codec)
            .field("store", &self.store.backend_name())
            .finish()
    }
}

/// Extractor for authenticated requests.
///
/// Use this in handler parameters to require a valid access token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserView);

impl CurrentUser {
    /// Get the user ID.
    #[must_use]
    pub const fn id(&self) -> UserId {
        self.0.id
    }

    /// Require a permission.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Authorization` if the user lacks it.
    pub fn require_permission(&self, permission: &str) -> Result<(), IdentityError> {
        rbac::require_permission(&self.0, permission)
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    Arc<CurrentUserResolver>: FromRef<S>,
{
    type Rejection = IdentityError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let resolver = Arc::<CurrentUserResolver>::from_ref(state);
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        resolver.resolve(header).await.map(CurrentUser)
    }
}
