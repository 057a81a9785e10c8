//! Registration, email confirmation, login and token refresh.

use std::sync::Arc;

use serde_json::json;

use identity_core::config::AuthConfig;
use identity_core::events::{DomainEvent, EventPublisher, emit};
use identity_core::store::{IdentityStore, StoreError};
use identity_core::types::{NewUser, OrgId, Role, User, UserId, UserStatus, UserView};

use super::codes::ConfirmationCodeStore;
use super::jwt::{TokenCodec, TokenPair};
use super::password::PasswordHasher;
use super::refresh::RefreshLedger;
use crate::audit::AuditLog;
use crate::error::IdentityError;
use crate::models::{ConfirmEmailRequest, LoginRequest, LoginResponse, RegisterRequest};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Orchestrates the account lifecycle.
pub struct AuthService {
    store: Arc<dyn IdentityStore>,
    hasher: PasswordHasher,
    codec: Arc<TokenCodec>,
    codes: ConfirmationCodeStore,
    ledger: Option<RefreshLedger>,
    events: Arc<dyn EventPublisher>,
    audit: Arc<AuditLog>,
}

impl AuthService {
    /// Create the service.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Internal` if the password cost settings are invalid.
    pub fn new(
        config: &AuthConfig,
        store: Arc<dyn IdentityStore>,
        codec: Arc<TokenCodec>,
        events: Arc<dyn EventPublisher>,
        audit: Arc<AuditLog>,
    ) -> Result<Self, IdentityError> {
        let ledger = config
            .refresh_rotation
            .then(|| RefreshLedger::new(config.refresh_token_ttl()));

        Ok(Self {
            store,
            hasher: PasswordHasher::new(&config.password)?,
            codec,
            codes: ConfirmationCodeStore::new(config.confirmation_code_ttl()),
            ledger,
            events,
            audit,
        })
    }

    /// Token codec used by this service.
    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Register a new pending account and send it a confirmation code.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Validation` for malformed input and
    /// `IdentityError::Conflict` if the email or tax id is already used
    /// (email is checked first).
    pub async fn register(&self, request: RegisterRequest) -> Result<UserView, IdentityError> {
        let request = request.normalized()?;

        if self.store.get_user_by_email(&request.email).await?.is_some() {
            return Err(email_conflict(&request.email));
        }
        if self.store.get_user_by_tax_id(&request.tax_id).await?.is_some() {
            return Err(tax_id_conflict(&request.tax_id));
        }

        let password_hash = self.hasher.hash(&request.password)?;
        let new_user = NewUser {
            full_name: request.full_name,
            tax_id: request.tax_id,
            email: request.email,
            phone: request.phone,
            password_hash,
        };

        // The lookups above race with concurrent signups; the store has the last word.
        let user = match self.store.create_user(new_user.clone()).await {
            Ok(user) => user,
            Err(StoreError::Duplicate { field: "email" }) => {
                return Err(email_conflict(&new_user.email));
            }
            Err(StoreError::Duplicate { .. }) => return Err(tax_id_conflict(&new_user.tax_id)),
            Err(e) => return Err(e.into()),
        };

        let code = self.codes.issue(&user.email).await;
        tracing::info!(user_id = %user.id, email = %user.email, code = %code, "Confirmation code issued");

        emit(self.events.as_ref(), DomainEvent::user_registered(&user)).await;
        self.audit
            .record(
                "user.register",
                "user",
                user.id,
                Some(user.id),
                json!({ "email": user.email }),
            )
            .await;

        Ok(user.view())
    }

    /// Confirm an email address with the code sent at registration.
    ///
    /// The code stays valid if the confirmation fails after it was accepted.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Authentication` if the code is wrong, expired
    /// or absent, if no user has this email, or if the account is blocked.
    pub async fn confirm_email(&self, request: ConfirmEmailRequest) -> Result<bool, IdentityError> {
        let request = request.normalized()?;
        let consumed = self.codes.consume(&request.email, &request.code).await?;

        match self.mark_verified(&request.email).await {
            Ok(user_id) => {
                tracing::info!(%user_id, "Email confirmed");
                Ok(true)
            }
            Err(e) => {
                self.codes.restore(consumed).await;
                tracing::debug!(error = %e, "Confirmation failed, code kept");
                Err(e)
            }
        }
    }

    async fn mark_verified(&self, email: &str) -> Result<UserId, IdentityError> {
        let user = self
            .store
            .get_user_by_email(email)
            .await?
            .ok_or_else(|| IdentityError::authentication("User not found"))?;

        if user.is_blocked() {
            return Err(IdentityError::authentication("Account is blocked"));
        }

        if user.status != UserStatus::Verified {
            self.store
                .update_user_status(user.id, UserStatus::Verified)
                .await?;
        }
        Ok(user.id)
    }

    /// Log in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Authentication` with the same message whether
    /// the email is unknown or the password is wrong, and "Account is
    /// blocked" for blocked accounts.
    pub async fn authenticate(&self, request: LoginRequest) -> Result<LoginResponse, IdentityError> {
        let request = request.normalized()?;

        let Some(user) = self.store.get_user_by_email(&request.email).await? else {
            tracing::debug!("Login for unknown email");
            return Err(IdentityError::authentication(INVALID_CREDENTIALS));
        };

        if !self.hasher.verify(&request.password, &user.password_hash) {
            tracing::debug!(user_id = %user.id, "Login with wrong password");
            return Err(IdentityError::authentication(INVALID_CREDENTIALS));
        }

        if user.is_blocked() {
            tracing::info!(user_id = %user.id, "Login refused for blocked account");
            return Err(IdentityError::authentication("Account is blocked"));
        }

        let tokens = self.issue_pair(&user, None).await?;
        self.audit
            .record("user.login", "user", user.id, Some(user.id), json!({}))
            .await;

        Ok(LoginResponse {
            tokens,
            user: user.view(),
        })
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// Role and memberships are read fresh from the store.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Authentication` if the token is invalid, is
    /// not a refresh token, was already used, or its user is gone or blocked.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, IdentityError> {
        let claims = self.codec.verify_refresh(refresh_token)?;

        if let Some(ledger) = &self.ledger {
            ledger.consume(&claims).await?;
        }

        let user_id: UserId = claims
            .sub
            .parse()
            .map_err(|_| IdentityError::authentication("Invalid token"))?;
        let user = self
            .store
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| IdentityError::authentication("User not found"))?;

        if user.is_blocked() {
            return Err(IdentityError::authentication("Account is blocked"));
        }

        tracing::debug!(user_id = %user.id, "Tokens refreshed");
        self.issue_pair(&user, claims.fid).await
    }

    async fn issue_pair(&self, user: &User, family: Option<String>) -> Result<TokenPair, IdentityError> {
        let org_ids: Vec<OrgId> = self
            .store
            .get_organizations_for_user(user.id)
            .await?
            .into_iter()
            .map(|org| org.id)
            .collect();

        let access = self
            .codec
            .issue_access(user.id, user.role, Some(&org_ids), None)?;
        let refresh = self.codec.issue_refresh(user.id, family)?;
        Ok(TokenPair::new(access, refresh))
    }

    /// Block an account. Existing access tokens stop resolving immediately.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::NotFound` if the user doesn't exist.
    pub async fn block_user(
        &self,
        id: UserId,
        actor: Option<UserId>,
    ) -> Result<UserView, IdentityError> {
        let user = self.set_status(id, UserStatus::Blocked).await?;
        self.audit
            .record("user.blocked", "user", id, actor, json!({ "blocked": true }))
            .await;
        Ok(user)
    }

    /// Unblock an account, leaving it verified.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::NotFound` if the user doesn't exist.
    pub async fn unblock_user(
        &self,
        id: UserId,
        actor: Option<UserId>,
    ) -> Result<UserView, IdentityError> {
        let user = self.set_status(id, UserStatus::Verified).await?;
        self.audit
            .record("user.blocked", "user", id, actor, json!({ "blocked": false }))
            .await;
        Ok(user)
    }

    async fn set_status(&self, id: UserId, status: UserStatus) -> Result<UserView, IdentityError> {
        let user = self
            .store
            .update_user_status(id, status)
            .await?
            .ok_or_else(|| IdentityError::not_found("User", id))?;
        tracing::info!(user_id = %id, %status, "User status changed");
        Ok(user.view())
    }

    /// Change a user's platform role. Takes effect at their next refresh.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::NotFound` if the user doesn't exist.
    pub async fn set_role(
        &self,
        id: UserId,
        role: Role,
        actor: Option<UserId>,
    ) -> Result<UserView, IdentityError> {
        let user = self
            .store
            .update_user_role(id, role)
            .await?
            .ok_or_else(|| IdentityError::not_found("User", id))?;
        tracing::info!(user_id = %id, %role, "User role changed");
        self.audit
            .record("user.role", "user", id, actor, json!({ "role": role }))
            .await;
        Ok(user.view())
    }

    #[cfg(test)]
    pub(crate) const fn codes(&self) -> &ConfirmationCodeStore {
        &self.codes
    }
}

fn email_conflict(email: &str) -> IdentityError {
    IdentityError::Conflict {
        message: format!("User with email '{email}' already exists"),
        field: "email",
    }
}

fn tax_id_conflict(tax_id: &str) -> IdentityError {
    IdentityError::Conflict {
        message: format!("User with INN '{tax_id}' already exists"),
        field: "inn",
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("store", &self.store.backend_name())
            .field("hasher", &self.hasher)
            .field("codec", &self.codec)
            .field("refresh_rotation", &self.ledger.is_some())
            .finish_non_exhaustive()
    }
}
