//! Request and response bodies of the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use identity_core::secrets::Password;
use identity_core::types::{
    LinkStatus, NewOrganization, OrgLink, OrgRole, Organization, OrganizationUpdate, Role,
    UserId, UserView,
};
use identity_core::validation::{
    limits, normalize_text, validate_confirmation_code, validate_password, validate_phone,
    validate_registration_number, validate_tax_id,
};

use crate::auth::jwt::TokenPair;
use crate::error::IdentityError;

#[allow(clippy::cast_possible_truncation)]
const MAX_FULL_NAME: usize = limits::MAX_FULL_NAME as usize;
#[allow(clippy::cast_possible_truncation)]
const MAX_ORG_NAME: usize = limits::MAX_ORG_NAME as usize;

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

fn trim_option(value: &mut Option<String>) {
    if let Some(inner) = value {
        trim_in_place(inner);
    }
}

/// `POST /signup/start`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Full legal name.
    #[validate(length(min = 2, max = 255, message = "Full name must be 2-255 characters"))]
    pub full_name: String,
    /// Tax id.
    #[serde(rename = "inn")]
    #[validate(custom(function = "validate_tax_id"))]
    pub tax_id: String,
    /// Email address.
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    /// Mobile phone.
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
    /// Plaintext password.
    #[validate(custom(function = "validate_password"))]
    pub password: Password,
}

impl RegisterRequest {
    /// Trim every field and normalize the name, then validate.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Validation` listing the offending fields.
    pub fn normalized(mut self) -> Result<Self, IdentityError> {
        self.full_name = normalize_text(&self.full_name, MAX_FULL_NAME)
            .map_err(|e| IdentityError::invalid_field("full_name", e.to_string()))?;
        trim_in_place(&mut self.tax_id);
        trim_in_place(&mut self.email);
        trim_in_place(&mut self.phone);
        self.validate()?;
        Ok(self)
    }
}

/// `POST /signup/confirm-email`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConfirmEmailRequest {
    /// Email the code was sent to.
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    /// Six digit code.
    #[validate(custom(function = "validate_confirmation_code"))]
    pub code: String,
}

impl ConfirmEmailRequest {
    /// Trim and validate.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Validation` listing the offending fields.
    pub fn normalized(mut self) -> Result<Self, IdentityError> {
        trim_in_place(&mut self.email);
        trim_in_place(&mut self.code);
        self.validate()?;
        Ok(self)
    }
}

/// `{ "confirmed": true }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmEmailResponse {
    /// Always true on success.
    pub confirmed: bool,
}

/// `POST /login`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    /// Email address.
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    /// Plaintext password.
    pub password: Password,
}

impl LoginRequest {
    /// Trim the email and validate.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Validation` listing the offending fields.
    pub fn normalized(mut self) -> Result<Self, IdentityError> {
        trim_in_place(&mut self.email);
        self.validate()?;
        Ok(self)
    }
}

/// Tokens plus the user they were issued to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Token pair.
    #[serde(flatten)]
    pub tokens: TokenPair,
    /// Logged-in user.
    pub user: UserView,
}

/// `POST /token/refresh`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RefreshRequest {
    /// Refresh token.
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// `POST /orgs`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    /// Display name.
    #[validate(length(min = 1, max = 512, message = "Name must be 1-512 characters"))]
    pub name: String,
    /// Tax id.
    #[serde(rename = "inn")]
    #[validate(custom(function = "validate_tax_id"))]
    pub tax_id: String,
    /// Registration number.
    #[serde(rename = "ogrn", default)]
    #[validate(custom(function = "validate_registration_number"))]
    pub registration_number: Option<String>,
    /// Contact email.
    #[serde(default)]
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    /// Contact phone.
    #[serde(default)]
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
}

impl CreateOrganizationRequest {
    /// Trim every field and normalize the name, then validate.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Validation` listing the offending fields.
    pub fn normalized(mut self) -> Result<Self, IdentityError> {
        self.name = normalize_text(&self.name, MAX_ORG_NAME)
            .map_err(|e| IdentityError::invalid_field("name", e.to_string()))?;
        trim_in_place(&mut self.tax_id);
        trim_option(&mut self.registration_number);
        trim_option(&mut self.email);
        trim_option(&mut self.phone);
        self.validate()?;
        Ok(self)
    }

    /// Convert into a store record.
    #[must_use]
    pub fn into_new(self) -> NewOrganization {
        NewOrganization {
            name: self.name,
            tax_id: self.tax_id,
            registration_number: self.registration_number,
            email: self.email,
            phone: self.phone,
        }
    }
}

/// `PATCH /orgs/{org_id}`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateOrganizationRequest {
    /// New display name.
    #[serde(default)]
    #[validate(length(min = 1, max = 512, message = "Name must be 1-512 characters"))]
    pub name: Option<String>,
    /// New contact email.
    #[serde(default)]
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    /// New contact phone.
    #[serde(default)]
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
}

impl UpdateOrganizationRequest {
    /// Normalize present fields, validate, and convert.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Validation` listing the offending fields.
    pub fn into_update(mut self) -> Result<OrganizationUpdate, IdentityError> {
        if let Some(name) = &self.name {
            self.name = Some(
                normalize_text(name, MAX_ORG_NAME)
                    .map_err(|e| IdentityError::invalid_field("name", e.to_string()))?,
            );
        }
        trim_option(&mut self.email);
        trim_option(&mut self.phone);
        self.validate()?;
        Ok(OrganizationUpdate {
            name: self.name,
            email: self.email,
            phone: self.phone,
        })
    }
}

/// `POST /orgs/{org_id}/users`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InviteUserRequest {
    /// Tax id of the user to add.
    #[serde(rename = "inn")]
    #[validate(custom(function = "validate_tax_id"))]
    pub tax_id: String,
    /// Role inside the organization.
    #[serde(default)]
    pub role: OrgRole,
}

/// `PUT /admin/users/{id}/role`.
#[derive(Debug, Clone, Deserialize)]
pub struct SetRoleRequest {
    /// New platform role.
    pub role: Role,
}

/// `{ "detail": "..." }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailResponse {
    /// Human-readable outcome.
    pub detail: String,
}

/// A membership as shown in organization responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedUser {
    /// Member.
    pub user_id: UserId,
    /// Role inside the organization.
    pub role: OrgRole,
    /// Approval state.
    pub status: LinkStatus,
    /// When the link was created.
    pub joined_at: DateTime<Utc>,
}

impl From<OrgLink> for LinkedUser {
    fn from(link: OrgLink) -> Self {
        Self {
            user_id: link.user_id,
            role: link.role,
            status: link.status,
            joined_at: link.joined_at,
        }
    }
}

/// An organization with its members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationView {
    /// The organization.
    #[serde(flatten)]
    pub organization: Organization,
    /// Members.
    pub linked_users: Vec<LinkedUser>,
}
