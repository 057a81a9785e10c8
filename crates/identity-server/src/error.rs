//! Service error type and its HTTP mapping.

use std::collections::BTreeMap;
use std::fmt::Display;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::{Value, json};
use thiserror::Error;

use identity_core::store::StoreError;
use identity_core::validation::{ValidationError, field_messages};

/// Errors surfaced by the identity services.
///
/// Every variant maps to one stable error code and one HTTP status.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Credentials or token rejected.
    #[error("{0}")]
    Authentication(String),

    /// Authenticated but not allowed.
    #[error("{0}")]
    Authorization(String),

    /// A referenced entity does not exist or is not visible to the caller.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind, e.g. `Organization`.
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// A unique field is already taken.
    #[error("{message}")]
    Conflict {
        /// Human-readable message.
        message: String,
        /// The conflicting field.
        field: &'static str,
    },

    /// Request input is malformed.
    #[error("{message}")]
    Validation {
        /// Summary message.
        message: String,
        /// Messages per field.
        fields: BTreeMap<String, Vec<String>>,
    },

    /// Client exceeded its request quota.
    #[error("Too many requests")]
    RateLimited,

    /// Backend storage failed.
    #[error(transparent)]
    Storage(#[from] StoreError),

    /// Unexpected internal failure.
    #[error("{0}")]
    Internal(String),
}

impl IdentityError {
    /// Authentication failure with a message.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// Authorization failure with a message.
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization(message.into())
    }

    /// Missing entity.
    pub fn not_found(entity: &'static str, id: impl Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Validation failure on a single field.
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Validation {
            fields: BTreeMap::from([(field.to_string(), vec![message.clone()])]),
            message,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "IDENTITY_AUTH_ERROR",
            Self::Authorization(_) => "IDENTITY_AUTHZ_ERROR",
            Self::NotFound { .. } => "IDENTITY_NOT_FOUND",
            Self::Conflict { .. } => "IDENTITY_CONFLICT",
            Self::Validation { .. } => "IDENTITY_VALIDATION_ERROR",
            Self::RateLimited => "IDENTITY_RATE_LIMITED",
            Self::Storage(_) => "IDENTITY_STORE_ERROR",
            Self::Internal(_) => "IDENTITY_INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Structured details for the response body.
    #[must_use]
    pub fn details(&self) -> Value {
        match self {
            Self::NotFound { entity, id } => json!({ "entity": entity, "id": id }),
            Self::Conflict { field, .. } => json!({ "field": field }),
            Self::Validation { fields, .. } => json!({ "fields": fields }),
            _ => json!({}),
        }
    }

    /// Message safe to show clients. Internal failures are not described.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Storage(_) | Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for IdentityError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation {
            message: "Request validation failed".to_string(),
            fields: field_messages(&errors),
        }
    }
}

impl From<ValidationError> for IdentityError {
    fn from(error: ValidationError) -> Self {
        Self::Validation {
            message: error.to_string(),
            fields: BTreeMap::new(),
        }
    }
}

impl From<JsonRejection> for IdentityError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation {
            message: rejection.body_text(),
            fields: BTreeMap::new(),
        }
    }
}

impl IntoResponse for IdentityError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }

        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.public_message(),
                "details": self.details(),
                "timestamp": Utc::now().to_rfc3339(),
            }
        });

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            IdentityError::authentication("x").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(IdentityError::authorization("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(
            IdentityError::not_found("User", "42").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            IdentityError::invalid_field("role", "bad").status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            IdentityError::Internal("boom".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_message_and_details() {
        let err = IdentityError::not_found("Organization", "abc");
        assert_eq!(err.to_string(), "Organization not found: abc");
        assert_eq!(err.code(), "IDENTITY_NOT_FOUND");
        assert_eq!(err.details(), json!({"entity": "Organization", "id": "abc"}));
    }

    #[test]
    fn test_internal_errors_are_not_described() {
        let err = IdentityError::Storage(StoreError::Backend("disk on fire".to_string()));
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[tokio::test]
    async fn test_response_body() {
        let response = IdentityError::Conflict {
            message: "User with email 'a@b.c' already exists".to_string(),
            field: "email",
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "IDENTITY_CONFLICT");
        assert_eq!(body["error"]["details"]["field"], "email");
        assert!(body["error"]["timestamp"].is_string());
    }

    #[test]
    fn test_unauthorized_carries_challenge() {
        let response = IdentityError::authentication("nope").into_response();
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");
    }
}
