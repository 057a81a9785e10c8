//! Domain events emitted by the identity service.
//!
//! Publishing is best-effort: [`emit`] logs failures and never propagates
//! them, so a missing event bus can't fail a registration or an org creation.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::types::{OrgId, Organization, User, UserId};

/// Event publishing errors.
#[derive(Error, Debug)]
pub enum EventError {
    /// No transport is available.
    #[error("Event bus unavailable: {0}")]
    Unavailable(String),

    /// The transport rejected the event.
    #[error("Publish failed: {0}")]
    Publish(String),
}

/// Something that happened to a user or an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum DomainEvent {
    /// A user completed the first signup step.
    #[serde(rename = "user.registered")]
    UserRegistered {
        /// New user.
        user_id: UserId,
        /// Their email.
        email: String,
        /// Their tax id.
        inn: String,
    },

    /// An organization was created.
    #[serde(rename = "org.created")]
    OrgCreated {
        /// New organization.
        org_id: OrgId,
        /// Its tax id.
        inn: String,
        /// Its name.
        name: String,
    },

    /// An organization's details changed.
    #[serde(rename = "org.updated")]
    OrgUpdated {
        /// Updated organization.
        org_id: OrgId,
        /// Its tax id.
        inn: String,
        /// Its current name.
        name: String,
    },
}

impl DomainEvent {
    /// `user.registered` for a freshly stored user.
    #[must_use]
    pub fn user_registered(user: &User) -> Self {
        Self::UserRegistered {
            user_id: user.id,
            email: user.email.clone(),
            inn: user.tax_id.clone(),
        }
    }

    /// `org.created` for a freshly stored organization.
    #[must_use]
    pub fn org_created(org: &Organization) -> Self {
        Self::OrgCreated {
            org_id: org.id,
            inn: org.tax_id.clone(),
            name: org.name.clone(),
        }
    }

    /// `org.updated` for an organization after modification.
    #[must_use]
    pub fn org_updated(org: &Organization) -> Self {
        Self::OrgUpdated {
            org_id: org.id,
            inn: org.tax_id.clone(),
            name: org.name.clone(),
        }
    }

    /// Short event name, e.g. `org.created`.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::UserRegistered { .. } => "user.registered",
            Self::OrgCreated { .. } => "org.created",
            Self::OrgUpdated { .. } => "org.updated",
        }
    }

    /// Bus subject, e.g. `identity.org.created`.
    #[must_use]
    pub fn subject(&self) -> String {
        format!("identity.{}", self.name())
    }

    /// JSON payload including the `event` discriminator.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({ "event": self.name() }))
    }
}

/// Transport for domain events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a payload under a subject.
    ///
    /// # Errors
    ///
    /// Returns `EventError` if the transport is unavailable or rejects the event.
    async fn publish(&self, subject: &str, payload: serde_json::Value) -> Result<(), EventError>;
}

/// Publish an event, logging and discarding any failure.
pub async fn emit(publisher: &dyn EventPublisher, event: DomainEvent) {
    let subject = event.subject();
    match publisher.publish(&subject, event.payload()).await {
        Ok(()) => tracing::debug!(subject = %subject, "Event published"),
        Err(e) => tracing::warn!(subject = %subject, error = %e, "Failed to publish event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewOrganization;
    use pretty_assertions::assert_eq;

    struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(&self, _: &str, _: serde_json::Value) -> Result<(), EventError> {
            Err(EventError::Unavailable("offline".to_string()))
        }
    }

    fn org() -> Organization {
        NewOrganization {
            name: "Acme".to_string(),
            tax_id: "7707083893".to_string(),
            registration_number: None,
            email: None,
            phone: None,
        }
        .into_organization()
    }

    #[test]
    fn test_subjects() {
        let org = org();
        assert_eq!(DomainEvent::org_created(&org).subject(), "identity.org.created");
        assert_eq!(DomainEvent::org_updated(&org).subject(), "identity.org.updated");
    }

    #[test]
    fn test_payload_shape() {
        let org = org();
        let payload = DomainEvent::org_created(&org).payload();
        assert_eq!(
            payload,
            json!({
                "event": "org.created",
                "org_id": org.id.to_string(),
                "inn": "7707083893",
                "name": "Acme",
            })
        );
    }

    #[tokio::test]
    async fn test_emit_swallows_failures() {
        emit(&FailingPublisher, DomainEvent::org_created(&org())).await;
    }
}
