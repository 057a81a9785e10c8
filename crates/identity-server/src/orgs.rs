//! Organizations and memberships.
//!
//! Any authenticated user may create an organization and becomes its
//! director. Only that organization's director may change it or add
//! members. Users who aren't members get `NotFound` rather than a
//! permission error, so organization ids can't be enumerated.

use std::sync::Arc;

use serde_json::json;

use identity_core::events::{DomainEvent, EventPublisher, emit};
use identity_core::store::IdentityStore;
use identity_core::types::{OrgId, OrgLink, OrgRole, Organization, UserId};

use crate::audit::AuditLog;
use crate::error::IdentityError;
use crate::models::{
    CreateOrganizationRequest, InviteUserRequest, LinkedUser, OrganizationView,
    UpdateOrganizationRequest,
};
use crate::registry::RegistryLookup;

/// Organization use cases.
pub struct OrganizationService {
    store: Arc<dyn IdentityStore>,
    registry: Arc<dyn RegistryLookup>,
    events: Arc<dyn EventPublisher>,
    audit: Arc<AuditLog>,
}

impl OrganizationService {
    /// Create the service.
    #[must_use]
    pub fn new(
        store: Arc<dyn IdentityStore>,
        registry: Arc<dyn RegistryLookup>,
        events: Arc<dyn EventPublisher>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            store,
            registry,
            events,
            audit,
        }
    }

    /// Create an organization with `user_id` as its director.
    ///
    /// Name and registration number are replaced by registry data when the
    /// registry knows the tax id.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Validation` for malformed input or a storage error.
    pub async fn create_organization(
        &self,
        request: CreateOrganizationRequest,
        user_id: UserId,
    ) -> Result<OrganizationView, IdentityError> {
        let mut new_org = request.normalized()?.into_new();

        if let Some(record) = self.registry.lookup_by_tax_id(&new_org.tax_id).await {
            if let Some(name) = record.name {
                new_org.name = name;
            }
            if let Some(number) = record.registration_number {
                new_org.registration_number = Some(number);
            }
            tracing::info!(inn = %new_org.tax_id, "Enriched organization from registry");
        }

        let org = self.store.create_organization(new_org).await?;
        // Not atomic with the insert above.
        self.store
            .link_user_to_org(OrgLink::new(org.id, user_id, OrgRole::Director))
            .await?;

        emit(self.events.as_ref(), DomainEvent::org_created(&org)).await;
        self.audit
            .record(
                "org.create",
                "organization",
                org.id,
                Some(user_id),
                json!({ "inn": org.tax_id, "name": org.name }),
            )
            .await;

        self.view(org).await
    }

    /// Organizations the user belongs to, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn get_user_organizations(
        &self,
        user_id: UserId,
    ) -> Result<Vec<OrganizationView>, IdentityError> {
        let orgs = self.store.get_organizations_for_user(user_id).await?;
        let mut views = Vec::with_capacity(orgs.len());
        for org in orgs {
            views.push(self.view(org).await?);
        }
        Ok(views)
    }

    /// One organization, if the user belongs to it.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::NotFound` if the organization doesn't exist
    /// or the user isn't a member.
    pub async fn get_organization(
        &self,
        org_id: OrgId,
        user_id: UserId,
    ) -> Result<OrganizationView, IdentityError> {
        let org = self.find(org_id).await?;
        let links = self.store.get_linked_users(org_id).await?;
        if !links.iter().any(|link| link.user_id == user_id) {
            return Err(IdentityError::not_found("Organization", org_id));
        }
        Ok(with_links(org, links))
    }

    /// Add a user, found by tax id, to the organization.
    ///
    /// Returns `false` when the user was already a member; the existing
    /// membership is kept as is.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::NotFound` for an unknown organization or user,
    /// and `IdentityError::Authorization` if the inviter isn't the director.
    pub async fn invite_user(
        &self,
        org_id: OrgId,
        inviter_id: UserId,
        request: InviteUserRequest,
    ) -> Result<bool, IdentityError> {
        let mut request = request;
        request.tax_id = request.tax_id.trim().to_string();
        validator::Validate::validate(&request)?;

        self.find(org_id).await?;
        self.require_director(
            org_id,
            inviter_id,
            "Only a director can invite users to an organization",
        )
        .await?;

        let target = self
            .store
            .get_user_by_tax_id(&request.tax_id)
            .await?
            .ok_or_else(|| IdentityError::not_found("User", format!("INN={}", request.tax_id)))?;

        let created = self
            .store
            .link_user_to_org(OrgLink::new(org_id, target.id, request.role))
            .await?;

        tracing::info!(
            org_id = %org_id,
            inviter = %inviter_id,
            user_id = %target.id,
            role = %request.role,
            created,
            "User invited to organization"
        );
        self.audit
            .record(
                "org.link_user",
                "organization",
                org_id,
                Some(inviter_id),
                json!({ "user_id": target.id, "role": request.role, "created": created }),
            )
            .await;

        Ok(created)
    }

    /// Change name or contacts. Director only.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::NotFound` for an unknown organization,
    /// `IdentityError::Authorization` if the user isn't the director, and
    /// `IdentityError::Validation` for malformed input.
    pub async fn update_organization(
        &self,
        org_id: OrgId,
        user_id: UserId,
        request: UpdateOrganizationRequest,
    ) -> Result<OrganizationView, IdentityError> {
        let update = request.into_update()?;

        self.find(org_id).await?;
        self.require_director(org_id, user_id, "Only a director can update an organization")
            .await?;

        let org = self
            .store
            .update_organization(org_id, update)
            .await?
            .ok_or_else(|| IdentityError::not_found("Organization", org_id))?;

        emit(self.events.as_ref(), DomainEvent::org_updated(&org)).await;
        self.audit
            .record(
                "org.update",
                "organization",
                org.id,
                Some(user_id),
                json!({ "name": org.name }),
            )
            .await;

        self.view(org).await
    }

    /// Memberships of an organization.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn get_linked_users(&self, org_id: OrgId) -> Result<Vec<LinkedUser>, IdentityError> {
        Ok(self
            .store
            .get_linked_users(org_id)
            .await?
            .into_iter()
            .map(LinkedUser::from)
            .collect())
    }

    async fn find(&self, org_id: OrgId) -> Result<Organization, IdentityError> {
        self.store
            .get_organization_by_id(org_id)
            .await?
            .ok_or_else(|| IdentityError::not_found("Organization", org_id))
    }

    async fn require_director(
        &self,
        org_id: OrgId,
        user_id: UserId,
        message: &str,
    ) -> Result<(), IdentityError> {
        let links = self.store.get_linked_users(org_id).await?;
        let is_director = links
            .iter()
            .any(|link| link.user_id == user_id && link.role == OrgRole::Director);
        if is_director {
            Ok(())
        } else {
            tracing::info!(org_id = %org_id, user_id = %user_id, "Director check denied");
            Err(IdentityError::authorization(message))
        }
    }

    async fn view(&self, org: Organization) -> Result<OrganizationView, IdentityError> {
        let links = self.store.get_linked_users(org.id).await?;
        Ok(with_links(org, links))
    }
}

fn with_links(organization: Organization, links: Vec<OrgLink>) -> OrganizationView {
    OrganizationView {
        organization,
        linked_users: links.into_iter().map(LinkedUser::from).collect(),
    }
}

impl std::fmt::Debug for OrganizationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrganizationService")
            .field("store", &self.store.backend_name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BroadcastPublisher;
    use crate::registry::{DisabledRegistry, RegistryRecord};
    use async_trait::async_trait;
    use identity_core::store::MemoryStore;
    use identity_core::types::{LinkStatus, NewUser, User};

    struct FixedRegistry;

    #[async_trait]
    impl RegistryLookup for FixedRegistry {
        async fn lookup_by_tax_id(&self, tax_id: &str) -> Option<RegistryRecord> {
            (tax_id == "7707083893").then(|| RegistryRecord {
                name: Some("PAO Sberbank".to_string()),
                registration_number: Some("1027700132195".to_string()),
            })
        }
    }

    struct Fixture {
        service: OrganizationService,
        store: Arc<dyn IdentityStore>,
        events: BroadcastPublisher,
        audit: Arc<AuditLog>,
    }

    fn fixture_with(registry: Arc<dyn RegistryLookup>) -> Fixture {
        let store: Arc<dyn IdentityStore> = Arc::new(MemoryStore::new());
        let events = BroadcastPublisher::new();
        let audit = Arc::new(AuditLog::default());
        let service = OrganizationService::new(
            Arc::clone(&store),
            registry,
            Arc::new(events.clone()),
            Arc::clone(&audit),
        );
        Fixture {
            service,
            store,
            events,
            audit,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(DisabledRegistry))
    }

    async fn user(store: &dyn IdentityStore, email: &str, tax_id: &str) -> User {
        store
            .create_user(NewUser {
                full_name: "Test User".to_string(),
                tax_id: tax_id.to_string(),
                email: email.to_string(),
                phone: "+79990000000".to_string(),
                password_hash: String::new(),
            })
            .await
            .unwrap()
    }

    fn create_request(name: &str, tax_id: &str) -> CreateOrganizationRequest {
        CreateOrganizationRequest {
            name: name.to_string(),
            tax_id: tax_id.to_string(),
            registration_number: None,
            email: None,
            phone: None,
        }
    }

    fn invite(tax_id: &str) -> InviteUserRequest {
        InviteUserRequest {
            tax_id: tax_id.to_string(),
            role: OrgRole::Accountant,
        }
    }

    #[tokio::test]
    async fn test_create_links_director() {
        let f = fixture();
        let mut rx = f.events.subscribe();
        let owner = user(f.store.as_ref(), "owner@example.com", "500100732259").await;

        let view = f
            .service
            .create_organization(create_request("Horns & Hooves", "1234567890"), owner.id)
            .await
            .unwrap();

        assert_eq!(view.organization.name, "Horns & Hooves");
        assert_eq!(view.linked_users.len(), 1);
        assert_eq!(view.linked_users[0].user_id, owner.id);
        assert_eq!(view.linked_users[0].role, OrgRole::Director);
        assert_eq!(view.linked_users[0].status, LinkStatus::Pending);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.subject, "identity.org.created");
        assert_eq!(f.audit.recent(1).await[0].action, "org.create");
    }

    #[tokio::test]
    async fn test_registry_enrichment() {
        let f = fixture_with(Arc::new(FixedRegistry));
        let owner = user(f.store.as_ref(), "owner@example.com", "500100732259").await;

        let view = f
            .service
            .create_organization(create_request("Sber", "7707083893"), owner.id)
            .await
            .unwrap();
        assert_eq!(view.organization.name, "PAO Sberbank");
        assert_eq!(
            view.organization.registration_number.as_deref(),
            Some("1027700132195")
        );
    }

    #[tokio::test]
    async fn test_invite_flow() {
        let f = fixture();
        let owner = user(f.store.as_ref(), "owner@example.com", "500100732259").await;
        let accountant = user(f.store.as_ref(), "acc@example.com", "500100732260").await;
        let org = f
            .service
            .create_organization(create_request("Acme", "1234567890"), owner.id)
            .await
            .unwrap()
            .organization;

        assert!(
            f.service
                .invite_user(org.id, owner.id, invite("500100732260"))
                .await
                .unwrap()
        );
        // Second invite is a no-op.
        assert!(
            !f.service
                .invite_user(org.id, owner.id, invite("500100732260"))
                .await
                .unwrap()
        );

        let linked = f.service.get_linked_users(org.id).await.unwrap();
        assert_eq!(linked.len(), 2);

        let seen = f
            .service
            .get_organization(org.id, accountant.id)
            .await
            .unwrap();
        assert_eq!(seen.organization.id, org.id);

        let mine = f.service.get_user_organizations(accountant.id).await.unwrap();
        assert_eq!(mine.len(), 1);
    }

    #[tokio::test]
    async fn test_non_director_cannot_invite() {
        let f = fixture();
        let owner = user(f.store.as_ref(), "owner@example.com", "500100732259").await;
        let accountant = user(f.store.as_ref(), "acc@example.com", "500100732260").await;
        user(f.store.as_ref(), "third@example.com", "500100732261").await;
        let org = f
            .service
            .create_organization(create_request("Acme", "1234567890"), owner.id)
            .await
            .unwrap()
            .organization;
        f.service
            .invite_user(org.id, owner.id, invite("500100732260"))
            .await
            .unwrap();

        let err = f
            .service
            .invite_user(org.id, accountant.id, invite("500100732261"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Authorization(_)));
        assert_eq!(
            err.to_string(),
            "Only a director can invite users to an organization"
        );
    }

    #[tokio::test]
    async fn test_invite_unknown_targets() {
        let f = fixture();
        let owner = user(f.store.as_ref(), "owner@example.com", "500100732259").await;
        let org = f
            .service
            .create_organization(create_request("Acme", "1234567890"), owner.id)
            .await
            .unwrap()
            .organization;

        let err = f
            .service
            .invite_user(org.id, owner.id, invite("999999999999"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "User not found: INN=999999999999");

        let err = f
            .service
            .invite_user(OrgId::new(), owner.id, invite("500100732259"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::NotFound { entity: "Organization", .. }));
    }

    #[tokio::test]
    async fn test_non_member_sees_not_found() {
        let f = fixture();
        let owner = user(f.store.as_ref(), "owner@example.com", "500100732259").await;
        let stranger = user(f.store.as_ref(), "x@example.com", "500100732260").await;
        let org = f
            .service
            .create_organization(create_request("Acme", "1234567890"), owner.id)
            .await
            .unwrap()
            .organization;

        assert!(matches!(
            f.service.get_organization(org.id, stranger.id).await,
            Err(IdentityError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_by_director_only() {
        let f = fixture();
        let mut rx = f.events.subscribe();
        let owner = user(f.store.as_ref(), "owner@example.com", "500100732259").await;
        let stranger = user(f.store.as_ref(), "x@example.com", "500100732260").await;
        let org = f
            .service
            .create_organization(create_request("Acme", "1234567890"), owner.id)
            .await
            .unwrap()
            .organization;
        rx.recv().await.unwrap();

        let patch = UpdateOrganizationRequest {
            name: Some("Acme Holdings".to_string()),
            email: Some("info@acme.example".to_string()),
            phone: None,
        };

        assert!(matches!(
            f.service
                .update_organization(org.id, stranger.id, patch.clone())
                .await,
            Err(IdentityError::Authorization(_))
        ));

        let updated = f
            .service
            .update_organization(org.id, owner.id, patch)
            .await
            .unwrap();
        assert_eq!(updated.organization.name, "Acme Holdings");
        assert_eq!(updated.organization.email.as_deref(), Some("info@acme.example"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.subject, "identity.org.updated");
        assert_eq!(event.payload["name"], "Acme Holdings");
    }
}
