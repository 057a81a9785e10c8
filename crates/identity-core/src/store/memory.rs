//! In-memory store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{IdentityStore, StoreError};
use crate::types::{
    NewOrganization, NewUser, OrgId, OrgLink, Organization, OrganizationUpdate, Role, User,
    UserId, UserStatus,
};

#[derive(Default)]
struct State {
    users: HashMap<UserId, User>,
    by_email: HashMap<String, UserId>,
    by_tax_id: HashMap<String, UserId>,
    orgs: HashMap<OrgId, Organization>,
    links: HashMap<(OrgId, UserId), OrgLink>,
}

impl State {
    fn modify_user(&mut self, id: UserId, f: impl FnOnce(&mut User)) -> Option<User> {
        let user = self.users.get_mut(&id)?;
        f(user);
        user.updated_at = Utc::now();
        Some(user.clone())
    }
}

/// Store that keeps everything in process memory.
///
/// Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut state = self.state.write().await;
        if state.by_email.contains_key(&user.email) {
            return Err(StoreError::Duplicate { field: "email" });
        }
        if state.by_tax_id.contains_key(&user.tax_id) {
            return Err(StoreError::Duplicate { field: "tax_id" });
        }

        let user = user.into_user();
        state.by_email.insert(user.email.clone(), user.id);
        state.by_tax_id.insert(user.tax_id.clone(), user.id);
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .by_email
            .get(email)
            .and_then(|id| state.users.get(id))
            .cloned())
    }

    async fn get_user_by_tax_id(&self, tax_id: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .by_tax_id
            .get(tax_id)
            .and_then(|id| state.users.get(id))
            .cloned())
    }

    async fn update_user_status(
        &self,
        id: UserId,
        status: UserStatus,
    ) -> Result<Option<User>, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.modify_user(id, |u| u.status = status))
    }

    async fn update_user_role(&self, id: UserId, role: Role) -> Result<Option<User>, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.modify_user(id, |u| u.role = role))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.state.read().await.users.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn create_organization(&self, org: NewOrganization) -> Result<Organization, StoreError> {
        let org = org.into_organization();
        self.state.write().await.orgs.insert(org.id, org.clone());
        Ok(org)
    }

    async fn update_organization(
        &self,
        id: OrgId,
        update: OrganizationUpdate,
    ) -> Result<Option<Organization>, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.orgs.get_mut(&id).map(|org| {
            update.apply(org);
            org.clone()
        }))
    }

    async fn get_organization_by_id(&self, id: OrgId) -> Result<Option<Organization>, StoreError> {
        Ok(self.state.read().await.orgs.get(&id).cloned())
    }

    async fn link_user_to_org(&self, link: OrgLink) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let key = (link.org_id, link.user_id);
        if state.links.contains_key(&key) {
            return Ok(false);
        }
        state.links.insert(key, link);
        Ok(true)
    }

    async fn get_organizations_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<Organization>, StoreError> {
        let state = self.state.read().await;
        let mut orgs: Vec<Organization> = state
            .links
            .keys()
            .filter(|(_, u)| *u == user)
            .filter_map(|(org, _)| state.orgs.get(org).cloned())
            .collect();
        orgs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(orgs)
    }

    async fn get_linked_users(&self, org: OrgId) -> Result<Vec<OrgLink>, StoreError> {
        let state = self.state.read().await;
        let mut links: Vec<OrgLink> = state
            .links
            .values()
            .filter(|l| l.org_id == org)
            .cloned()
            .collect();
        links.sort_by_key(|l| l.joined_at);
        Ok(links)
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
