//! Store backed by sled.
//!
//! Trees:
//! - `users`: user id -> JSON, plus `idx:email:` and `idx:tax_id:` index keys
//! - `orgs`: org id -> JSON
//! - `links`: `<org>:<user>` -> JSON membership
//! - `user_orgs`: `<user>:<org>` -> empty, reverse index of `links`

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;

use super::{IdentityStore, StoreError};
use crate::types::{
    NewOrganization, NewUser, OrgId, OrgLink, Organization, OrganizationUpdate, Role, User,
    UserId, UserStatus,
};

const EMAIL_INDEX: &str = "idx:email:";
const TAX_ID_INDEX: &str = "idx:tax_id:";

fn backend(context: &'static str) -> impl Fn(sled::Error) -> StoreError {
    move |e| StoreError::Backend(format!("{context}: {e}"))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Persistent store in an embedded sled database.
pub struct SledStore {
    db: sled::Db,
    users: sled::Tree,
    orgs: sled::Tree,
    links: sled::Tree,
    user_orgs: sled::Tree,
}

impl SledStore {
    /// Open or create the database under `path/identity`.
    ///
    /// # Errors
    ///
    /// Returns error if the database or one of its trees cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path.join("identity")).map_err(backend("Failed to open database"))?;
        Self::with_db(db)
    }

    /// Build a store on an already opened database.
    ///
    /// # Errors
    ///
    /// Returns error if a tree cannot be opened.
    pub fn with_db(db: sled::Db) -> Result<Self, StoreError> {
        let open = |name: &str| db.open_tree(name).map_err(backend("Failed to open tree"));
        Ok(Self {
            users: open("users")?,
            orgs: open("orgs")?,
            links: open("links")?,
            user_orgs: open("user_orgs")?,
            db,
        })
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().map_err(backend("Flush error"))?;
        Ok(())
    }

    fn user_by_index(&self, prefix: &str, value: &str) -> Result<Option<User>, StoreError> {
        let key = format!("{prefix}{value}");
        match self.users.get(key.as_bytes()).map_err(backend("Index lookup error"))? {
            Some(id) => self.user(&id),
            None => Ok(None),
        }
    }

    fn user(&self, id: &[u8]) -> Result<Option<User>, StoreError> {
        self.users
            .get(id)
            .map_err(backend("Get error"))?
            .map(|v| decode(&v))
            .transpose()
    }

    fn org(&self, id: OrgId) -> Result<Option<Organization>, StoreError> {
        self.orgs
            .get(id.to_string().as_bytes())
            .map_err(backend("Get error"))?
            .map(|v| decode(&v))
            .transpose()
    }

    /// Reserve a unique index key. Returns `false` if already taken.
    fn claim(&self, key: &str, id: &[u8]) -> Result<bool, StoreError> {
        let swapped = self
            .users
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(id))
            .map_err(backend("Index error"))?;
        Ok(swapped.is_ok())
    }

    fn put_user(&self, user: &User) -> Result<(), StoreError> {
        let value = serde_json::to_vec(user)?;
        self.users
            .insert(user.id.to_string().as_bytes(), value)
            .map_err(backend("Insert error"))?;
        self.flush()
    }

    fn modify_user(
        &self,
        id: UserId,
        f: impl FnOnce(&mut User),
    ) -> Result<Option<User>, StoreError> {
        let Some(mut user) = self.user(id.to_string().as_bytes())? else {
            return Ok(None);
        };
        f(&mut user);
        user.updated_at = Utc::now();
        self.put_user(&user)?;
        Ok(Some(user))
    }

    fn put_org(&self, org: &Organization) -> Result<(), StoreError> {
        let value = serde_json::to_vec(org)?;
        self.orgs
            .insert(org.id.to_string().as_bytes(), value)
            .map_err(backend("Insert error"))?;
        self.flush()
    }
}

#[async_trait]
impl IdentityStore for SledStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let user = user.into_user();
        let id = user.id.to_string();
        let email_key = format!("{EMAIL_INDEX}{}", user.email);
        let tax_key = format!("{TAX_ID_INDEX}{}", user.tax_id);

        if !self.claim(&email_key, id.as_bytes())? {
            return Err(StoreError::Duplicate { field: "email" });
        }
        if !self.claim(&tax_key, id.as_bytes())? {
            self.users
                .remove(email_key.as_bytes())
                .map_err(backend("Index remove error"))?;
            return Err(StoreError::Duplicate { field: "tax_id" });
        }

        self.put_user(&user)?;
        Ok(user)
    }

    async fn get_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.user(id.to_string().as_bytes())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.user_by_index(EMAIL_INDEX, email)
    }

    async fn get_user_by_tax_id(&self, tax_id: &str) -> Result<Option<User>, StoreError> {
        self.user_by_index(TAX_ID_INDEX, tax_id)
    }

    async fn update_user_status(
        &self,
        id: UserId,
        status: UserStatus,
    ) -> Result<Option<User>, StoreError> {
        self.modify_user(id, |u| u.status = status)
    }

    async fn update_user_role(&self, id: UserId, role: Role) -> Result<Option<User>, StoreError> {
        self.modify_user(id, |u| u.role = role)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users = Vec::new();
        for result in self.users.iter() {
            let (key, value) = result.map_err(backend("Iter error"))?;
            if key.starts_with(b"idx:") {
                continue;
            }
            users.push(decode::<User>(&value)?);
        }
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn create_organization(&self, org: NewOrganization) -> Result<Organization, StoreError> {
        let org = org.into_organization();
        self.put_org(&org)?;
        Ok(org)
    }

    async fn update_organization(
        &self,
        id: OrgId,
        update: OrganizationUpdate,
    ) -> Result<Option<Organization>, StoreError> {
        let Some(mut org) = self.org(id)? else {
            return Ok(None);
        };
        update.apply(&mut org);
        self.put_org(&org)?;
        Ok(Some(org))
    }

    async fn get_organization_by_id(&self, id: OrgId) -> Result<Option<Organization>, StoreError> {
        self.org(id)
    }

    async fn link_user_to_org(&self, link: OrgLink) -> Result<bool, StoreError> {
        let key = format!("{}:{}", link.org_id, link.user_id);
        let value = serde_json::to_vec(&link)?;
        let inserted = self
            .links
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(value))
            .map_err(backend("Link error"))?
            .is_ok();

        if inserted {
            let reverse = format!("{}:{}", link.user_id, link.org_id);
            self.user_orgs
                .insert(reverse.as_bytes(), Vec::<u8>::new())
                .map_err(backend("Link index error"))?;
            self.flush()?;
        }
        Ok(inserted)
    }

    async fn get_organizations_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<Organization>, StoreError> {
        let prefix = format!("{user}:");
        let mut orgs = Vec::new();
        for result in self.user_orgs.scan_prefix(prefix.as_bytes()) {
            let (key, _) = result.map_err(backend("Iter error"))?;
            let org_id = String::from_utf8_lossy(&key[prefix.len()..])
                .parse::<OrgId>()
                .map_err(|e| StoreError::Backend(format!("Corrupt link key: {e}")))?;
            if let Some(org) = self.org(org_id)? {
                orgs.push(org);
            }
        }
        orgs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(orgs)
    }

    async fn get_linked_users(&self, org: OrgId) -> Result<Vec<OrgLink>, StoreError> {
        let prefix = format!("{org}:");
        let mut links = Vec::new();
        for result in self.links.scan_prefix(prefix.as_bytes()) {
            let (_, value) = result.map_err(backend("Iter error"))?;
            links.push(decode::<OrgLink>(&value)?);
        }
        links.sort_by_key(|l| l.joined_at);
        Ok(links)
    }

    async fn health_check(&self) -> bool {
        self.db.size_on_disk().is_ok()
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{exercise_store, new_org, new_user};
    use crate::types::OrgRole;
    use tempfile::TempDir;

    fn create_store() -> (SledStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = SledStore::open(temp.path()).unwrap();
        (store, temp)
    }

    #[tokio::test]
    async fn test_sled_store_contract() {
        let (store, _temp) = create_store();
        exercise_store(&store).await;
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let (user_id, org_id) = {
            let store = SledStore::open(temp.path()).unwrap();
            let user = store
                .create_user(new_user("persist@example.com", "5001007322"))
                .await
                .unwrap();
            let org = store.create_organization(new_org("Persisted")).await.unwrap();
            store
                .link_user_to_org(OrgLink::new(org.id, user.id, OrgRole::Director))
                .await
                .unwrap();
            (user.id, org.id)
        };

        let store = SledStore::open(temp.path()).unwrap();
        let user = store
            .get_user_by_email("persist@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, user_id);

        let orgs = store.get_organizations_for_user(user_id).await.unwrap();
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0].id, org_id);
    }

    #[tokio::test]
    async fn test_list_skips_index_entries() {
        let (store, _temp) = create_store();
        store
            .create_user(new_user("one@example.com", "1111111111"))
            .await
            .unwrap();
        store
            .create_user(new_user("two@example.com", "2222222222"))
            .await
            .unwrap();

        let users = store.list_users().await.unwrap();
        assert_eq!(users.len(), 2);
    }
}
