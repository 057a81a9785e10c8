//! User and organization storage.
//!
//! Two backends implement [`IdentityStore`]:
//! - [`SledStore`]: embedded database on disk
//! - [`MemoryStore`]: process memory, used in tests and as a fallback
//!
//! Lookups that find nothing return `Ok(None)`; only backend failures are errors.

mod memory;
mod persistent;

pub use memory::MemoryStore;
pub use persistent::SledStore;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{StoreBackend, StoreConfig};
use crate::types::{
    NewOrganization, NewUser, OrgId, OrgLink, Organization, OrganizationUpdate, Role, User,
    UserId, UserStatus,
};

/// Storage errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend failed.
    #[error("Storage error: {0}")]
    Backend(String),

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A unique field is already taken.
    #[error("Duplicate value for unique field '{field}'")]
    Duplicate {
        /// Name of the unique field.
        field: &'static str,
    },
}

/// Persistence operations needed by the identity services.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Persist a new user with status `pending` and role `viewer`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Duplicate` if the email or tax id is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    /// Look up a user by ID.
    async fn get_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Look up a user by exact email.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Look up a user by tax id.
    async fn get_user_by_tax_id(&self, tax_id: &str) -> Result<Option<User>, StoreError>;

    /// Set a user's status. Returns the updated user, or `None` if absent.
    async fn update_user_status(
        &self,
        id: UserId,
        status: UserStatus,
    ) -> Result<Option<User>, StoreError>;

    /// Set a user's platform role. Returns the updated user, or `None` if absent.
    async fn update_user_role(&self, id: UserId, role: Role) -> Result<Option<User>, StoreError>;

    /// All users, oldest first.
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Persist a new organization.
    async fn create_organization(&self, org: NewOrganization) -> Result<Organization, StoreError>;

    /// Apply a partial update. Returns the updated organization, or `None` if absent.
    async fn update_organization(
        &self,
        id: OrgId,
        update: OrganizationUpdate,
    ) -> Result<Option<Organization>, StoreError>;

    /// Look up an organization by ID.
    async fn get_organization_by_id(&self, id: OrgId) -> Result<Option<Organization>, StoreError>;

    /// Insert a membership. Returns `false` if the (org, user) pair already
    /// had one; the existing link is left untouched.
    async fn link_user_to_org(&self, link: OrgLink) -> Result<bool, StoreError>;

    /// Organizations the user is linked to, ordered by name.
    async fn get_organizations_for_user(&self, user: UserId)
    -> Result<Vec<Organization>, StoreError>;

    /// Memberships of an organization, oldest first.
    async fn get_linked_users(&self, org: OrgId) -> Result<Vec<OrgLink>, StoreError>;

    /// Whether the backend is reachable.
    async fn health_check(&self) -> bool;

    /// Short backend name for health reports and logs.
    fn backend_name(&self) -> &'static str;
}

/// Open the configured backend.
///
/// A persistent store that fails to open is replaced by an empty
/// [`MemoryStore`] when `fallback_to_memory` is set.
///
/// # Errors
///
/// Returns the open error when fallback is disabled.
pub fn open_store(
    config: &StoreConfig,
    data_dir: &Path,
) -> Result<Arc<dyn IdentityStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Sled => match SledStore::open(data_dir) {
            Ok(store) => {
                tracing::info!(path = %data_dir.display(), "Opened persistent store");
                Ok(Arc::new(store))
            }
            Err(e) if config.fallback_to_memory => {
                tracing::warn!(
                    error = %e,
                    path = %data_dir.display(),
                    "Persistent store unavailable, falling back to in-memory store"
                );
                Ok(Arc::new(MemoryStore::new()))
            }
            Err(e) => Err(e),
        },
    }
}
