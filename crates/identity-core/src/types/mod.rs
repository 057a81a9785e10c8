//! Domain types shared by the store, the services and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a user.
    UserId
);

uuid_id!(
    /// Unique identifier for an organization.
    OrgId
);

/// Error returned when parsing one of the enums below from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Wire name of this value.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// Account lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Registered, email not yet confirmed.
    #[default]
    Pending,
    /// Email confirmed.
    Verified,
    /// Disabled by an administrator.
    Blocked,
}

string_enum!(UserStatus, "user status", {
    Pending => "pending",
    Verified => "verified",
    Blocked => "blocked",
});

/// Platform-wide role, totally ordered by privilege.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read-only access.
    #[default]
    Viewer,
    /// Bookkeeping access.
    Accountant,
    /// Manages organizations.
    Director,
    /// Manages the platform.
    Admin,
}

string_enum!(Role, "role", {
    Viewer => "viewer",
    Accountant => "accountant",
    Director => "director",
    Admin => "admin",
});

impl Role {
    /// Numeric privilege level, `viewer` = 0 up to `admin` = 3.
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::Viewer => 0,
            Self::Accountant => 1,
            Self::Director => 2,
            Self::Admin => 3,
        }
    }
}

/// Role of a user inside one organization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgRole {
    /// Owner of the organization.
    Director,
    /// Invited bookkeeper.
    #[default]
    Accountant,
    /// Third-party representative.
    Agent,
}

string_enum!(OrgRole, "organization role", {
    Director => "director",
    Accountant => "accountant",
    Agent => "agent",
});

/// Approval state of an org membership.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    /// Awaiting approval.
    #[default]
    Pending,
    /// Approved.
    Approved,
}

string_enum!(LinkStatus, "link status", {
    Pending => "pending",
    Approved => "approved",
});

/// A stored user record, including the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// User ID.
    pub id: UserId,
    /// Full legal name.
    pub full_name: String,
    /// Tax identification number, unique across users.
    pub tax_id: String,
    /// Email address, unique across users.
    pub email: String,
    /// Phone number.
    pub phone: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    /// Lifecycle state.
    pub status: UserStatus,
    /// Platform role.
    pub role: Role,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Read-only view without the password hash.
    #[must_use]
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            full_name: self.full_name.clone(),
            tax_id: self.tax_id.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            status: self.status,
            role: self.role,
            created_at: self.created_at,
        }
    }

    /// Check if the account is blocked.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.status == UserStatus::Blocked
    }
}

/// User data safe to return to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    /// User ID.
    pub id: UserId,
    /// Full legal name.
    pub full_name: String,
    /// Tax identification number.
    #[serde(rename = "inn")]
    pub tax_id: String,
    /// Email address.
    pub email: String,
    /// Phone number.
    pub phone: String,
    /// Lifecycle state.
    pub status: UserStatus,
    /// Effective role.
    pub role: Role,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Input for creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Full legal name.
    pub full_name: String,
    /// Tax identification number.
    pub tax_id: String,
    /// Email address.
    pub email: String,
    /// Phone number.
    pub phone: String,
    /// Already-hashed password.
    pub password_hash: String,
}

impl NewUser {
    /// Materialize a pending viewer account.
    #[must_use]
    pub fn into_user(self) -> User {
        let now = Utc::now();
        User {
            id: UserId::new(),
            full_name: self.full_name,
            tax_id: self.tax_id,
            email: self.email,
            phone: self.phone,
            password_hash: self.password_hash,
            status: UserStatus::Pending,
            role: Role::Viewer,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A stored organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Organization ID.
    pub id: OrgId,
    /// Display name.
    pub name: String,
    /// Tax identification number.
    #[serde(rename = "inn")]
    pub tax_id: String,
    /// State registration number.
    #[serde(rename = "ogrn")]
    pub registration_number: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an organization.
#[derive(Debug, Clone)]
pub struct NewOrganization {
    /// Display name.
    pub name: String,
    /// Tax identification number.
    pub tax_id: String,
    /// State registration number.
    pub registration_number: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
}

impl NewOrganization {
    /// Materialize with a fresh ID and timestamps.
    #[must_use]
    pub fn into_organization(self) -> Organization {
        let now = Utc::now();
        Organization {
            id: OrgId::new(),
            name: self.name,
            tax_id: self.tax_id,
            registration_number: self.registration_number,
            email: self.email,
            phone: self.phone,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of an organization. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct OrganizationUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New contact email.
    pub email: Option<String>,
    /// New contact phone.
    pub phone: Option<String>,
}

impl OrganizationUpdate {
    /// Apply to an organization, bumping `updated_at`.
    pub fn apply(self, org: &mut Organization) {
        if let Some(name) = self.name {
            org.name = name;
        }
        if let Some(email) = self.email {
            org.email = Some(email);
        }
        if let Some(phone) = self.phone {
            org.phone = Some(phone);
        }
        org.updated_at = Utc::now();
    }
}

/// Membership of a user in an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgLink {
    /// Organization.
    pub org_id: OrgId,
    /// Member.
    pub user_id: UserId,
    /// Role inside the organization.
    pub role: OrgRole,
    /// Approval state.
    pub status: LinkStatus,
    /// When the link was created.
    pub joined_at: DateTime<Utc>,
}

impl OrgLink {
    /// New pending link.
    #[must_use]
    pub fn new(org_id: OrgId, user_id: UserId, role: OrgRole) -> Self {
        Self {
            org_id,
            user_id,
            role,
            status: LinkStatus::Pending,
            joined_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(Role::Viewer < Role::Accountant);
        assert!(Role::Accountant < Role::Director);
        assert!(Role::Director < Role::Admin);
        assert_eq!(Role::Admin.level(), 3);
        assert_eq!(Role::Viewer.level(), 0);
    }

    #[test]
    fn test_enum_text_roundtrip() {
        assert_eq!("director".parse::<Role>().unwrap(), Role::Director);
        assert_eq!(Role::Accountant.to_string(), "accountant");
        assert_eq!("agent".parse::<OrgRole>().unwrap(), OrgRole::Agent);
        assert_eq!("blocked".parse::<UserStatus>().unwrap(), UserStatus::Blocked);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_new_user_defaults() {
        let user = NewUser {
            full_name: "Ivan Petrov".to_string(),
            tax_id: "7707083893".to_string(),
            email: "ivan@example.com".to_string(),
            phone: "+7 999 123 45 67".to_string(),
            password_hash: "$argon2id$stub".to_string(),
        }
        .into_user();

        assert_eq!(user.status, UserStatus::Pending);
        assert_eq!(user.role, Role::Viewer);
        assert!(!user.is_blocked());
    }

    #[test]
    fn test_view_omits_hash() {
        let user = NewUser {
            full_name: "Ivan Petrov".to_string(),
            tax_id: "7707083893".to_string(),
            email: "ivan@example.com".to_string(),
            phone: "+79991234567".to_string(),
            password_hash: "$argon2id$do-not-leak".to_string(),
        }
        .into_user();

        let json = serde_json::to_string(&user.view()).unwrap();
        assert!(!json.contains("do-not-leak"));
        assert!(!json.contains("password"));
        assert!(json.contains("\"inn\":\"7707083893\""));
    }

    #[test]
    fn test_id_parse() {
        let id = UserId::new();
        let parsed: UserId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<OrgId>().is_err());
    }

    #[test]
    fn test_organization_update() {
        let mut org = NewOrganization {
            name: "Old".to_string(),
            tax_id: "7707083893".to_string(),
            registration_number: None,
            email: None,
            phone: None,
        }
        .into_organization();

        OrganizationUpdate {
            name: Some("New".to_string()),
            ..Default::default()
        }
        .apply(&mut org);

        assert_eq!(org.name, "New");
        assert!(org.email.is_none());
    }
}
