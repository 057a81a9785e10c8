//! Role hierarchy and permission checks.

use identity_core::types::{Role, UserView};

use crate::error::IdentityError;

/// Permission name to the minimum role that holds it.
pub const PERMISSIONS: &[(&str, Role)] = &[
    ("org.create", Role::Director),
    ("org.read", Role::Viewer),
    ("org.update", Role::Director),
    ("org.link_user", Role::Director),
    ("admin.manage_users", Role::Admin),
    ("admin.manage_roles", Role::Admin),
    ("admin.system_config", Role::Admin),
];

/// Minimum role for a permission, if the permission exists.
#[must_use]
pub fn required_role(permission: &str) -> Option<Role> {
    PERMISSIONS
        .iter()
        .find(|(name, _)| *name == permission)
        .map(|(_, role)| *role)
}

/// Whether the user's role is at least `required`.
#[must_use]
pub const fn has_role(user: &UserView, required: Role) -> bool {
    user.role.level() >= required.level()
}

/// Whether the user holds `permission`. Unknown permissions are denied.
#[must_use]
pub fn has_permission(user: &UserView, permission: &str) -> bool {
    match required_role(permission) {
        Some(required) => has_role(user, required),
        None => {
            tracing::warn!(permission, "Unknown permission checked, denying");
            false
        }
    }
}

/// Require at least `required`.
///
/// # Errors
///
/// Returns `IdentityError::Authorization` if the user's role is lower.
pub fn require_role(user: &UserView, required: Role) -> Result<(), IdentityError> {
    if has_role(user, required) {
        return Ok(());
    }
    tracing::info!(user_id = %user.id, role = %user.role, %required, "Role check denied");
    Err(IdentityError::authorization(format!(
        "Role '{required}' or higher is required"
    )))
}

/// Require `permission`.
///
/// # Errors
///
/// Returns `IdentityError::Authorization` if the user lacks it.
pub fn require_permission(user: &UserView, permission: &str) -> Result<(), IdentityError> {
    if has_permission(user, permission) {
        return Ok(());
    }
    tracing::info!(user_id = %user.id, role = %user.role, permission, "Permission denied");
    Err(IdentityError::authorization(format!(
        "Permission '{permission}' is required"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use identity_core::types::NewUser;

    fn user(role: Role) -> UserView {
        let mut user = NewUser {
            full_name: "Test User".to_string(),
            tax_id: "123456789012".to_string(),
            email: "test@example.com".to_string(),
            phone: "+79991234567".to_string(),
            password_hash: String::new(),
        }
        .into_user();
        user.role = role;
        user.view()
    }

    #[test]
    fn test_hierarchy() {
        let director = user(Role::Director);
        assert!(has_role(&director, Role::Viewer));
        assert!(has_role(&director, Role::Accountant));
        assert!(has_role(&director, Role::Director));
        assert!(!has_role(&director, Role::Admin));
    }

    #[test]
    fn test_permission_table() {
        assert!(has_permission(&user(Role::Viewer), "org.read"));
        assert!(!has_permission(&user(Role::Accountant), "org.create"));
        assert!(has_permission(&user(Role::Director), "org.link_user"));
        assert!(!has_permission(&user(Role::Director), "admin.manage_users"));
        assert!(has_permission(&user(Role::Admin), "admin.system_config"));
    }

    #[test]
    fn test_unknown_permission_denied() {
        assert!(!has_permission(&user(Role::Admin), "org.delete"));
        assert!(required_role("org.delete").is_none());
    }

    #[test]
    fn test_require() {
        assert!(require_role(&user(Role::Admin), Role::Director).is_ok());

        let err = require_role(&user(Role::Viewer), Role::Director).unwrap_err();
        assert_eq!(err.to_string(), "Role 'director' or higher is required");

        let err = require_permission(&user(Role::Director), "admin.manage_roles").unwrap_err();
        assert!(matches!(err, IdentityError::Authorization(_)));
    }
}
