//! Admin user management commands.
//!
//! These open the configured store directly, so a sled database must not be
//! held by a running server at the same time.

use std::path::PathBuf;

use identity_core::store::IdentityStore;
use identity_core::types::{Role, User, UserId};
use identity_server::ServerBuilder;

use crate::ui;

/// Arguments for admin commands.
pub struct AdminArgs {
    /// The admin action to perform.
    pub action: AdminAction,
    /// Config file.
    pub config_path: PathBuf,
}

/// Admin actions. Users are given by id or email.
pub enum AdminAction {
    /// List all users.
    List,
    /// Block a user account.
    Block { user: String },
    /// Unblock a user account.
    Unblock { user: String },
    /// Change a user's platform role.
    SetRole { user: String, role: String },
}

/// Run the admin command.
///
/// # Errors
///
/// Returns error if the store can't be opened or the operation fails.
pub async fn run_admin(args: AdminArgs) -> anyhow::Result<()> {
    let mut config = super::load_config(&args.config_path)?;
    // An in-memory fallback would silently discard every change.
    config.store.fallback_to_memory = false;

    let server = ServerBuilder::new()
        .with_config(config)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to open store: {e}"))?;
    let state = server.state();

    match args.action {
        AdminAction::List => list_users(state.store.as_ref()).await?,
        AdminAction::Block { user } => {
            let user = resolve_user(state.store.as_ref(), &user).await?;
            let view = state.auth.block_user(user.id, None).await?;
            ui::success(&format!("Blocked '{}'", view.email));
        }
        AdminAction::Unblock { user } => {
            let user = resolve_user(state.store.as_ref(), &user).await?;
            let view = state.auth.unblock_user(user.id, None).await?;
            ui::success(&format!("Unblocked '{}'", view.email));
        }
        AdminAction::SetRole { user, role } => {
            let role = parse_role(&role)?;
            let user = resolve_user(state.store.as_ref(), &user).await?;
            let view = state.auth.set_role(user.id, role, None).await?;
            ui::success(&format!("'{}' is now {}", view.email, view.role));
            ui::info("The new role applies from the user's next login or token refresh");
        }
    }

    Ok(())
}

fn parse_role(role: &str) -> anyhow::Result<Role> {
    role.parse().map_err(|_| {
        anyhow::anyhow!("Invalid role: {role}. Use: viewer, accountant, director, or admin")
    })
}

async fn resolve_user(store: &dyn IdentityStore, user: &str) -> anyhow::Result<User> {
    let found = match user.parse::<UserId>() {
        Ok(id) => store.get_user_by_id(id).await?,
        Err(_) => store.get_user_by_email(user.trim()).await?,
    };
    found.ok_or_else(|| anyhow::anyhow!("User not found: {user}"))
}

async fn list_users(store: &dyn IdentityStore) -> anyhow::Result<()> {
    let users = store.list_users().await?;

    if users.is_empty() {
        ui::info("No users registered.");
        return Ok(());
    }

    ui::info(&format!("Users ({}):", users.len()));
    println!();
    ui::table_row(&[
        ("ID", 36),
        ("EMAIL", 32),
        ("ROLE", 10),
        ("STATUS", 8),
        ("CREATED", 20),
    ]);
    for user in &users {
        let id = user.id.to_string();
        let role = user.role.to_string();
        let status = user.status.to_string();
        let created = user.created_at.format("%Y-%m-%d %H:%M").to_string();
        ui::table_row(&[
            (&id, 36),
            (&user.email, 32),
            (&role, 10),
            (&status, 8),
            (&created, 20),
        ]);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use identity_core::store::MemoryStore;
    use identity_core::types::NewUser;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            full_name: "Pavel Orlov".to_string(),
            tax_id: "500100732259".to_string(),
            email: email.to_string(),
            phone: "+79161234567".to_string(),
            password_hash: "$argon2id$stub".to_string(),
        }
    }

    #[test]
    fn test_parse_role() {
        assert_eq!(parse_role("director").unwrap(), Role::Director);
        assert!(parse_role("root").is_err());
    }

    #[tokio::test]
    async fn test_resolve_user_by_id_or_email() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("pavel@example.com")).await.unwrap();

        let by_email = resolve_user(&store, "pavel@example.com").await.unwrap();
        assert_eq!(by_email.id, user.id);

        let by_id = resolve_user(&store, &user.id.to_string()).await.unwrap();
        assert_eq!(by_id.email, "pavel@example.com");

        assert!(resolve_user(&store, "nobody@example.com").await.is_err());
    }
}
