//! Hash a password with the configured argon2 cost settings.

use std::path::Path;

use anyhow::Result;

use identity_core::secrets::Password;
use identity_core::validation::validate_password;
use identity_server::PasswordHasher;

use crate::ui;

/// Prompt for a password and print its PHC hash string.
///
/// # Errors
///
/// Returns error if the prompt fails, the password is rejected, or hashing fails.
pub fn run_hash_password(config_path: &Path) -> Result<()> {
    let config = super::load_config(config_path)?;
    let password = Password::new(ui::prompts::new_password("Password")?);

    if let Err(e) = validate_password(&password) {
        anyhow::bail!("Password rejected: {e}");
    }

    let hasher = PasswordHasher::new(&config.auth.password)?;
    println!("{}", hasher.hash(&password)?);
    Ok(())
}
