//! Interactive prompt utilities.

use dialoguer::{Password, theme::ColorfulTheme};

/// Prompt twice for a hidden password; the entries must match.
pub fn new_password(prompt: &str) -> Result<String, dialoguer::Error> {
    Password::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .with_confirmation("Repeat password", "Passwords don't match")
        .interact()
}
