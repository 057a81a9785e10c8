//! Input validation and sanitization.
//!
//! Field checks plug into `validator` derive via `custom(function = ...)`.
//! Free-text fields go through [`normalize_text`] before they are stored.

use std::borrow::Cow;
use std::collections::BTreeMap;

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use crate::secrets::Password;

/// Validation error types.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Input exceeds maximum allowed length.
    #[error("Input exceeds maximum length ({max} characters, got {actual})")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual input length.
        actual: usize,
    },

    /// Nothing left after trimming.
    #[error("Input is empty")]
    Empty,
}

/// Field limits.
pub mod limits {
    /// Minimum full name length.
    pub const MIN_FULL_NAME: u64 = 2;
    /// Maximum full name length.
    pub const MAX_FULL_NAME: u64 = 255;
    /// Minimum password length.
    pub const MIN_PASSWORD: usize = 8;
    /// Maximum password length.
    pub const MAX_PASSWORD: usize = 128;
    /// Maximum organization name length.
    pub const MAX_ORG_NAME: u64 = 512;
    /// Confirmation code length.
    pub const CONFIRMATION_CODE_LEN: usize = 6;
}

/// Trim, strip control characters and NFKC-normalize free text.
///
/// # Errors
///
/// Returns `ValidationError::Empty` if nothing remains, or `TooLong` if the
/// normalized text has more than `max_len` characters.
pub fn normalize_text(input: &str, max_len: usize) -> Result<String, ValidationError> {
    let normalized: String = input
        .chars()
        .filter(|c| !c.is_control())
        .nfkc()
        .collect::<String>()
        .trim()
        .to_string();

    if normalized.is_empty() {
        return Err(ValidationError::Empty);
    }

    let actual = normalized.chars().count();
    if actual > max_len {
        return Err(ValidationError::TooLong {
            max: max_len,
            actual,
        });
    }

    Ok(normalized)
}

fn field_error(code: &'static str, message: &'static str) -> validator::ValidationError {
    validator::ValidationError::new(code).with_message(Cow::Borrowed(message))
}

fn all_digits(value: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&value.len()) && value.bytes().all(|b| b.is_ascii_digit())
}

/// Tax id: 10 to 12 ASCII digits.
///
/// # Errors
///
/// Returns a `validator` error with code `tax_id`.
pub fn validate_tax_id(value: &str) -> Result<(), validator::ValidationError> {
    if all_digits(value, 10, 12) {
        Ok(())
    } else {
        Err(field_error("tax_id", "INN must be 10-12 digits"))
    }
}

/// Registration number: 13 to 15 ASCII digits.
///
/// # Errors
///
/// Returns a `validator` error with code `registration_number`.
pub fn validate_registration_number(value: &str) -> Result<(), validator::ValidationError> {
    if all_digits(value, 13, 15) {
        Ok(())
    } else {
        Err(field_error("registration_number", "OGRN must be 13-15 digits"))
    }
}

/// Confirmation code: exactly six ASCII digits.
///
/// # Errors
///
/// Returns a `validator` error with code `confirmation_code`.
pub fn validate_confirmation_code(value: &str) -> Result<(), validator::ValidationError> {
    let len = limits::CONFIRMATION_CODE_LEN;
    if all_digits(value, len, len) {
        Ok(())
    } else {
        Err(field_error("confirmation_code", "Code must be 6 digits"))
    }
}

/// Russian mobile number: `+7` then ten digits grouped 3-3-2-2, each group
/// optionally preceded by a single `-` or space.
///
/// # Errors
///
/// Returns a `validator` error with code `phone`.
pub fn validate_phone(value: &str) -> Result<(), validator::ValidationError> {
    let invalid = || field_error("phone", "Phone must look like +7 XXX XXX XX XX");

    let rest = value.strip_prefix("+7").ok_or_else(invalid)?.as_bytes();
    let mut pos = 0;
    for len in [3, 3, 2, 2] {
        if matches!(rest.get(pos), Some(b'-' | b' ')) {
            pos += 1;
        }
        let group = rest.get(pos..pos + len).ok_or_else(invalid)?;
        if !group.iter().all(u8::is_ascii_digit) {
            return Err(invalid());
        }
        pos += len;
    }

    if pos == rest.len() { Ok(()) } else { Err(invalid()) }
}

/// Password length between 8 and 128 characters.
///
/// # Errors
///
/// Returns a `validator` error with code `password`.
pub fn validate_password(value: &Password) -> Result<(), validator::ValidationError> {
    let len = value.char_count();
    if (limits::MIN_PASSWORD..=limits::MAX_PASSWORD).contains(&len) {
        Ok(())
    } else {
        Err(field_error("password", "Password must be 8-128 characters"))
    }
}

/// Flatten `validator` errors into `field -> messages`.
#[must_use]
pub fn field_messages(errors: &validator::ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map_or_else(|| e.code.to_string(), ToString::to_string)
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Ivan Petrov \n", 255).unwrap(), "Ivan Petrov");
        assert_eq!(normalize_text("Ivan\u{0}Petrov", 255).unwrap(), "IvanPetrov");
        assert_eq!(normalize_text("\u{FB01}rm", 255).unwrap(), "firm");
        assert!(matches!(normalize_text("   ", 10), Err(ValidationError::Empty)));
        assert!(matches!(
            normalize_text(&"x".repeat(20), 10),
            Err(ValidationError::TooLong { max: 10, actual: 20 })
        ));
    }

    #[test]
    fn test_tax_id() {
        assert!(validate_tax_id("7707083893").is_ok());
        assert!(validate_tax_id("500100732259").is_ok());
        assert!(validate_tax_id("123456789").is_err());
        assert!(validate_tax_id("1234567890123").is_err());
        assert!(validate_tax_id("77070838a3").is_err());
    }

    #[test]
    fn test_registration_number() {
        assert!(validate_registration_number("1027700132195").is_ok());
        assert!(validate_registration_number("304500116000157").is_ok());
        assert!(validate_registration_number("102770013219").is_err());
    }

    #[test]
    fn test_phone() {
        assert!(validate_phone("+79991234567").is_ok());
        assert!(validate_phone("+7 999 123 45 67").is_ok());
        assert!(validate_phone("+7-999-123-45-67").is_ok());
        assert!(validate_phone("89991234567").is_err());
        assert!(validate_phone("+7 999 123 45 6").is_err());
        assert!(validate_phone("+7 999 123 45 678").is_err());
        assert!(validate_phone("+7  999 123 45 67").is_err());
    }

    #[test]
    fn test_confirmation_code() {
        assert!(validate_confirmation_code("000123").is_ok());
        assert!(validate_confirmation_code("12345").is_err());
        assert!(validate_confirmation_code("12345a").is_err());
    }

    #[test]
    fn test_password_length() {
        assert!(validate_password(&Password::new("12345678")).is_ok());
        assert!(validate_password(&Password::new("1234567")).is_err());
        assert!(validate_password(&Password::new("x".repeat(129))).is_err());
    }
}
