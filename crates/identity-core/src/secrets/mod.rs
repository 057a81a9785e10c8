//! Secret wrappers that keep credentials out of logs.
//!
//! - `Password`: plaintext password as received from a client
//! - `SigningSecret`: shared HMAC key for token signing

use rand::RngCore;
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize, Serializer};

const REDACTED: &str = "[REDACTED]";

/// Plaintext password wrapper that prevents accidental logging.
#[derive(Deserialize)]
#[serde(from = "String")]
pub struct Password(SecretBox<str>);

impl Password {
    /// Wrap a plaintext password.
    #[must_use]
    pub fn new(password: impl Into<String>) -> Self {
        Self(SecretBox::new(password.into().into_boxed_str()))
    }

    /// Expose the plaintext for hashing or verification.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Length in characters.
    #[must_use]
    pub fn char_count(&self) -> usize {
        self.expose().chars().count()
    }
}

impl From<String> for Password {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Clone for Password {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Password([REDACTED])")
    }
}

/// Serializes as a fixed marker, never the plaintext.
impl Serialize for Password {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

/// Shared secret used for symmetric JWT signing.
pub struct SigningSecret(SecretBox<[u8]>);

impl SigningSecret {
    /// Wrap raw secret bytes.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(SecretBox::new(secret.into().into_boxed_slice()))
    }

    /// Create from a secret string as found in configuration.
    #[must_use]
    pub fn from_config(secret: &str) -> Self {
        Self::new(secret.as_bytes().to_vec())
    }

    /// Generate a random 32-byte secret, returned alongside its hex form.
    #[must_use]
    pub fn generate() -> (Self, String) {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let encoded = hex::encode(bytes);
        (Self::from_config(&encoded), encoded)
    }

    /// Expose the key bytes for signing.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.0.expose_secret()
    }
}

impl Clone for SigningSecret {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_vec())
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningSecret([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_redaction() {
        let password = Password::new("hunter2hunter2");
        assert_eq!(format!("{password:?}"), "Password([REDACTED])");
        assert_eq!(password.expose(), "hunter2hunter2");
        assert_eq!(password.char_count(), 14);
    }

    #[test]
    fn test_password_deserialize() {
        #[derive(Deserialize)]
        struct Body {
            password: Password,
        }

        let body: Body = serde_json::from_str(r#"{"password":"s3cret-pass"}"#).unwrap();
        assert_eq!(body.password.expose(), "s3cret-pass");
    }

    #[test]
    fn test_password_serializes_redacted() {
        let value = serde_json::to_value(Password::new("s3cret-pass")).unwrap();
        assert_eq!(value, REDACTED);
        assert!(!value.to_string().contains("s3cret-pass"));
    }

    #[test]
    fn test_signing_secret() {
        let (secret, encoded) = SigningSecret::generate();
        assert_eq!(encoded.len(), 64);
        assert_eq!(secret.expose(), encoded.as_bytes());
        assert_eq!(format!("{secret:?}"), "SigningSecret([REDACTED])");

        let (other, _) = SigningSecret::generate();
        assert_ne!(secret.expose(), other.expose());
    }
}
