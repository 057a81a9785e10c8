//! Password hashing.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString, rand_core::OsRng,
    },
};

use identity_core::config::PasswordConfig;
use identity_core::secrets::Password;

use crate::error::IdentityError;

/// Argon2id hasher with configurable cost.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    /// Create a hasher from configuration.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Internal` if the cost parameters are out of range.
    pub fn new(config: &PasswordConfig) -> Result<Self, IdentityError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| IdentityError::Internal(format!("Invalid password hash parameters: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password with a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Internal` if hashing fails.
    pub fn hash(&self, password: &Password) -> Result<String, IdentityError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.expose().as_bytes(), &salt)
            .map_err(|e| IdentityError::Internal(format!("Password hashing failed: {e}")))?;
        Ok(hash.to_string())
    }

    /// Check a password against a stored hash.
    ///
    /// Malformed hashes verify as `false`. Cost parameters are read from the
    /// hash itself, so hashes made under older settings keep working.
    #[must_use]
    pub fn verify(&self, password: &Password, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.argon2()
            .verify_password(password.expose().as_bytes(), &parsed)
            .is_ok()
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("m_cost", &self.params.m_cost())
            .field("t_cost", &self.params.t_cost())
            .field("p_cost", &self.params.p_cost())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(&PasswordConfig::minimal()).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = hasher();
        let password = Password::new("correct horse battery");
        let hash = hasher.hash(&password).unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify(&password, &hash));
        assert!(!hasher.verify(&Password::new("wrong password"), &hash));
    }

    #[test]
    fn test_salts_differ() {
        let hasher = hasher();
        let password = Password::new("same password");
        let a = hasher.hash(&password).unwrap();
        let b = hasher.hash(&password).unwrap();

        assert_ne!(a, b);
        assert!(hasher.verify(&password, &a));
        assert!(hasher.verify(&password, &b));
    }

    #[test]
    fn test_malformed_hash_is_false() {
        let hasher = hasher();
        assert!(!hasher.verify(&Password::new("anything"), "not-a-phc-string"));
        assert!(!hasher.verify(&Password::new("anything"), ""));
    }

    #[test]
    fn test_invalid_params() {
        let config = PasswordConfig {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        };
        assert!(PasswordHasher::new(&config).is_err());
    }
}
