//! Signing and verification key resolution.
//!
//! RS256 is used when a PEM file is configured and readable, otherwise the
//! shared secret with the configured HMAC algorithm. PEM files are read
//! lazily and cached only after a successful read, so a key installed after
//! startup is picked up on the next token operation.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};

use identity_core::config::{AuthConfig, SymmetricAlgorithm};
use identity_core::secrets::SigningSecret;

use crate::error::IdentityError;

/// Key id advertised in JWKS and in RS256 token headers.
pub const KEY_ID: &str = "identity-1";

/// Key material for signing tokens.
#[derive(Clone)]
pub struct SigningKey {
    /// Header algorithm.
    pub algorithm: Algorithm,
    /// Encoding key.
    pub key: EncodingKey,
    /// Header `kid`, set for asymmetric keys.
    pub kid: Option<&'static str>,
}

/// Key material for verifying tokens.
#[derive(Clone)]
pub struct VerifyingKey {
    /// Accepted algorithm.
    pub algorithm: Algorithm,
    /// Decoding key.
    pub key: DecodingKey,
}

struct PublicKey {
    pem: String,
    verifying: VerifyingKey,
}

/// Resolved key configuration, for startup logs and health output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    /// Shared secret for both signing and verification.
    Symmetric(Algorithm),
    /// RSA key pair.
    Asymmetric,
    /// RSA private key with no readable public key. Issued tokens won't verify.
    SigningOnly,
}

const fn hmac_algorithm(alg: SymmetricAlgorithm) -> Algorithm {
    match alg {
        SymmetricAlgorithm::HS256 => Algorithm::HS256,
        SymmetricAlgorithm::HS384 => Algorithm::HS384,
        SymmetricAlgorithm::HS512 => Algorithm::HS512,
    }
}

/// Supplies the current signing and verification keys.
pub struct KeyProvider {
    symmetric_signing: SigningKey,
    symmetric_verifying: VerifyingKey,
    private_key: Option<KeyFile>,
    public_key: Option<KeyFile>,
    private_cache: OnceLock<SigningKey>,
    public_cache: OnceLock<PublicKey>,
}

impl KeyProvider {
    /// Create a provider from an explicit shared secret.
    #[must_use]
    pub fn new(config: &AuthConfig, secret: &SigningSecret) -> Self {
        let algorithm = hmac_algorithm(config.jwt_algorithm);
        Self {
            symmetric_signing: SigningKey {
                algorithm,
                key: EncodingKey::from_secret(secret.expose()),
                kid: None,
            },
            symmetric_verifying: VerifyingKey {
                algorithm,
                key: DecodingKey::from_secret(secret.expose()),
            },
            private_key: config.jwt_private_key_path.clone().map(KeyFile::new),
            public_key: config.jwt_public_key_path.clone().map(KeyFile::new),
            private_cache: OnceLock::new(),
            public_cache: OnceLock::new(),
        }
    }

    /// Create a provider from configuration.
    ///
    /// Without a configured secret a random one is generated; tokens signed
    /// with it do not survive a restart.
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        let secret = match config.jwt_secret.as_deref() {
            Some(secret) => SigningSecret::from_config(secret),
            None => {
                tracing::warn!("No JWT secret configured, generated an ephemeral one");
                SigningSecret::generate().0
            }
        };
        Self::new(config, &secret)
    }

    /// Key for signing a token now.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Internal` if the private key file exists but is
    /// not a valid RSA PEM.
    pub fn signing(&self) -> Result<&SigningKey, IdentityError> {
        if let Some(key) = self.private_cache.get() {
            return Ok(key);
        }

        let Some(file) = &self.private_key else {
            return Ok(&self.symmetric_signing);
        };
        let path = file.path();

        match file.read() {
            Some(pem) => {
                let key = EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
                    IdentityError::Internal(format!("Invalid private key {}: {e}", path.display()))
                })?;
                tracing::info!(path = %path.display(), "Loaded RSA signing key");
                Ok(self.private_cache.get_or_init(|| SigningKey {
                    algorithm: Algorithm::RS256,
                    key,
                    kid: Some(KEY_ID),
                }))
            }
            None => Ok(&self.symmetric_signing),
        }
    }

    /// Key for verifying a token now.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Internal` if the public key file exists but is
    /// not a valid RSA PEM.
    pub fn verifying(&self) -> Result<&VerifyingKey, IdentityError> {
        Ok(self
            .public_key()?
            .map_or(&self.symmetric_verifying, |public| &public.verifying))
    }

    /// PEM text of the public key, if one is configured and readable.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Internal` if the file is not a valid RSA PEM.
    pub fn public_key_pem(&self) -> Result<Option<&str>, IdentityError> {
        Ok(self.public_key()?.map(|public| public.pem.as_str()))
    }

    fn public_key(&self) -> Result<Option<&PublicKey>, IdentityError> {
        if let Some(public) = self.public_cache.get() {
            return Ok(Some(public));
        }

        let Some(file) = &self.public_key else {
            return Ok(None);
        };
        let path = file.path();
        let Some(pem) = file.read() else {
            return Ok(None);
        };

        let key = DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
            IdentityError::Internal(format!("Invalid public key {}: {e}", path.display()))
        })?;
        tracing::info!(path = %path.display(), "Loaded RSA verification key");
        Ok(Some(self.public_cache.get_or_init(|| PublicKey {
            pem,
            verifying: VerifyingKey {
                algorithm: Algorithm::RS256,
                key,
            },
        })))
    }

    /// Resolve both keys and report the mode.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Internal` if a configured PEM file is invalid.
    pub fn describe(&self) -> Result<KeyMode, IdentityError> {
        let signing = self.signing()?.algorithm;
        let verifying = self.verifying()?.algorithm;
        Ok(match (signing, verifying) {
            (Algorithm::RS256, Algorithm::RS256) => KeyMode::Asymmetric,
            (Algorithm::RS256, _) => KeyMode::SigningOnly,
            (alg, _) => KeyMode::Symmetric(alg),
        })
    }
}

/// A configured PEM path. A read failure is warned about once until the
/// file becomes readable again.
struct KeyFile {
    path: PathBuf,
    failing: AtomicBool,
}

impl KeyFile {
    const fn new(path: PathBuf) -> Self {
        Self {
            path,
            failing: AtomicBool::new(false),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(pem) => {
                self.failing.store(false, Ordering::Relaxed);
                Some(pem)
            }
            Err(e) => {
                if self.first_failure() {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Key file not readable, using shared secret"
                    );
                } else {
                    tracing::debug!(
                        path = %self.path.display(),
                        error = %e,
                        "Key file still not readable"
                    );
                }
                None
            }
        }
    }

    fn first_failure(&self) -> bool {
        !self.failing.swap(true, Ordering::Relaxed)
    }
}

impl std::fmt::Debug for KeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyProvider")
            .field("symmetric_algorithm", &self.symmetric_signing.algorithm)
            .field("private_key_path", &self.private_key.as_ref().map(KeyFile::path))
            .field("public_key_path", &self.public_key.as_ref().map(KeyFile::path))
            .finish_non_exhaustive()
    }
}
