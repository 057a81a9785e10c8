//! JSON Web Key Set for the RSA verification key.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};

use super::keys::{KEY_ID, KeyProvider};
use crate::error::IdentityError;

/// A single RSA signing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type, always `RSA`.
    pub kty: String,
    /// Intended use, always `sig`.
    #[serde(rename = "use")]
    pub key_use: String,
    /// Algorithm, always `RS256`.
    pub alg: String,
    /// Key id.
    pub kid: String,
    /// Modulus, base64url.
    pub n: String,
    /// Exponent, base64url.
    pub e: String,
}

/// Key set served at `/.well-known/jwks.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    /// Published keys. Empty when tokens are signed with a shared secret.
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Build the set from the provider's public key.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Internal` if the public key can't be parsed.
    pub fn from_provider(keys: &KeyProvider) -> Result<Self, IdentityError> {
        match keys.public_key_pem()? {
            Some(pem) => Ok(Self {
                keys: vec![jwk_from_pem(pem, KEY_ID)?],
            }),
            None => Ok(Self::default()),
        }
    }
}

/// Build a JWK from an RSA public key in SPKI or PKCS#1 PEM form.
///
/// # Errors
///
/// Returns `IdentityError::Internal` if the PEM is not an RSA public key.
pub fn jwk_from_pem(pem: &str, kid: &str) -> Result<Jwk, IdentityError> {
    let public_key = RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| IdentityError::Internal(format!("Failed to parse RSA public key: {e}")))?;

    Ok(Jwk {
        kty: "RSA".to_string(),
        key_use: "sig".to_string(),
        alg: "RS256".to_string(),
        kid: kid.to_string(),
        n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
        e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::keys::tests::{TEST_KEYS, write_keys};
    use identity_core::config::AuthConfig;
    use identity_core::secrets::SigningSecret;
    use tempfile::TempDir;

    #[test]
    fn test_jwk_fields() {
        let jwk = jwk_from_pem(&TEST_KEYS.1, "kid-1").unwrap();
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.kid, "kid-1");
        // 65537
        assert_eq!(jwk.e, "AQAB");
        // 2048-bit modulus is 256 bytes, 342 base64url chars unpadded.
        assert_eq!(jwk.n.len(), 342);

        let json = serde_json::to_value(&jwk).unwrap();
        assert_eq!(json["use"], "sig");
    }

    #[test]
    fn test_invalid_pem() {
        assert!(jwk_from_pem("garbage", "kid").is_err());
    }

    #[test]
    fn test_set_from_provider() {
        let secret = SigningSecret::from_config("secret");
        let empty = JwkSet::from_provider(&KeyProvider::new(&AuthConfig::default(), &secret)).unwrap();
        assert!(empty.keys.is_empty());

        let temp = TempDir::new().unwrap();
        let (_, public) = write_keys(temp.path());
        let config = AuthConfig::builder().public_key_path(public).build();
        let set = JwkSet::from_provider(&KeyProvider::new(&config, &secret)).unwrap();
        assert_eq!(set.keys.len(), 1);
        assert_eq!(set.keys[0].kid, KEY_ID);
    }
}
