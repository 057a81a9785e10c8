//! JWT token issuing and verification.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Header, TokenData, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use identity_core::config::AuthConfig;
use identity_core::types::{OrgId, Role, UserId};

use super::keys::KeyProvider;
use crate::error::IdentityError;

/// Maximum number of organization ids embedded in an access token.
pub const MAX_ORG_CLAIMS: usize = 20;

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID). Empty when the token carries none.
    #[serde(default)]
    pub sub: String,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Token type (access or refresh).
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Role name, access tokens only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Organization memberships, access tokens only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_ids: Option<Vec<String>>,
    /// Unique token id, refresh tokens only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Rotation family id, refresh tokens only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fid: Option<String>,
}

impl Claims {
    /// Role to act with: the token's role claim, else `stored`.
    ///
    /// A role claim this service doesn't know grants nothing.
    #[must_use]
    pub fn effective_role(&self, stored: Role) -> Role {
        match self.role.as_deref() {
            None => stored,
            Some(name) => name.parse().unwrap_or_else(|_| {
                tracing::warn!(role = name, sub = %self.sub, "Unknown role claim, treating as viewer");
                Role::Viewer
            }),
        }
    }

    /// Expiry as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }
}

/// Token type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Access token for API calls.
    Access,
    /// Refresh token for getting new access tokens.
    Refresh,
}

/// A signed token with its claims.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Encoded JWT.
    pub token: String,
    /// Claims embedded in it.
    pub claims: Claims,
}

impl IssuedToken {
    /// Expiry as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.claims.expires_at()
    }
}

/// A pair of access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
    /// Always `bearer`.
    pub token_type: String,
    /// Access token expiration.
    pub expires_at: DateTime<Utc>,
}

impl TokenPair {
    /// Combine an issued access and refresh token.
    #[must_use]
    pub fn new(access: IssuedToken, refresh: IssuedToken) -> Self {
        Self {
            expires_at: access.expires_at(),
            access_token: access.token,
            refresh_token: refresh.token,
            token_type: "bearer".to_string(),
        }
    }
}

/// Issues and verifies tokens with the keys current at each call.
pub struct TokenCodec {
    keys: Arc<KeyProvider>,
    access_expiry: Duration,
    refresh_expiry: Duration,
}

impl TokenCodec {
    /// Create a codec with explicit lifetimes.
    #[must_use]
    pub const fn new(keys: Arc<KeyProvider>, access_expiry: Duration, refresh_expiry: Duration) -> Self {
        Self {
            keys,
            access_expiry,
            refresh_expiry,
        }
    }

    /// Create a codec with lifetimes from configuration.
    #[must_use]
    pub fn from_config(keys: Arc<KeyProvider>, config: &AuthConfig) -> Self {
        Self::new(keys, config.access_token_ttl(), config.refresh_token_ttl())
    }

    /// Key provider backing this codec.
    #[must_use]
    pub fn keys(&self) -> &KeyProvider {
        &self.keys
    }

    /// Refresh token lifetime.
    #[must_use]
    pub const fn refresh_expiry(&self) -> Duration {
        self.refresh_expiry
    }

    /// Create an access token.
    ///
    /// At most [`MAX_ORG_CLAIMS`] organization ids are embedded; the rest
    /// are dropped.
    ///
    /// # Errors
    ///
    /// Returns error if the signing key can't be loaded or encoding fails.
    pub fn issue_access(
        &self,
        user_id: UserId,
        role: Role,
        org_ids: Option<&[OrgId]>,
        ttl: Option<Duration>,
    ) -> Result<IssuedToken, IdentityError> {
        let now = Utc::now();
        let exp = now + to_chrono(ttl.unwrap_or(self.access_expiry));

        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            token_type: TokenType::Access,
            role: Some(role.as_str().to_string()),
            org_ids: org_ids.map(|ids| {
                ids.iter()
                    .take(MAX_ORG_CLAIMS)
                    .map(ToString::to_string)
                    .collect()
            }),
            jti: None,
            fid: None,
        };

        self.sign(claims)
    }

    /// Create a refresh token.
    ///
    /// A new rotation family is started unless `family` is given.
    ///
    /// # Errors
    ///
    /// Returns error if the signing key can't be loaded or encoding fails.
    pub fn issue_refresh(
        &self,
        user_id: UserId,
        family: Option<String>,
    ) -> Result<IssuedToken, IdentityError> {
        let now = Utc::now();
        let exp = now + to_chrono(self.refresh_expiry);

        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            token_type: TokenType::Refresh,
            role: None,
            org_ids: None,
            jti: Some(Uuid::new_v4().simple().to_string()),
            fid: Some(family.unwrap_or_else(|| Uuid::new_v4().simple().to_string())),
        };

        self.sign(claims)
    }

    fn sign(&self, claims: Claims) -> Result<IssuedToken, IdentityError> {
        let key = self.keys.signing()?;
        let mut header = Header::new(key.algorithm);
        header.kid = key.kid.map(str::to_string);

        let token = encode(&header, &claims, &key.key)
            .map_err(|e| IdentityError::Internal(format!("Token encoding failed: {e}")))?;

        Ok(IssuedToken { token, claims })
    }

    /// Validate and decode a token of either type.
    ///
    /// Every signature, format, algorithm or expiry failure is reported as
    /// the same authentication error.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Authentication("Invalid token")` if the token
    /// doesn't verify.
    pub fn verify(&self, token: &str) -> Result<Claims, IdentityError> {
        let key = self.keys.verifying()?;
        let mut validation = Validation::new(key.algorithm);
        validation.leeway = 0;

        let data: TokenData<Claims> = decode(token, &key.key, &validation).map_err(|e| {
            tracing::debug!(error = ?e.kind(), "Token rejected");
            IdentityError::authentication("Invalid token")
        })?;

        Ok(data.claims)
    }

    /// Validate an access token.
    ///
    /// # Errors
    ///
    /// Returns error if the token is invalid or is not an access token.
    pub fn verify_access(&self, token: &str) -> Result<Claims, IdentityError> {
        self.verify_typed(token, TokenType::Access)
    }

    /// Validate a refresh token.
    ///
    /// # Errors
    ///
    /// Returns error if the token is invalid or is not a refresh token.
    pub fn verify_refresh(&self, token: &str) -> Result<Claims, IdentityError> {
        self.verify_typed(token, TokenType::Refresh)
    }

    fn verify_typed(&self, token: &str, expected: TokenType) -> Result<Claims, IdentityError> {
        let claims = self.verify(token)?;
        if claims.token_type != expected {
            tracing::debug!(?expected, actual = ?claims.token_type, "Wrong token type");
            return Err(IdentityError::authentication("Invalid token type"));
        }
        Ok(claims)
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_default()
}

/// Extract the token from an `Authorization` header value.
///
/// Expects format: "Bearer <token>". The scheme is case sensitive.
#[must_use]
pub fn extract_bearer(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ")
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("access_expiry", &self.access_expiry)
            .field("refresh_expiry", &self.refresh_expiry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::keys::tests::write_keys;
    use identity_core::secrets::SigningSecret;
    use jsonwebtoken::{Algorithm, EncodingKey};
    use tempfile::TempDir;

    const SECRET: &str = "unit-test-signing-secret";

    fn create_codec() -> TokenCodec {
        codec_with_secret(SECRET)
    }

    fn codec_with_secret(secret: &str) -> TokenCodec {
        let keys = KeyProvider::new(&AuthConfig::default(), &SigningSecret::from_config(secret));
        TokenCodec::new(
            Arc::new(keys),
            Duration::from_secs(3600),      // 1 hour
            Duration::from_secs(7 * 86400), // 7 days
        )
    }

    fn org_ids(n: usize) -> Vec<OrgId> {
        (0..n).map(|_| OrgId::new()).collect()
    }

    #[test]
    fn test_access_round_trip() {
        let codec = create_codec();
        let user = UserId::new();
        let orgs = org_ids(3);
        let issued = codec
            .issue_access(user, Role::Director, Some(&orgs), None)
            .unwrap();

        assert!(issued.expires_at() > Utc::now());

        let claims = codec.verify_access(&issued.token).unwrap();
        assert_eq!(claims.sub, user.to_string());
        assert_eq!(claims.role.as_deref(), Some("director"));
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(
            claims.org_ids.unwrap(),
            orgs.iter().map(ToString::to_string).collect::<Vec<_>>()
        );
        assert!(claims.jti.is_none());
    }

    #[test]
    fn test_org_ids_truncated() {
        let codec = create_codec();
        let orgs = org_ids(25);
        let issued = codec
            .issue_access(UserId::new(), Role::Viewer, Some(&orgs), None)
            .unwrap();

        let claims = codec.verify_access(&issued.token).unwrap();
        let ids = claims.org_ids.unwrap();
        assert_eq!(ids.len(), MAX_ORG_CLAIMS);
        assert_eq!(ids[0], orgs[0].to_string());
        assert_eq!(ids[19], orgs[19].to_string());
    }

    #[test]
    fn test_no_org_ids_omitted() {
        let codec = create_codec();
        let issued = codec
            .issue_access(UserId::new(), Role::Viewer, None, None)
            .unwrap();
        assert!(codec.verify(&issued.token).unwrap().org_ids.is_none());
    }

    #[test]
    fn test_custom_ttl() {
        let codec = create_codec();
        let issued = codec
            .issue_access(UserId::new(), Role::Viewer, None, Some(Duration::from_secs(60)))
            .unwrap();
        assert_eq!(issued.claims.exp - issued.claims.iat, 60);
    }

    #[test]
    fn test_refresh_claims() {
        let codec = create_codec();
        let user = UserId::new();
        let issued = codec.issue_refresh(user, None).unwrap();

        let claims = codec.verify_refresh(&issued.token).unwrap();
        assert_eq!(claims.sub, user.to_string());
        assert!(claims.role.is_none());
        assert!(claims.org_ids.is_none());
        assert!(claims.jti.is_some());
        assert_eq!(claims.exp - claims.iat, 7 * 86400);

        let next = codec.issue_refresh(user, claims.fid.clone()).unwrap();
        assert_eq!(next.claims.fid, claims.fid);
        assert_ne!(next.claims.jti, claims.jti);
    }

    #[test]
    fn test_type_confusion_rejected() {
        let codec = create_codec();
        let user = UserId::new();
        let access = codec.issue_access(user, Role::Viewer, None, None).unwrap();
        let refresh = codec.issue_refresh(user, None).unwrap();

        assert!(matches!(
            codec.verify_refresh(&access.token),
            Err(IdentityError::Authentication(_))
        ));
        assert!(matches!(
            codec.verify_access(&refresh.token),
            Err(IdentityError::Authentication(_))
        ));
    }

    #[test]
    fn test_invalid_token() {
        let codec = create_codec();
        let err = codec.verify("invalid.token.here").unwrap_err();
        assert_eq!(err.to_string(), "Invalid token");
    }

    #[test]
    fn test_expired_token_rejected() {
        let codec = create_codec();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: UserId::new().to_string(),
            iat: now - 7200,
            exp: now - 3600,
            token_type: TokenType::Access,
            role: Some("viewer".to_string()),
            org_ids: None,
            jti: None,
            fid: None,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let err = codec.verify(&token).unwrap_err();
        assert_eq!(err.to_string(), "Invalid token");
    }

    #[test]
    fn test_key_change_invalidates_tokens() {
        let old = codec_with_secret("first-secret");
        let new = codec_with_secret("second-secret");
        let issued = old
            .issue_access(UserId::new(), Role::Admin, None, None)
            .unwrap();

        assert!(old.verify(&issued.token).is_ok());
        assert_eq!(new.verify(&issued.token).unwrap_err().to_string(), "Invalid token");
    }

    #[test]
    fn test_rs256_round_trip() {
        let temp = TempDir::new().unwrap();
        let (private, public) = write_keys(temp.path());
        let config = AuthConfig::builder()
            .private_key_path(private)
            .public_key_path(public)
            .build();
        let keys = KeyProvider::new(&config, &SigningSecret::from_config(SECRET));
        let codec = TokenCodec::from_config(Arc::new(keys), &config);

        let issued = codec
            .issue_access(UserId::new(), Role::Accountant, None, None)
            .unwrap();
        let header = jsonwebtoken::decode_header(&issued.token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some(crate::auth::keys::KEY_ID));

        assert!(codec.verify_access(&issued.token).is_ok());

        // An HMAC token is not accepted once RSA verification is active.
        let hmac = create_codec()
            .issue_access(UserId::new(), Role::Accountant, None, None)
            .unwrap();
        assert!(codec.verify(&hmac.token).is_err());
    }

    #[test]
    fn test_effective_role() {
        let mut claims = create_codec()
            .issue_access(UserId::new(), Role::Director, None, None)
            .unwrap()
            .claims;
        assert_eq!(claims.effective_role(Role::Viewer), Role::Director);

        claims.role = None;
        assert_eq!(claims.effective_role(Role::Accountant), Role::Accountant);

        claims.role = Some("superuser".to_string());
        assert_eq!(claims.effective_role(Role::Admin), Role::Viewer);
    }

    #[test]
    fn test_token_pair() {
        let codec = create_codec();
        let user = UserId::new();
        let pair = TokenPair::new(
            codec.issue_access(user, Role::Viewer, None, None).unwrap(),
            codec.issue_refresh(user, None).unwrap(),
        );
        assert_eq!(pair.token_type, "bearer");
        assert!(codec.verify_access(&pair.access_token).is_ok());
        assert!(codec.verify_refresh(&pair.refresh_token).is_ok());
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer("bearer abc123"), None);
        assert_eq!(extract_bearer("BEARER abc123"), None);
        assert_eq!(extract_bearer("Basic abc123"), None);
        assert_eq!(extract_bearer("abc123"), None);
    }
}
