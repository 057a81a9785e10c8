//! Single-use refresh tokens.
//!
//! Each refresh token carries a unique `jti` and the `fid` of the login it
//! descends from. A consumed `jti` is remembered until the token would have
//! expired anyway. Presenting it again revokes the whole family, so a stolen
//! refresh token stops working for both the thief and the owner.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use super::jwt::Claims;
use crate::error::IdentityError;

#[derive(Default)]
struct LedgerState {
    /// Consumed token id -> token expiry.
    used: HashMap<String, i64>,
    /// Revoked family id -> time until which the revocation is kept.
    revoked: HashMap<String, i64>,
}

impl LedgerState {
    fn prune(&mut self, now: i64) {
        self.used.retain(|_, exp| *exp > now);
        self.revoked.retain(|_, until| *until > now);
    }
}

/// In-memory record of consumed refresh tokens and revoked families.
///
/// State is process-local and lost on restart.
pub struct RefreshLedger {
    state: Mutex<LedgerState>,
    family_ttl: Duration,
}

impl RefreshLedger {
    /// Create a ledger. `family_ttl` should match the refresh token lifetime.
    #[must_use]
    pub fn new(family_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            family_ttl,
        }
    }

    /// Mark a verified refresh token as used.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Authentication` if the token has no id, was
    /// already used, or belongs to a revoked family.
    pub async fn consume(&self, claims: &Claims) -> Result<(), IdentityError> {
        let (Some(jti), Some(fid)) = (claims.jti.as_deref(), claims.fid.as_deref()) else {
            return Err(IdentityError::authentication("Invalid token"));
        };

        let now = Utc::now().timestamp();
        let mut state = self.state.lock().await;
        state.prune(now);

        if state.revoked.contains_key(fid) {
            tracing::warn!(sub = %claims.sub, family = fid, "Refresh attempted on revoked family");
            return Err(IdentityError::authentication("Refresh token has been revoked"));
        }

        if state.used.contains_key(jti) {
            let until = now + i64::try_from(self.family_ttl.as_secs()).unwrap_or(i64::MAX / 2);
            state.revoked.insert(fid.to_string(), until);
            tracing::warn!(sub = %claims.sub, family = fid, "Refresh token reused, family revoked");
            return Err(IdentityError::authentication("Refresh token has already been used"));
        }

        state.used.insert(jti.to_string(), claims.exp);
        Ok(())
    }

    /// Number of consumed tokens still tracked.
    pub async fn tracked(&self) -> usize {
        self.state.lock().await.used.len()
    }
}

impl std::fmt::Debug for RefreshLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshLedger")
            .field("family_ttl", &self.family_ttl)
            .finish_non_exhaustive()
    }
}
