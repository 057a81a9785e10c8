//! Email confirmation codes.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::IdentityError;

const INVALID_CODE: &str = "Invalid or expired confirmation code";

struct PendingCode {
    code: String,
    expires_at: Instant,
}

/// A code taken out of the store by [`ConfirmationCodeStore::consume`].
///
/// Hand it back with [`ConfirmationCodeStore::restore`] if the confirmation
/// fails after the code was accepted.
#[must_use]
pub struct ConsumedCode {
    email: String,
    pending: PendingCode,
}

impl std::fmt::Debug for ConsumedCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumedCode")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// One-time six digit codes keyed by email.
///
/// Issuing a code replaces any earlier one for the same email.
pub struct ConfirmationCodeStore {
    codes: Mutex<HashMap<String, PendingCode>>,
    ttl: Duration,
}

impl ConfirmationCodeStore {
    /// Create an empty store whose codes live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            codes: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Generate and store a fresh code for `email`.
    pub async fn issue(&self, email: &str) -> String {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        let pending = PendingCode {
            code: code.clone(),
            expires_at: Instant::now() + self.ttl,
        };
        self.codes.lock().await.insert(email.to_string(), pending);
        code
    }

    /// Check `code` against the stored one and take it out on a match.
    ///
    /// A wrong code leaves the stored one in place so the user can retry.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Authentication` if no code is pending, the
    /// code expired, or it doesn't match.
    pub async fn consume(&self, email: &str, code: &str) -> Result<ConsumedCode, IdentityError> {
        let mut codes = self.codes.lock().await;

        let Some(pending) = codes.get(email) else {
            return Err(IdentityError::authentication(INVALID_CODE));
        };

        if pending.expires_at <= Instant::now() {
            codes.remove(email);
            tracing::debug!(email, "Confirmation code expired");
            return Err(IdentityError::authentication(INVALID_CODE));
        }

        if pending.code != code {
            return Err(IdentityError::authentication(INVALID_CODE));
        }

        codes
            .remove_entry(email)
            .map(|(email, pending)| ConsumedCode { email, pending })
            .ok_or_else(|| IdentityError::authentication(INVALID_CODE))
    }

    /// Put a consumed code back, keeping its original expiry.
    ///
    /// A code issued for the same email in the meantime wins.
    pub async fn restore(&self, consumed: ConsumedCode) {
        let ConsumedCode { email, pending } = consumed;
        self.codes.lock().await.entry(email).or_insert(pending);
    }

    /// Number of pending codes.
    pub async fn len(&self) -> usize {
        self.codes.lock().await.len()
    }

    /// Whether no codes are pending.
    pub async fn is_empty(&self) -> bool {
        self.codes.lock().await.is_empty()
    }

    #[cfg(test)]
    pub(crate) async fn peek(&self, email: &str) -> Option<String> {
        self.codes.lock().await.get(email).map(|p| p.code.clone())
    }
}

impl std::fmt::Debug for ConfirmationCodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationCodeStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store() -> ConfirmationCodeStore {
        ConfirmationCodeStore::new(Duration::from_secs(900))
    }

    #[tokio::test]
    async fn test_code_format() {
        let store = store();
        for _ in 0..50 {
            let code = store.issue("a@example.com").await;
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_consume_once() {
        let store = store();
        let code = store.issue("a@example.com").await;

        let _ = store.consume("a@example.com", &code).await.unwrap();
        let err = store.consume("a@example.com", &code).await.unwrap_err();
        assert_eq!(err.to_string(), INVALID_CODE);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_restore_allows_retry() {
        let store = store();
        let code = store.issue("a@example.com").await;

        let consumed = store.consume("a@example.com", &code).await.unwrap();
        assert!(store.is_empty().await);

        store.restore(consumed).await;
        assert_eq!(store.peek("a@example.com").await.as_deref(), Some(code.as_str()));
        let _ = store.consume("a@example.com", &code).await.unwrap();
    }

    #[tokio::test]
    async fn test_restore_does_not_replace_newer_code() {
        let store = store();
        let first = store.issue("a@example.com").await;
        let consumed = store.consume("a@example.com", &first).await.unwrap();
        let second = store.issue("a@example.com").await;

        store.restore(consumed).await;
        assert_eq!(store.peek("a@example.com").await, Some(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restored_code_keeps_expiry() {
        let store = store();
        let code = store.issue("a@example.com").await;
        let consumed = store.consume("a@example.com", &code).await.unwrap();

        tokio::time::advance(Duration::from_secs(600)).await;
        store.restore(consumed).await;
        tokio::time::advance(Duration::from_secs(301)).await;

        assert!(store.consume("a@example.com", &code).await.is_err());
    }

    #[tokio::test]
    async fn test_wrong_code_keeps_pending() {
        let store = store();
        let code = store.issue("a@example.com").await;
        let wrong = if code == "000000" { "111111" } else { "000000" };

        assert!(store.consume("a@example.com", wrong).await.is_err());
        let _ = store.consume("a@example.com", &code).await.unwrap();
    }

    #[tokio::test]
    async fn test_reissue_replaces() {
        let store = store();
        let first = store.issue("a@example.com").await;
        let second = store.issue("a@example.com").await;

        if first != second {
            assert!(store.consume("a@example.com", &first).await.is_err());
        }
        let _ = store.consume("a@example.com", &second).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_email() {
        assert!(store().consume("nobody@example.com", "123456").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_code_removed() {
        let store = store();
        let code = store.issue("a@example.com").await;

        tokio::time::advance(Duration::from_secs(901)).await;

        let err = store.consume("a@example.com", &code).await.unwrap_err();
        assert_eq!(err.to_string(), INVALID_CODE);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_consume_single_winner() {
        let store = Arc::new(store());
        let code = store.issue("a@example.com").await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let code = code.clone();
                tokio::spawn(async move { store.consume("a@example.com", &code).await.is_ok() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
