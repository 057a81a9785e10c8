//! Audit trail of security-relevant actions.
//!
//! Every record is emitted as a `tracing` event on the `identity::audit`
//! target and kept in a bounded in-memory buffer for the admin API.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use identity_core::types::UserId;

/// Default number of records kept in memory.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// One audited action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Action name, e.g. `org.create`.
    pub action: String,
    /// Kind of entity acted on.
    pub entity_type: String,
    /// Entity acted on.
    pub entity_id: String,
    /// Acting user, if known.
    pub user_id: Option<UserId>,
    /// Extra context.
    pub details: serde_json::Value,
}

/// Bounded audit log. Oldest records are dropped first.
#[derive(Debug)]
pub struct AuditLog {
    records: Mutex<VecDeque<AuditRecord>>,
    capacity: usize,
}

impl AuditLog {
    /// Create a log holding at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Record an action.
    pub async fn record(
        &self,
        action: &str,
        entity_type: &str,
        entity_id: impl ToString,
        user_id: Option<UserId>,
        details: serde_json::Value,
    ) {
        let record = AuditRecord {
            timestamp: Utc::now(),
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            user_id,
            details,
        };

        tracing::info!(
            target: "identity::audit",
            action = %record.action,
            entity_type = %record.entity_type,
            entity_id = %record.entity_id,
            user_id = ?record.user_id,
            details = %record.details,
            "Audit"
        );

        let mut records = self.records.lock().await;
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Up to `limit` most recent records, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<AuditRecord> {
        self.records
            .lock()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Remove and return every record, oldest first.
    pub async fn drain(&self) -> Vec<AuditRecord> {
        self.records.lock().await.drain(..).collect()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
