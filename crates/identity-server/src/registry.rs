//! Company registry lookup by tax id.
//!
//! Used to fill in an organization's official name and registration number
//! at creation time. The lookup is optional: every failure is logged and
//! treated as "no record".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use identity_core::config::RegistryConfig;

/// Company data returned by the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRecord {
    /// Official name.
    #[serde(default)]
    pub name: Option<String>,
    /// State registration number.
    #[serde(default, alias = "ogrn")]
    pub registration_number: Option<String>,
}

/// Source of registry records.
#[async_trait]
pub trait RegistryLookup: Send + Sync {
    /// Look up a company. `None` when absent or the lookup failed.
    async fn lookup_by_tax_id(&self, tax_id: &str) -> Option<RegistryRecord>;
}

/// Lookup that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRegistry;

#[async_trait]
impl RegistryLookup for DisabledRegistry {
    async fn lookup_by_tax_id(&self, _tax_id: &str) -> Option<RegistryRecord> {
        None
    }
}

/// Lookup over HTTP: `GET {base_url}/{tax_id}` returning a JSON record.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: Client,
    base_url: String,
}

impl HttpRegistry {
    /// Create a client for `base_url` with a per-request timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Registry client setup failed, using defaults");
                Client::new()
            });
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn fetch(&self, tax_id: &str) -> Result<Option<RegistryRecord>, reqwest::Error> {
        let url = format!("{}/{tax_id}", self.base_url);
        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let record = response.error_for_status()?.json().await?;
        Ok(Some(record))
    }
}

#[async_trait]
impl RegistryLookup for HttpRegistry {
    async fn lookup_by_tax_id(&self, tax_id: &str) -> Option<RegistryRecord> {
        match self.fetch(tax_id).await {
            Ok(record) => {
                tracing::debug!(inn = tax_id, found = record.is_some(), "Registry lookup");
                record
            }
            Err(e) => {
                tracing::warn!(inn = tax_id, error = %e, "Registry lookup failed");
                None
            }
        }
    }
}

/// Build the configured lookup.
#[must_use]
pub fn from_config(config: &RegistryConfig) -> Arc<dyn RegistryLookup> {
    match config.base_url.as_deref() {
        Some(url) if !url.is_empty() => {
            tracing::info!(url, "Registry lookup enabled");
            Arc::new(HttpRegistry::new(url, Duration::from_secs(config.timeout_secs)))
        }
        _ => Arc::new(DisabledRegistry),
    }
}
