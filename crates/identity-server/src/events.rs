//! In-process event bus.
//!
//! Domain events are fanned out over a tokio broadcast channel. A logging
//! tap subscribed at startup records every event; other subscribers (for
//! example a forwarder to an external bus) can attach with
//! [`BroadcastPublisher::subscribe`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use identity_core::config::EventsConfig;
use identity_core::events::{EventError, EventPublisher};

/// A published event with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event ID.
    pub id: String,
    /// Timestamp.
    pub timestamp: DateTime<Utc>,
    /// Bus subject, e.g. `identity.org.created`.
    pub subject: String,
    /// Event body.
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Wrap a payload with a fresh id and the current time.
    #[must_use]
    pub fn new(subject: &str, payload: serde_json::Value) -> Self {
        let mut bytes = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut bytes);

        Self {
            id: hex::encode(bytes),
            timestamp: Utc::now(),
            subject: subject.to_string(),
            payload,
        }
    }
}

/// Default channel capacity for event broadcasts.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Publisher backed by a broadcast channel.
#[derive(Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<EventEnvelope>,
    enabled: bool,
}

impl BroadcastPublisher {
    /// Create an enabled publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create an enabled publisher with custom capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            enabled: true,
        }
    }

    /// Create a publisher from configuration.
    ///
    /// When events are disabled every publish fails with
    /// `EventError::Unavailable`.
    #[must_use]
    pub fn from_config(config: &EventsConfig) -> Self {
        let mut publisher = Self::with_capacity(config.channel_capacity);
        publisher.enabled = config.enabled;
        publisher
    }

    /// Subscribe to receive events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Spawn a task that logs every event until the publisher is dropped.
    #[must_use]
    pub fn spawn_log_tap(&self) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => tracing::info!(
                        target: "identity::events",
                        id = %envelope.id,
                        subject = %envelope.subject,
                        payload = %envelope.payload,
                        "Event"
                    ),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event log tap lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BroadcastPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastPublisher")
            .field("enabled", &self.enabled)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, subject: &str, payload: serde_json::Value) -> Result<(), EventError> {
        if !self.enabled {
            return Err(EventError::Unavailable("event publishing is disabled".to_string()));
        }
        // No subscribers is not a failure.
        let delivered = self
            .sender
            .send(EventEnvelope::new(subject, payload))
            .unwrap_or(0);
        tracing::trace!(subject, delivered, "Event broadcast");
        Ok(())
    }
}
