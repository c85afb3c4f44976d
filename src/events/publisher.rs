use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;

/// Fire-and-forget lifecycle event bus.
///
/// Publishing is decoupled from consumption: the engine never depends on
/// subscribers existing or keeping up. Slow subscribers observe lag on
/// their receiver, not backpressure on the engine.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// An event delivered to subscribers
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub name: String,
    pub payload: Value,
    pub published_at: DateTime<Utc>,
}

impl EventPublisher {
    /// Create a publisher with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a named event with a structured payload.
    ///
    /// Having zero subscribers is success, not failure.
    pub async fn publish(
        &self,
        name: impl Into<String>,
        payload: Value,
    ) -> Result<(), PublishError> {
        let event = PublishedEvent {
            name: name.into(),
            payload,
            published_at: Utc::now(),
        };
        match self.sender.send(event) {
            Ok(_) => Ok(()),
            // No receivers currently subscribed
            Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }

    /// Subscribe to all published events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Event publishing failures
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("event channel is closed")]
    ChannelClosed,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
