//! NATS transport for world traffic.
//!
//! Clients publish [`InboundMessage`] JSON to a map's inbound subject; the
//! bridge forwards each message into that map's router. Notifications
//! leave a world in per-tick batches and are published as one JSON array
//! per batch.
//!
//! # Subject Convention
//!
//! - **Inbound subscribe:** `rair.{map}.inbound`
//! - **Notification publish:** `rair.{map}.notifications`

use futures::StreamExt as _;
use rair_types::{InboundMessage, Notification};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::EngineError;

/// Subject clients publish a map's inbound traffic to.
pub fn inbound_subject(map: &str) -> String {
    format!("rair.{map}.inbound")
}

/// Subject a map's notification batches are published on.
pub fn notification_subject(map: &str) -> String {
    format!("rair.{map}.notifications")
}

/// Decode one inbound payload.
///
/// # Errors
///
/// Returns the [`serde_json::Error`] for a payload that is not an
/// [`InboundMessage`].
pub fn decode_inbound(payload: &[u8]) -> Result<InboundMessage, serde_json::Error> {
    serde_json::from_slice(payload)
}

/// Encode one notification batch.
///
/// # Errors
///
/// Returns the [`serde_json::Error`] if a notification does not serialize.
pub fn encode_batch(batch: &[Notification]) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(batch)
}

/// Subscribe to a map's inbound subject.
///
/// # Errors
///
/// Returns [`EngineError::NatsSubscribe`] naming the subject.
pub async fn subscribe_inbound(
    client: &async_nats::Client,
    map: &str,
) -> Result<async_nats::Subscriber, EngineError> {
    let subject = inbound_subject(map);
    client
        .subscribe(subject.clone())
        .await
        .map_err(|source| EngineError::NatsSubscribe { subject, source })
}

/// Forward decoded messages from `subscriber` until it closes or the
/// router goes away. Malformed payloads are logged and skipped.
///
/// Returns the number of messages forwarded.
pub async fn pump_inbound(
    mut subscriber: async_nats::Subscriber,
    map: String,
    router: mpsc::Sender<InboundMessage>,
) -> u64 {
    let mut forwarded: u64 = 0;
    while let Some(msg) = subscriber.next().await {
        match decode_inbound(&msg.payload) {
            Ok(message) => {
                if router.send(message).await.is_err() {
                    break;
                }
                forwarded = forwarded.saturating_add(1);
            }
            Err(e) => {
                warn!(map = %map, subject = %msg.subject, error = %e, "Malformed inbound message");
            }
        }
    }
    debug!(map = %map, forwarded, "Inbound pump stopped");
    forwarded
}

/// Publish every batch from `batches` until the world drops its sink.
///
/// Returns the number of batches published.
pub async fn publish_notifications(
    client: async_nats::Client,
    map: String,
    mut batches: mpsc::Receiver<Vec<Notification>>,
) -> u64 {
    let subject = notification_subject(&map);
    let mut published: u64 = 0;
    while let Some(batch) = batches.recv().await {
        let payload = match encode_batch(&batch) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(map = %map, error = %e, "Failed to encode notification batch");
                continue;
            }
        };
        if let Err(e) = client.publish(subject.clone(), payload.into()).await {
            warn!(map = %map, subject = %subject, error = %e, "Failed to publish notifications");
            continue;
        }
        published = published.saturating_add(1);
    }
    if let Err(e) = client.flush().await {
        warn!(map = %map, error = %e, "Failed to flush NATS");
    }
    debug!(map = %map, published, "Notification publisher stopped");
    published
}
