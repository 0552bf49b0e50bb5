//! Outbound notification sinks.
//!
//! The world batches every notification produced during a tick and hands
//! the batch to a [`NotificationSink`] once the tick completes. Sinks
//! never block the tick: the channel sink drops batches when its consumer
//! falls behind.

use std::sync::{Arc, Mutex};

use rair_types::Notification;
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// Receives the notifications produced by a world.
pub trait NotificationSink: Send {
    /// Accept one tick's notifications.
    fn deliver(&mut self, notifications: Vec<Notification>);
}

/// Logs notifications at trace level and drops them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn deliver(&mut self, notifications: Vec<Notification>) {
        for n in notifications {
            trace!(audience = ?n.audience, event = ?n.event, "Notification");
        }
    }
}

/// Keeps every notification in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingSink {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything recorded so far.
    pub fn take(&self) -> Vec<Notification> {
        self.seen
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&mut self, notifications: Vec<Notification>) {
        if let Ok(mut guard) = self.seen.lock() {
            guard.extend(notifications);
        }
    }
}

/// Forwards each batch over a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Vec<Notification>>,
}

impl ChannelSink {
    /// A sink and the receiver its batches arrive on.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Vec<Notification>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn deliver(&mut self, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }
        match self.tx.try_send(notifications) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(batch)) => {
                warn!(dropped = batch.len(), "Notification channel full, batch dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("Notification channel closed");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rair_types::{CharacterId, MessageKind, WorldEvent};

    use super::*;

    #[test]
    fn recording_sink_shares_its_buffer() {
        let recorder = RecordingSink::new();
        let mut sink = recorder.clone();
        sink.deliver(vec![Notification::broadcast(WorldEvent::Tick { tick: 1 })]);
        assert_eq!(recorder.take().len(), 1);
        assert!(recorder.take().is_empty());
    }

    #[tokio::test]
    async fn channel_sink_forwards_batches_and_drops_when_full() {
        let (mut sink, mut rx) = ChannelSink::channel(1);
        let id = CharacterId::new();
        sink.deliver(vec![Notification::to_character(id, MessageKind::Info, "one")]);
        sink.deliver(vec![Notification::to_character(id, MessageKind::Info, "two")]);
        sink.deliver(Vec::new());
        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.first().and_then(Notification::text), Some("one"));
        assert!(rx.try_recv().is_err());
    }
}
