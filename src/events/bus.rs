use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, trace, warn};

use super::emitter::{EventBus, Notifier};
use crate::api::job::dto::{Notification, Severity};

/// A published event as seen by subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct BusMessage {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// In-process event bus over a `tokio::sync::broadcast` channel.
///
/// Late subscribers only see events published after they subscribed.
pub struct BroadcastEventBus {
    tx: broadcast::Sender<BusMessage>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }
}

impl EventBus for BroadcastEventBus {
    fn emit(&self, topic: &str, payload: serde_json::Value) {
        // No subscribers is fine.
        if self
            .tx
            .send(BusMessage {
                topic: topic.to_string(),
                payload,
            })
            .is_err()
        {
            trace!(topic, "Event dropped: no subscribers");
        }
    }
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        let Notification {
            severity,
            title,
            message,
        } = notification;
        match severity {
            Severity::Info | Severity::Success => info!(%title, "{}", message),
            Severity::Warning => warn!(%title, "{}", message),
            Severity::Error => error!(%title, "{}", message),
        }
    }
}
