use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::api::job::dto::{
    Lifecycle, LifecycleEvent, Notification, ProgressEvent, Severity, TOPIC_PROGRESS,
};
use crate::api::job::models::Job;

/// Publishes serialized payloads under a topic. Delivery is fire-and-forget.
pub trait EventBus: Send + Sync {
    fn emit(&self, topic: &str, payload: serde_json::Value);
}

/// Shows human-facing notifications. Fire-and-forget.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Builds progress, lifecycle and notification messages from job snapshots.
#[derive(Clone)]
pub struct Emitter {
    bus: Arc<dyn EventBus>,
    notifier: Arc<dyn Notifier>,
}

impl Emitter {
    pub fn new(bus: Arc<dyn EventBus>, notifier: Arc<dyn Notifier>) -> Self {
        Self { bus, notifier }
    }

    pub fn progress(&self, job: &Job, message: impl Into<String>) {
        self.publish(
            TOPIC_PROGRESS,
            &ProgressEvent {
                job_id: job.id.clone(),
                status: job.status,
                progress: job.progress,
                step: job.current_step.clone(),
                message: message.into(),
            },
        );
    }

    pub fn lifecycle(&self, event: Lifecycle, job: &Job) {
        self.publish(
            event.topic(),
            &LifecycleEvent {
                event,
                job: job.clone(),
            },
        );
    }

    pub fn notify(&self, severity: Severity, title: impl Into<String>, message: impl Into<String>) {
        self.notifier.notify(Notification {
            severity,
            title: title.into(),
            message: message.into(),
        });
    }

    fn publish<T: Serialize>(&self, topic: &str, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => self.bus.emit(topic, value),
            Err(e) => warn!(topic, "Dropping event that failed to serialize: {}", e),
        }
    }
}
