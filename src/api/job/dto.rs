use serde::Serialize;

use super::models::{Job, JobId, JobStatus};

pub const TOPIC_PROGRESS: &str = "job.progress";
pub const TOPIC_STARTED: &str = "job.started";
pub const TOPIC_COMPLETED: &str = "job.completed";
pub const TOPIC_FAILED: &str = "job.failed";
pub const TOPIC_CANCELLED: &str = "job.cancelled";

/// Published on every transition
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: f64,
    pub step: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Started,
    Completed,
    Failed,
    Cancelled,
}

impl Lifecycle {
    pub fn topic(self) -> &'static str {
        match self {
            Lifecycle::Started => TOPIC_STARTED,
            Lifecycle::Completed => TOPIC_COMPLETED,
            Lifecycle::Failed => TOPIC_FAILED,
            Lifecycle::Cancelled => TOPIC_CANCELLED,
        }
    }
}

/// Lifecycle event carrying the full job snapshot
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    pub event: Lifecycle,
    pub job: Job,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Human-facing notification
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub severity: Severity,
    pub title: String,
    pub message: String,
}
