use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use tracing::{debug, error, warn};

use crate::api::job::models::JobStatus;
use crate::collaborators::{CollaboratorResult, ProjectStatusSink};
use crate::registry::JobRegistry;

/// Forwards committed job statuses to the project status sink.
///
/// Writes for a project are serialized, and a write only goes out while the
/// job's committed status still equals the status being reported. A report
/// that lost a race against a later transition is dropped, so the last value
/// the sink sees is the job's latest status. Sink errors and panics are
/// logged and never reach the caller.
pub struct StatusReporter {
    registry: Arc<JobRegistry>,
    sink: Arc<dyn ProjectStatusSink>,
    projects: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl StatusReporter {
    pub fn new(registry: Arc<JobRegistry>, sink: Arc<dyn ProjectStatusSink>) -> Self {
        Self {
            registry,
            sink,
            projects: Mutex::new(HashMap::new()),
        }
    }

    /// Report `status` for `job_id` unless the job has moved on since.
    pub async fn report(&self, job_id: &str, project_id: &str, status: JobStatus) {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;

        match self.registry.get(job_id) {
            Ok(job) if job.status == status => {}
            Ok(job) => {
                debug!(job_id, reported = %status, current = %job.status, "Skipping stale project status");
                return;
            }
            Err(e) => {
                warn!(job_id, "Not reporting project status: {}", e);
                return;
            }
        }

        let update = self.sink.update_status(project_id, status);
        if let Some(Err(e)) = contained(project_id, "update_status", update).await {
            warn!(project_id, status = %status, "Failed to update project status: {}", e);
        }
    }

    /// Bump the project's generation counter after a completed job
    pub async fn generation_completed(&self, project_id: &str) {
        let update = self.sink.update_generation_metadata(project_id);
        if let Some(Err(e)) = contained(project_id, "update_generation_metadata", update).await {
            warn!(project_id, "Failed to update generation metadata: {}", e);
        }
    }

    fn project_lock(&self, project_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.projects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(project_id.to_string())
            .or_default()
            .clone()
    }
}

/// Runs a sink call, turning a panic into a logged `None`.
async fn contained<F>(project_id: &str, call: &str, update: F) -> Option<CollaboratorResult<()>>
where
    F: std::future::Future<Output = CollaboratorResult<()>>,
{
    match AssertUnwindSafe(update).catch_unwind().await {
        Ok(result) => Some(result),
        Err(payload) => {
            error!(project_id, call, "Status sink panicked: {}", panic_message(payload));
            None
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
