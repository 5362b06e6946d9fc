use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::job::dto::{Lifecycle, Severity};
use crate::api::job::models::{Job, JobId, JobStatus};
use crate::events::Emitter;
use crate::registry::{JobRegistry, RegistryError, Transition};

use super::status::StatusReporter;

/// Cooperative cancellation of running jobs.
///
/// `cancel` moves the job to `Cancelled` in the registry and trips the job's
/// token. The orchestrator only looks at the token between stages, so a
/// collaborator call already in flight runs to completion.
pub struct CancellationController {
    registry: Arc<JobRegistry>,
    emitter: Emitter,
    reporter: Arc<StatusReporter>,
    tokens: Mutex<HashMap<JobId, CancellationToken>>,
}

impl CancellationController {
    pub fn new(
        registry: Arc<JobRegistry>,
        emitter: Emitter,
        reporter: Arc<StatusReporter>,
    ) -> Self {
        Self {
            registry,
            emitter,
            reporter,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Create the token a new job's pipeline will observe
    pub fn register(&self, job_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id.to_string(), token.clone());
        token
    }

    /// Drop the token once the job's task is done
    pub fn release(&self, job_id: &str) {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(job_id);
    }

    pub async fn cancel(&self, job_id: &str) -> Result<Job, RegistryError> {
        let job = self
            .registry
            .transition_with(job_id, Transition::Cancel, |job| {
                self.emitter.progress(job, "Generation cancelled");
                self.emitter.lifecycle(Lifecycle::Cancelled, job);
                self.emitter.notify(
                    Severity::Warning,
                    "Generation cancelled",
                    format!("Code generation for project {} was cancelled", job.project_id),
                );
            })?;

        let token = self
            .tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(job_id)
            .cloned();
        if let Some(token) = token {
            token.cancel();
        }
        info!(job_id, project_id = %job.project_id, "Job cancelled");

        self.reporter
            .report(job_id, &job.project_id, JobStatus::Cancelled)
            .await;
        Ok(job)
    }
}
