use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use validator::Validate;

use super::dto::{Lifecycle, Severity};
use super::models::{Job, JobId, JobStatus};
use crate::api::validation::{self, StartRequest};
use crate::events::{Emitter, EventBus, Notifier};
use crate::registry::{JobRegistry, RegistryError};
use crate::worker::{CancellationController, Collaborators, Orchestrator, StatusReporter};

type Tasks = Arc<Mutex<HashMap<JobId, JoinHandle<()>>>>;

/// Errors returned synchronously by the public job operations.
///
/// Pipeline failures never show up here; they are recorded on the job.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("project {project_id} already has an active job ({job_id})")]
    Conflict { project_id: String, job_id: JobId },

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job {job_id} is already {status}")]
    InvalidState { job_id: JobId, status: JobStatus },
}

impl ServiceError {
    fn from_registry(err: RegistryError) -> Self {
        match err {
            RegistryError::Conflict { project_id, job_id } => {
                ServiceError::Conflict { project_id, job_id }
            }
            RegistryError::NotFound(id) => ServiceError::NotFound(id),
            RegistryError::InvalidState { job_id, source } => ServiceError::InvalidState {
                job_id,
                status: source.from,
            },
        }
    }
}

/// Job service exposing `start`, `get`, `cancel` and `list`.
///
/// Owns the registry; there is no global job table. Each started job runs on
/// its own tokio task, so `start` must be called from within a runtime.
pub struct JobService {
    registry: Arc<JobRegistry>,
    emitter: Emitter,
    orchestrator: Arc<Orchestrator>,
    controller: Arc<CancellationController>,
    /// Handles of running jobs; each task removes its own entry when done.
    tasks: Tasks,
}

impl JobService {
    /// Create a new JobService instance
    pub fn new(
        collaborators: Collaborators,
        bus: Arc<dyn EventBus>,
        notifier: Arc<dyn Notifier>,
        template_version: impl Into<String>,
    ) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let emitter = Emitter::new(bus, notifier);
        let reporter = Arc::new(StatusReporter::new(
            Arc::clone(&registry),
            Arc::clone(&collaborators.status_sink),
        ));
        let controller = Arc::new(CancellationController::new(
            Arc::clone(&registry),
            emitter.clone(),
            Arc::clone(&reporter),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&registry),
            emitter.clone(),
            collaborators,
            reporter,
            template_version,
        ));
        Self {
            registry,
            emitter,
            orchestrator,
            controller,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a generation job for a project
    ///
    /// # Business Logic
    /// - Validates the project id
    /// - Registers the job, failing if the project already has an active one
    /// - Spawns the orchestrator task and returns without waiting for it
    ///
    /// # Returns
    /// - `Ok(Job)` - Initial snapshot, status `started`
    /// - `Err(ServiceError)` - `Validation` or `Conflict`
    pub fn start(&self, project_id: &str) -> Result<Job, ServiceError> {
        let request = StartRequest::new(project_id);
        if let Err(errors) = request.validate() {
            let message = validation::error_message(&errors);
            warn!("Service: Rejected start request: {}", message);
            return Err(ServiceError::Validation(message));
        }

        let job = self
            .registry
            .create_with(&request.project_id, |job| {
                self.emitter.progress(job, "Generation queued");
                self.emitter.lifecycle(Lifecycle::Started, job);
                self.emitter.notify(
                    Severity::Info,
                    "Generation started",
                    format!("Generating server code for project {}", job.project_id),
                );
            })
            .map_err(|e| {
                warn!("Service: {}", e);
                ServiceError::from_registry(e)
            })?;
        info!(job_id = %job.id, project_id = %job.project_id, "Service: Job created");

        let token = self.controller.register(&job.id);
        let orchestrator = Arc::clone(&self.orchestrator);
        let controller = Arc::clone(&self.controller);
        let tasks = Arc::clone(&self.tasks);
        let snapshot = job.clone();

        // held across the spawn so the task cannot finish before it is recorded
        let mut running = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let handle = tokio::spawn(async move {
            let job_id = job.id.clone();
            orchestrator.drive(job, token).await;
            controller.release(&job_id);
            tasks
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&job_id);
        });
        running.insert(snapshot.id.clone(), handle);
        Ok(snapshot)
    }

    pub fn get(&self, job_id: &str) -> Result<Job, ServiceError> {
        self.registry.get(job_id).map_err(ServiceError::from_registry)
    }

    /// Request cooperative cancellation of a non-terminal job
    pub async fn cancel(&self, job_id: &str) -> Result<Job, ServiceError> {
        self.controller.cancel(job_id).await.map_err(|e| {
            warn!("Service: Cancel rejected: {}", e);
            ServiceError::from_registry(e)
        })
    }

    /// All jobs of a project in creation order
    pub fn list(&self, project_id: &str) -> Vec<Job> {
        self.registry.list(project_id)
    }

    /// The project's non-terminal job, if any
    pub fn active(&self, project_id: &str) -> Option<Job> {
        self.registry.active(project_id)
    }

    /// Cancel every non-terminal job, returning how many were cancelled
    pub async fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for job_id in self.registry.active_ids() {
            match self.controller.cancel(&job_id).await {
                Ok(_) => cancelled += 1,
                // finished between listing and cancelling
                Err(RegistryError::InvalidState { .. }) => {}
                Err(e) => error!(job_id = %job_id, "Failed to cancel job: {}", e),
            }
        }
        cancelled
    }

    /// Wait until the job's task has finished and return its final snapshot
    ///
    /// Returns the current snapshot if the task has already finished.
    pub async fn wait(&self, job_id: &str) -> Result<Job, ServiceError> {
        let handle = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(job_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(job_id, "Job task ended abnormally: {}", e);
            }
        }
        self.get(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::collaborators::{
        HttpSpecFetcher, JsonProjectStore, OpenApiParser, TemplateGenerator, ToolMapper,
    };
    use crate::events::emitter::testing::Recorder;

    fn service() -> JobService {
        let store = Arc::new(JsonProjectStore::from_projects(Vec::new()));
        let fetcher = Arc::new(HttpSpecFetcher::new(1024, Duration::from_secs(1)));
        let collaborators = Collaborators {
            projects: store.clone(),
            parser: Arc::new(OpenApiParser::new(fetcher)),
            mapper: Arc::new(ToolMapper),
            generator: Arc::new(TemplateGenerator::new().unwrap()),
            status_sink: store,
        };
        let recorder = Arc::new(Recorder::default());
        JobService::new(collaborators, recorder.clone(), recorder, "test")
    }

    #[tokio::test]
    async fn test_finished_tasks_are_forgotten() {
        let service = service();
        let job = service.start("unknown-project").unwrap();

        for _ in 0..200 {
            if service.tasks.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(service.tasks.lock().unwrap().is_empty());

        let job = service.wait(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn test_registry_errors_map_to_service_errors() {
        let registry = JobRegistry::new();
        let job = registry.create("proj").unwrap();

        let conflict = ServiceError::from_registry(registry.create("proj").unwrap_err());
        assert!(matches!(conflict, ServiceError::Conflict { ref job_id, .. } if *job_id == job.id));

        registry
            .transition(&job.id, crate::registry::Transition::Cancel)
            .unwrap();
        let invalid = ServiceError::from_registry(
            registry
                .transition(&job.id, crate::registry::Transition::Cancel)
                .unwrap_err(),
        );
        assert!(matches!(
            invalid,
            ServiceError::InvalidState {
                status: JobStatus::Cancelled,
                ..
            }
        ));
        assert_eq!(
            invalid.to_string(),
            format!("job {} is already cancelled", job.id)
        );
    }
}
