use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::api::job::dto::{Lifecycle, Severity};
use crate::api::job::models::{
    GeneratedFile, Job, JobError, JobResults, JobStatus, SpecComplexity, Stage, Statistics,
};
use crate::collaborators::{
    Artifact, CollaboratorError, Generator, Mapper, ParsedApi, Project, ProjectStatusSink,
    ProjectStore, SpecParser, SpecSource,
};
use crate::events::Emitter;
use crate::registry::{JobRegistry, RegistryError, Transition};

use super::status::{panic_message, StatusReporter};

const DEFAULT_PACKAGE_NAME: &str = "generated_server";

/// The collaborators a pipeline run calls into.
#[derive(Clone)]
pub struct Collaborators {
    pub projects: Arc<dyn ProjectStore>,
    pub parser: Arc<dyn SpecParser>,
    pub mapper: Arc<dyn Mapper>,
    pub generator: Arc<dyn Generator>,
    pub status_sink: Arc<dyn ProjectStatusSink>,
}

/// Why a pipeline run stopped before completing.
#[derive(Debug)]
enum Halt {
    /// The job was cancelled; its status is already terminal.
    Cancelled,
    Failed(JobError),
}

impl Halt {
    fn stage(stage: Stage) -> impl FnOnce(CollaboratorError) -> Halt {
        move |e| {
            let message = match &e {
                CollaboratorError::NotFound(id) => format!("project {} not found", id),
                other => other.to_string(),
            };
            Halt::Failed(JobError::stage(stage, message, Some(format!("{:?}", e))))
        }
    }
}

/// Drives a single job through parsing, mapping, generation and validation.
///
/// Every status change goes through the registry as one transition and is
/// published while the transition is committed, so the events of a job are
/// emitted in transition order.
pub struct Orchestrator {
    registry: Arc<JobRegistry>,
    emitter: Emitter,
    collaborators: Collaborators,
    reporter: Arc<StatusReporter>,
    template_version: String,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<JobRegistry>,
        emitter: Emitter,
        collaborators: Collaborators,
        reporter: Arc<StatusReporter>,
        template_version: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            emitter,
            collaborators,
            reporter,
            template_version: template_version.into(),
        }
    }

    /// Run `job` to a terminal state.
    ///
    /// The pipeline runs in its own task so a panic anywhere inside it is
    /// caught here and recorded as an internal error instead of leaving the
    /// job stuck in a non-terminal state. Nothing that calls into a
    /// collaborator runs outside that task unguarded.
    pub async fn drive(self: Arc<Self>, job: Job, token: CancellationToken) {
        info!(job_id = %job.id, project_id = %job.project_id, "Generation job started");

        let pipeline = tokio::spawn({
            let this = Arc::clone(&self);
            let job = job.clone();
            async move {
                this.reporter
                    .report(&job.id, &job.project_id, JobStatus::Started)
                    .await;
                this.run(&job, &token).await
            }
        });

        let outcome = match pipeline.await {
            Ok(outcome) => outcome,
            Err(join_error) => Err(Halt::Failed(trapped(join_error))),
        };

        match outcome {
            Ok(()) => {}
            Err(Halt::Cancelled) => {
                info!(job_id = %job.id, "Pipeline stopped at cancellation checkpoint");
            }
            Err(Halt::Failed(error)) => {
                if let Err(payload) = AssertUnwindSafe(self.fail(&job, error)).catch_unwind().await {
                    error!(job_id = %job.id, "Recording job failure panicked: {}", panic_message(payload));
                }
            }
        }
    }

    async fn run(&self, job: &Job, token: &CancellationToken) -> Result<(), Halt> {
        let project = self
            .collaborators
            .projects
            .get(&job.project_id)
            .await
            .map_err(Halt::stage(Stage::Parsing))?;

        let source = SpecSource::for_project(&project).ok_or_else(|| {
            Halt::Failed(JobError::stage(
                Stage::Parsing,
                "no specification supplied: project has neither spec_path nor spec_url",
                None,
            ))
        })?;

        self.enter(job, Stage::Parsing, token).await?;
        let parser = &self.collaborators.parser;
        let api = match &source {
            SpecSource::File(path) => parser.parse_from_file(path).await,
            SpecSource::Url(url) => parser.parse_from_url(url).await,
        }
        .map_err(Halt::stage(Stage::Parsing))?;
        debug!(job_id = %job.id, operations = api.operations.len(), "Specification parsed");

        self.enter(job, Stage::Mapping, token).await?;
        let tools = self
            .collaborators
            .mapper
            .map_operations(&api.operations)
            .await
            .map_err(Halt::stage(Stage::Mapping))?;

        self.enter(job, Stage::Generating, token).await?;
        let package_name = package_name(&project, &api);
        let artifacts = self
            .collaborators
            .generator
            .generate(&api, &tools, &package_name, &project.output_path)
            .await
            .map_err(Halt::stage(Stage::Generating))?;

        self.enter(job, Stage::Validating, token).await?;
        let generated_files = inspect_artifacts(&project.output_path, &artifacts)
            .await
            .map_err(|message| Halt::Failed(JobError::stage(Stage::Validating, message, None)))?;
        let server_path = artifacts
            .iter()
            .find(|a| a.file_type == Artifact::SERVER)
            .map(|a| project.output_path.join(&a.path))
            .unwrap_or_else(|| project.output_path.clone());

        let elapsed = Utc::now() - job.start_time;
        let results = JobResults {
            server_path,
            generated_files,
            statistics: Statistics {
                total_endpoints: api.operations.len(),
                generated_tools: tools.len(),
                processing_time: elapsed.num_milliseconds().max(0) as f64 / 1000.0,
                spec_complexity: SpecComplexity::from_endpoints(api.operations.len()),
                template_version: self.template_version.clone(),
            },
            tools,
        };

        if token.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        self.complete(job, results).await
    }

    /// Cancellation checkpoint followed by the stage's transition
    async fn enter(&self, job: &Job, stage: Stage, token: &CancellationToken) -> Result<(), Halt> {
        if token.is_cancelled() {
            return Err(Halt::Cancelled);
        }

        let message = format!("Starting {} stage", stage);
        self.commit(&job.id, Transition::Advance(stage), |job| {
            self.emitter.progress(job, message);
        })?;
        info!(job_id = %job.id, stage = %stage, "Entered stage");

        self.reporter
            .report(&job.id, &job.project_id, stage.status())
            .await;
        Ok(())
    }

    async fn complete(&self, job: &Job, results: JobResults) -> Result<(), Halt> {
        let completed = self.commit(&job.id, Transition::Complete(results), |job| {
            self.emitter.progress(job, "Generation completed");
            self.emitter.lifecycle(Lifecycle::Completed, job);
            let tools = job
                .results
                .as_ref()
                .map(|r| r.statistics.generated_tools)
                .unwrap_or(0);
            self.emitter.notify(
                Severity::Success,
                "Generation completed",
                format!("Generated {} tools for project {}", tools, job.project_id),
            );
        })?;
        info!(job_id = %completed.id, project_id = %completed.project_id, "Generation job completed");

        self.reporter
            .report(&job.id, &job.project_id, JobStatus::Completed)
            .await;
        self.reporter.generation_completed(&job.project_id).await;
        Ok(())
    }

    async fn fail(&self, job: &Job, error: JobError) {
        error!(
            job_id = %job.id,
            project_id = %job.project_id,
            kind = ?error.kind,
            "Generation job failed: {}",
            error.message
        );

        let message = error.message.clone();
        let committed = self.registry.transition_with(&job.id, Transition::Fail(error), |job| {
            self.emitter.progress(job, message.clone());
            self.emitter.lifecycle(Lifecycle::Failed, job);
            self.emitter.notify(Severity::Error, "Generation failed", message.clone());
        });

        match committed {
            Ok(_) => {
                self.reporter
                    .report(&job.id, &job.project_id, JobStatus::Failed)
                    .await
            }
            Err(RegistryError::InvalidState { source, .. }) => {
                // cancelled while the failing stage was running
                info!(job_id = %job.id, "Failure not recorded: {}", source);
            }
            Err(e) => error!(job_id = %job.id, "Failed to record job failure: {}", e),
        }
    }

    /// Apply a transition; a job that went terminal underneath us was cancelled.
    fn commit(
        &self,
        job_id: &str,
        transition: Transition,
        on_commit: impl FnOnce(&Job),
    ) -> Result<Job, Halt> {
        match self.registry.transition_with(job_id, transition, on_commit) {
            Ok(job) => Ok(job),
            Err(RegistryError::InvalidState { .. })
                if self
                    .registry
                    .get(job_id)
                    .is_ok_and(|j| j.status == JobStatus::Cancelled) =>
            {
                Err(Halt::Cancelled)
            }
            Err(e) => Err(Halt::Failed(JobError::internal(
                "job state could not be updated",
                Some(e.to_string()),
            ))),
        }
    }
}

/// Package name from project settings, else derived from the API title
fn package_name(project: &Project, api: &ParsedApi) -> String {
    if let Some(name) = project
        .settings
        .package_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        return name.to_string();
    }

    let slug = api
        .title
        .to_lowercase()
        .replace(|c: char| !c.is_ascii_alphanumeric(), "_")
        .trim_matches('_')
        .to_string();
    if slug.is_empty() {
        DEFAULT_PACKAGE_NAME.to_string()
    } else {
        slug
    }
}

/// Existence check of the reported artifacts, measuring each one.
async fn inspect_artifacts(
    output_path: &Path,
    artifacts: &[Artifact],
) -> Result<Vec<GeneratedFile>, String> {
    if !artifacts.iter().any(|a| a.file_type == Artifact::SERVER) {
        return Err("generator produced no server artifact".to_string());
    }

    let mut files = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let path = output_path.join(&artifact.path);
        let missing = || format!("expected artifact {} is missing", path.display());

        let metadata = tokio::fs::metadata(&path).await.map_err(|_| missing())?;
        if !metadata.is_file() {
            return Err(missing());
        }
        let content = tokio::fs::read(&path)
            .await
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;

        files.push(GeneratedFile {
            path: path.display().to_string(),
            file_type: artifact.file_type.clone(),
            size: metadata.len(),
            lines_of_code: String::from_utf8_lossy(&content).lines().count(),
        });
    }
    Ok(files)
}

fn trapped(join_error: JoinError) -> JobError {
    if join_error.is_panic() {
        let reason = panic_message(join_error.into_panic());
        JobError::internal(
            format!("unexpected failure in generation pipeline: {}", reason),
            Some(format!("panic: {}", reason)),
        )
    } else {
        JobError::internal(
            "generation pipeline was aborted",
            Some(join_error.to_string()),
        )
    }
}
