#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use codegen_jobs::collaborators::types::ProjectSettings;
use codegen_jobs::collaborators::{
    Artifact, CollaboratorError, CollaboratorResult, Generator, JsonProjectStore, Mapper,
    OpenApiParser, Operation, ParsedApi, Project, ProjectStatusSink, SpecFetcher, SpecParser,
    TemplateGenerator, Tool, ToolMapper,
};
use codegen_jobs::events::{BroadcastEventBus, TracingNotifier};
use codegen_jobs::{Collaborators, Job, JobService, JobStatus};

pub const SINGLE_OPERATION_SPEC: &str = r#"{
  "openapi": "3.0.0",
  "info": {"title": "Ping Service", "version": "1.0.0"},
  "servers": [{"url": "https://ping.example.com"}],
  "paths": {
    "/ping": {
      "get": {"operationId": "ping", "summary": "Health ping"}
    }
  }
}"#;

pub struct OfflineFetcher;

#[async_trait]
impl SpecFetcher for OfflineFetcher {
    async fn fetch(&self, url: &str) -> CollaboratorResult<String> {
        Err(CollaboratorError::Network(format!("offline: {}", url)))
    }
}

/// Blocks every parse until the test adds a permit, then delegates.
pub struct GatedParser {
    pub gate: Arc<Semaphore>,
    inner: Arc<dyn SpecParser>,
}

impl GatedParser {
    pub fn new(inner: Arc<dyn SpecParser>) -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            inner,
        }
    }
}

#[async_trait]
impl SpecParser for GatedParser {
    async fn parse_from_file(&self, path: &Path) -> CollaboratorResult<ParsedApi> {
        let _permit = self.gate.acquire().await.expect("gate closed");
        self.inner.parse_from_file(path).await
    }

    async fn parse_from_url(&self, url: &str) -> CollaboratorResult<ParsedApi> {
        let _permit = self.gate.acquire().await.expect("gate closed");
        self.inner.parse_from_url(url).await
    }
}

pub struct FailingMapper;

#[async_trait]
impl Mapper for FailingMapper {
    async fn map_operations(&self, _operations: &[Operation]) -> CollaboratorResult<Vec<Tool>> {
        Err(CollaboratorError::Mapping("unsupported parameter style".into()))
    }
}

pub struct PanickingMapper;

#[async_trait]
impl Mapper for PanickingMapper {
    async fn map_operations(&self, _operations: &[Operation]) -> CollaboratorResult<Vec<Tool>> {
        panic!("mapper invariant violated")
    }
}

/// Reports an artifact it never writes.
pub struct ForgetfulGenerator;

#[async_trait]
impl Generator for ForgetfulGenerator {
    async fn generate(
        &self,
        _api: &ParsedApi,
        _tools: &[Tool],
        _package_name: &str,
        output_path: &Path,
    ) -> CollaboratorResult<Vec<Artifact>> {
        tokio::fs::create_dir_all(output_path).await?;
        tokio::fs::write(output_path.join("server.rs"), "fn main() {}\n").await?;
        Ok(vec![
            Artifact::new("server.rs", Artifact::SERVER),
            Artifact::new("tools.json", Artifact::MANIFEST),
        ])
    }
}

pub struct BrokenSink;

#[async_trait]
impl ProjectStatusSink for BrokenSink {
    async fn update_status(&self, _project_id: &str, _status: JobStatus) -> CollaboratorResult<()> {
        Err(CollaboratorError::Io(std::io::Error::other("disk full")))
    }

    async fn update_generation_metadata(&self, _project_id: &str) -> CollaboratorResult<()> {
        Err(CollaboratorError::Io(std::io::Error::other("disk full")))
    }
}

pub struct PanickingSink;

#[async_trait]
impl ProjectStatusSink for PanickingSink {
    async fn update_status(&self, _project_id: &str, status: JobStatus) -> CollaboratorResult<()> {
        panic!("status sink exploded on {}", status)
    }

    async fn update_generation_metadata(&self, _project_id: &str) -> CollaboratorResult<()> {
        panic!("status sink exploded on metadata")
    }
}

/// Records every status; the write of `held` waits for a gate permit.
pub struct GatedSink {
    pub gate: Arc<Semaphore>,
    pub statuses: Mutex<Vec<JobStatus>>,
    held: JobStatus,
}

impl GatedSink {
    pub fn new(held: JobStatus) -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            statuses: Mutex::new(Vec::new()),
            held,
        }
    }

    pub fn recorded(&self) -> Vec<JobStatus> {
        self.statuses.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProjectStatusSink for GatedSink {
    async fn update_status(&self, _project_id: &str, status: JobStatus) -> CollaboratorResult<()> {
        if status == self.held {
            let _permit = self.gate.acquire().await.expect("gate closed");
        }
        self.statuses.lock().unwrap().push(status);
        Ok(())
    }

    async fn update_generation_metadata(&self, _project_id: &str) -> CollaboratorResult<()> {
        Ok(())
    }
}

/// Blocks generation until the test adds a permit, then delegates.
pub struct GatedGenerator {
    pub gate: Arc<Semaphore>,
    inner: Arc<dyn Generator>,
}

impl GatedGenerator {
    pub fn new(inner: Arc<dyn Generator>) -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            inner,
        }
    }
}

#[async_trait]
impl Generator for GatedGenerator {
    async fn generate(
        &self,
        api: &ParsedApi,
        tools: &[Tool],
        package_name: &str,
        output_path: &Path,
    ) -> CollaboratorResult<Vec<Artifact>> {
        let _permit = self.gate.acquire().await.expect("gate closed");
        self.inner.generate(api, tools, package_name, output_path).await
    }
}

/// Temp workspace with a spec file and three projects:
/// `proj-1` (file spec), `proj-2` (no spec), `proj-3` (file spec).
pub struct Workspace {
    pub dir: TempDir,
    pub store: Arc<JsonProjectStore>,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = dir.path().join("ping.json");
        std::fs::write(&spec, SINGLE_OPERATION_SPEC).expect("write spec");

        let project = |id: &str, spec_path: Option<PathBuf>| Project {
            id: id.to_string(),
            name: id.to_string(),
            spec_path,
            spec_url: None,
            output_path: dir.path().join("out").join(id),
            settings: ProjectSettings::default(),
        };
        let store = Arc::new(JsonProjectStore::from_projects(vec![
            project("proj-1", Some(spec.clone())),
            project("proj-2", None),
            project("proj-3", Some(spec)),
        ]));
        Self { dir, store }
    }

    pub fn parser(&self) -> Arc<dyn SpecParser> {
        Arc::new(OpenApiParser::new(Arc::new(OfflineFetcher)))
    }

    /// Real collaborators backed by this workspace
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            projects: self.store.clone(),
            parser: self.parser(),
            mapper: Arc::new(ToolMapper),
            generator: Arc::new(TemplateGenerator::new().expect("templates")),
            status_sink: self.store.clone(),
        }
    }
}

pub fn service(collaborators: Collaborators) -> (Arc<JobService>, Arc<BroadcastEventBus>) {
    let bus = Arc::new(BroadcastEventBus::new(1024));
    let service = Arc::new(JobService::new(
        collaborators,
        bus.clone(),
        Arc::new(TracingNotifier),
        "test-templates",
    ));
    (service, bus)
}

/// Poll until the job reaches `status` or panic after a few seconds
pub async fn wait_for_status(service: &JobService, job_id: &str, status: JobStatus) -> Job {
    for _ in 0..500 {
        let job = service.get(job_id).expect("job exists");
        if job.status == status {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never reached {}", job_id, status);
}
