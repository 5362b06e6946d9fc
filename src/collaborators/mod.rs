//! External collaborators of the generation core and their default adapters.
//!
//! The core only talks to the traits declared here. Each trait has one
//! bundled implementation so the binary can run end to end.

pub mod fetcher;
pub mod generator;
pub mod mapper;
pub mod openapi;
pub mod project_store;
pub mod types;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::api::job::models::JobStatus;

pub use fetcher::HttpSpecFetcher;
pub use generator::TemplateGenerator;
pub use mapper::ToolMapper;
pub use openapi::OpenApiParser;
pub use project_store::JsonProjectStore;
pub use types::{Artifact, Operation, Parameter, ParsedApi, Project, SpecSource, Tool};

/// Failures reported by collaborators.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("project not found: {0}")]
    NotFound(String),

    #[error("failed to parse specification: {0}")]
    Parse(String),

    #[error("failed to fetch specification: {0}")]
    Network(String),

    #[error("failed to map operations: {0}")]
    Mapping(String),

    #[error("code generation failed: {0}")]
    Generation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get(&self, project_id: &str) -> CollaboratorResult<Project>;
}

#[async_trait]
pub trait SpecParser: Send + Sync {
    async fn parse_from_file(&self, path: &Path) -> CollaboratorResult<ParsedApi>;

    /// Fetching must go through an SSRF-safe, size-capped fetcher.
    async fn parse_from_url(&self, url: &str) -> CollaboratorResult<ParsedApi>;
}

#[async_trait]
pub trait SpecFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> CollaboratorResult<String>;
}

#[async_trait]
pub trait Mapper: Send + Sync {
    async fn map_operations(&self, operations: &[Operation]) -> CollaboratorResult<Vec<Tool>>;
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Writes artifacts under `output_path` and reports what was written.
    async fn generate(
        &self,
        api: &ParsedApi,
        tools: &[Tool],
        package_name: &str,
        output_path: &Path,
    ) -> CollaboratorResult<Vec<Artifact>>;
}

/// Receives project-level status updates. Failures are logged by the caller
/// and never fail a job.
#[async_trait]
pub trait ProjectStatusSink: Send + Sync {
    async fn update_status(&self, project_id: &str, status: JobStatus) -> CollaboratorResult<()>;

    async fn update_generation_metadata(&self, project_id: &str) -> CollaboratorResult<()>;
}
