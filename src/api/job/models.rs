use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collaborators::types::Tool;

/// Opaque job identifier, unique for the lifetime of the process.
pub type JobId = String;

/// Job status enum representing the state of a generation job
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Started,
    Parsing,
    Mapping,
    Generating,
    Validating,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Started => "started",
            JobStatus::Parsing => "parsing",
            JobStatus::Mapping => "mapping",
            JobStatus::Generating => "generating",
            JobStatus::Validating => "validating",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pipeline phase between `Started` and `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parsing,
    Mapping,
    Generating,
    Validating,
}

impl Stage {
    pub fn status(self) -> JobStatus {
        match self {
            Stage::Parsing => JobStatus::Parsing,
            Stage::Mapping => JobStatus::Mapping,
            Stage::Generating => JobStatus::Generating,
            Stage::Validating => JobStatus::Validating,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.status().as_str()
    }

    /// Human-readable label stored in `current_step`.
    pub fn step_label(self) -> &'static str {
        match self {
            Stage::Parsing => "Parsing API specification",
            Stage::Mapping => "Mapping operations to tools",
            Stage::Generating => "Generating server code",
            Stage::Validating => "Validating generated artifacts",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A collaborator reported a failure during a stage.
    StageError,
    /// Unexpected failure trapped at the orchestrator boundary.
    InternalError,
}

/// Structured error recorded on a failed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
    /// Collaborator error text, or the diagnostic trace of an internal error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl JobError {
    pub fn stage(stage: Stage, message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            kind: ErrorKind::StageError,
            message: format!("{} stage failed: {}", stage, message.into()),
            detail,
        }
    }

    pub fn internal(message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            kind: ErrorKind::InternalError,
            message: message.into(),
            detail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub size: u64,
    pub lines_of_code: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecComplexity {
    Simple,
    Moderate,
    Complex,
}

impl SpecComplexity {
    pub fn from_endpoints(endpoints: usize) -> Self {
        match endpoints {
            0..=9 => SpecComplexity::Simple,
            10..=49 => SpecComplexity::Moderate,
            _ => SpecComplexity::Complex,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_endpoints: usize,
    pub generated_tools: usize,
    /// Seconds from job start to completion
    pub processing_time: f64,
    pub spec_complexity: SpecComplexity,
    pub template_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResults {
    pub server_path: PathBuf,
    pub generated_files: Vec<GeneratedFile>,
    pub tools: Vec<Tool>,
    pub statistics: Statistics,
}

/// One execution of the generation pipeline for a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub project_id: String,
    pub status: JobStatus,
    pub progress: f64,
    pub current_step: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub errors: Vec<JobError>,
    pub results: Option<JobResults>,
}

impl Job {
    pub fn new(id: JobId, project_id: impl Into<String>) -> Self {
        Self {
            id,
            project_id: project_id.into(),
            status: JobStatus::Started,
            progress: 0.0,
            current_step: "Queued".to_string(),
            start_time: Utc::now(),
            end_time: None,
            errors: Vec::new(),
            results: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
