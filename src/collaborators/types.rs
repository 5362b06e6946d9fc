use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A project as seen by the generation core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub spec_path: Option<PathBuf>,
    #[serde(default)]
    pub spec_url: Option<String>,
    pub output_path: PathBuf,
    #[serde(default)]
    pub settings: ProjectSettings,
}

/// Per-project generation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Overrides the package name derived from the API title.
    #[serde(default)]
    pub package_name: Option<String>,
    /// Settings owned by other layers, carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Project bookkeeping maintained through the status sink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectActivity {
    pub last_status: Option<String>,
    pub generation_count: u64,
    pub last_generated: Option<DateTime<Utc>>,
}

/// Where a project's API description comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecSource {
    File(PathBuf),
    Url(String),
}

impl SpecSource {
    /// Resolves the source for a project. A local path wins over a URL.
    pub fn for_project(project: &Project) -> Option<Self> {
        if let Some(path) = project
            .spec_path
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
        {
            return Some(SpecSource::File(path.clone()));
        }
        project
            .spec_url
            .as_ref()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(|u| SpecSource::Url(u.to_string()))
    }
}

/// Parsed API description handed from the parser to the mapper and generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedApi {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    pub base_url: Option<String>,
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub operation_id: String,
    pub method: String,
    pub path: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// `path`, `query`, `header`, `cookie` or `body`
    pub location: String,
    pub required: bool,
    pub schema_type: Option<String>,
}

/// A callable tool exposed by the generated server, one per operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub method: String,
    pub path: String,
    pub parameters: Vec<Parameter>,
}

/// A file written by the generator, relative to the project's output path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub file_type: String,
}

impl Artifact {
    pub const SERVER: &'static str = "server";
    pub const MANIFEST: &'static str = "manifest";
    pub const DOCUMENTATION: &'static str = "documentation";

    pub fn new(path: impl Into<PathBuf>, file_type: &str) -> Self {
        Self {
            path: path.into(),
            file_type: file_type.to_string(),
        }
    }
}
