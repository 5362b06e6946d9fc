use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use super::types::{Project, ProjectActivity};
use super::{CollaboratorError, CollaboratorResult, ProjectStatusSink, ProjectStore};
use crate::api::job::models::JobStatus;

struct Entry {
    project: Project,
    activity: ProjectActivity,
}

/// Project store backed by a JSON file holding an array of projects.
///
/// The file is read once; status and generation metadata are kept in memory
/// for the lifetime of the process.
pub struct JsonProjectStore {
    entries: RwLock<HashMap<String, Entry>>,
    order: Vec<String>,
}

impl JsonProjectStore {
    /// Load projects from a JSON file
    pub async fn load(path: &Path) -> CollaboratorResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let projects: Vec<Project> = serde_json::from_str(&content).map_err(|e| {
            CollaboratorError::Parse(format!("invalid projects file {}: {}", path.display(), e))
        })?;
        info!("Loaded {} projects from {}", projects.len(), path.display());
        Ok(Self::from_projects(projects))
    }

    pub fn from_projects(projects: Vec<Project>) -> Self {
        let order = projects.iter().map(|p| p.id.clone()).collect();
        let entries = projects
            .into_iter()
            .map(|project| {
                (
                    project.id.clone(),
                    Entry {
                        project,
                        activity: ProjectActivity::default(),
                    },
                )
            })
            .collect();
        Self {
            entries: RwLock::new(entries),
            order,
        }
    }

    /// All projects in file order
    pub fn list(&self) -> Vec<Project> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        self.order
            .iter()
            .filter_map(|id| entries.get(id).map(|e| e.project.clone()))
            .collect()
    }

    pub fn activity(&self, project_id: &str) -> Option<ProjectActivity> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(project_id).map(|e| e.activity.clone())
    }

    fn with_entry<T>(
        &self,
        project_id: &str,
        f: impl FnOnce(&mut Entry) -> T,
    ) -> CollaboratorResult<T> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .get_mut(project_id)
            .map(f)
            .ok_or_else(|| CollaboratorError::NotFound(project_id.to_string()))
    }
}

#[async_trait]
impl ProjectStore for JsonProjectStore {
    async fn get(&self, project_id: &str) -> CollaboratorResult<Project> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(project_id)
            .map(|e| e.project.clone())
            .ok_or_else(|| CollaboratorError::NotFound(project_id.to_string()))
    }
}

#[async_trait]
impl ProjectStatusSink for JsonProjectStore {
    async fn update_status(&self, project_id: &str, status: JobStatus) -> CollaboratorResult<()> {
        self.with_entry(project_id, |entry| {
            entry.activity.last_status = Some(status.as_str().to_string());
        })?;
        debug!(project_id, status = status.as_str(), "Project status updated");
        Ok(())
    }

    async fn update_generation_metadata(&self, project_id: &str) -> CollaboratorResult<()> {
        let count = self.with_entry(project_id, |entry| {
            entry.activity.generation_count += 1;
            entry.activity.last_generated = Some(Utc::now());
            entry.activity.generation_count
        })?;
        debug!(project_id, generation_count = count, "Project generation metadata updated");
        Ok(())
    }
}
