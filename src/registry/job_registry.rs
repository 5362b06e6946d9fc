use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::debug;

use super::state_machine::{self, InvalidTransition, Transition};
use crate::api::job::models::{Job, JobId};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("project {project_id} already has an active job ({job_id})")]
    Conflict { project_id: String, job_id: JobId },

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("invalid transition for job {job_id}: {source}")]
    InvalidState {
        job_id: JobId,
        #[source]
        source: InvalidTransition,
    },
}

#[derive(Default)]
struct Jobs {
    by_id: HashMap<JobId, Job>,
    /// Insertion order, used by `list`
    order: Vec<JobId>,
    /// project_id -> id of its single non-terminal job
    active: HashMap<String, JobId>,
}

/// In-memory store of jobs keyed by id.
///
/// Reads share the lock; every mutation, including the active-job check in
/// `create`, happens under the write lock so readers only ever see fully
/// committed jobs. No guard is held across an `.await`.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<Jobs>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a job half-written:
    // transitions are computed on a copy and swapped in.
    fn read(&self) -> RwLockReadGuard<'_, Jobs> {
        self.jobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Jobs> {
        self.jobs.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a job for `project_id` unless one is already active
    pub fn create(&self, project_id: &str) -> Result<Job, RegistryError> {
        self.create_with(project_id, |_| {})
    }

    /// Like [`create`](Self::create), running `on_commit` before the lock is
    /// released so the creation event precedes any later transition's.
    pub fn create_with(
        &self,
        project_id: &str,
        on_commit: impl FnOnce(&Job),
    ) -> Result<Job, RegistryError> {
        let mut jobs = self.write();
        if let Some(job_id) = jobs.active.get(project_id) {
            return Err(RegistryError::Conflict {
                project_id: project_id.to_string(),
                job_id: job_id.clone(),
            });
        }

        let job = Job::new(new_job_id(), project_id);
        jobs.active.insert(project_id.to_string(), job.id.clone());
        jobs.order.push(job.id.clone());
        jobs.by_id.insert(job.id.clone(), job.clone());
        on_commit(&job);
        debug!(job_id = %job.id, project_id, "Job registered");
        Ok(job)
    }

    pub fn get(&self, job_id: &str) -> Result<Job, RegistryError> {
        self.read()
            .by_id
            .get(job_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(job_id.to_string()))
    }

    /// All jobs of a project in creation order, terminal ones included
    pub fn list(&self, project_id: &str) -> Vec<Job> {
        let jobs = self.read();
        jobs.order
            .iter()
            .filter_map(|id| jobs.by_id.get(id))
            .filter(|job| job.project_id == project_id)
            .cloned()
            .collect()
    }

    /// The non-terminal job of a project, if any
    pub fn active(&self, project_id: &str) -> Option<Job> {
        let jobs = self.read();
        jobs.active
            .get(project_id)
            .and_then(|id| jobs.by_id.get(id))
            .cloned()
    }

    /// Ids of every non-terminal job
    pub fn active_ids(&self) -> Vec<JobId> {
        let jobs = self.read();
        jobs.order
            .iter()
            .filter(|id| jobs.by_id.get(*id).is_some_and(|j| !j.is_terminal()))
            .cloned()
            .collect()
    }

    /// Apply a transition as one synchronized unit and return the new snapshot
    pub fn transition(&self, job_id: &str, transition: Transition) -> Result<Job, RegistryError> {
        self.transition_with(job_id, transition, |_| {})
    }

    /// Like [`transition`](Self::transition), running `on_commit` on the new
    /// snapshot before the lock is released. Publishing from `on_commit` keeps
    /// per-job events in transition order. It must not block.
    pub fn transition_with(
        &self,
        job_id: &str,
        transition: Transition,
        on_commit: impl FnOnce(&Job),
    ) -> Result<Job, RegistryError> {
        let mut jobs = self.write();
        let current = jobs
            .by_id
            .get(job_id)
            .ok_or_else(|| RegistryError::NotFound(job_id.to_string()))?;

        let mut updated = current.clone();
        state_machine::apply(&mut updated, transition).map_err(|source| {
            RegistryError::InvalidState {
                job_id: job_id.to_string(),
                source,
            }
        })?;

        if updated.is_terminal() {
            let project_id = updated.project_id.clone();
            if jobs.active.get(&project_id).map(String::as_str) == Some(job_id) {
                jobs.active.remove(&project_id);
            }
        }
        jobs.by_id.insert(job_id.to_string(), updated.clone());
        on_commit(&updated);
        Ok(updated)
    }
}

fn new_job_id() -> JobId {
    format!("job_{}", ulid::Ulid::new().to_string().to_lowercase())
}
