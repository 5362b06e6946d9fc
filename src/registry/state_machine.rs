//! Legal job transitions and their progress checkpoints.
//!
//! `Started -> Parsing -> Mapping -> Generating -> Validating -> Completed`,
//! with `Failed` and `Cancelled` reachable from any non-terminal state.
//! Terminal jobs reject every transition.

use chrono::Utc;
use thiserror::Error;

use crate::api::job::models::{Job, JobError, JobResults, JobStatus, Stage};

/// A requested change to a job.
#[derive(Debug, Clone)]
pub enum Transition {
    Advance(Stage),
    Complete(JobResults),
    Fail(JobError),
    Cancel,
}

impl Transition {
    fn name(&self) -> &'static str {
        match self {
            Transition::Advance(stage) => stage.as_str(),
            Transition::Complete(_) => "complete",
            Transition::Fail(_) => "fail",
            Transition::Cancel => "cancel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot apply `{transition}` to job in status `{from}`")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub transition: &'static str,
}

/// Fixed progress value for a status, `None` for `Failed`/`Cancelled`
/// whose progress is frozen where it was.
pub fn checkpoint(status: JobStatus) -> Option<f64> {
    match status {
        JobStatus::Started => Some(0.0),
        JobStatus::Parsing => Some(0.1),
        JobStatus::Mapping => Some(0.3),
        JobStatus::Generating => Some(0.5),
        JobStatus::Validating => Some(0.8),
        JobStatus::Completed => Some(1.0),
        JobStatus::Failed | JobStatus::Cancelled => None,
    }
}

fn rank(status: JobStatus) -> u8 {
    match status {
        JobStatus::Started => 0,
        JobStatus::Parsing => 1,
        JobStatus::Mapping => 2,
        JobStatus::Generating => 3,
        JobStatus::Validating => 4,
        JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => 5,
    }
}

/// Applies `transition` to `job` in place. On error the job is untouched.
pub fn apply(job: &mut Job, transition: Transition) -> Result<(), InvalidTransition> {
    let from = job.status;
    let invalid = |t: &Transition| InvalidTransition {
        from,
        transition: t.name(),
    };

    if from.is_terminal() {
        return Err(invalid(&transition));
    }

    match transition {
        Transition::Advance(stage) => {
            let target = stage.status();
            if rank(target) != rank(job.status) + 1 {
                return Err(invalid(&transition));
            }
            job.status = target;
            job.progress = job.progress.max(checkpoint(target).unwrap_or(job.progress));
            job.current_step = stage.step_label().to_string();
        }
        Transition::Complete(results) => {
            if job.status != JobStatus::Validating {
                return Err(invalid(&Transition::Complete(results)));
            }
            job.status = JobStatus::Completed;
            job.progress = 1.0;
            job.current_step = "Completed".to_string();
            job.results = Some(results);
            job.end_time = Some(Utc::now());
        }
        Transition::Fail(error) => {
            job.status = JobStatus::Failed;
            job.current_step = "Failed".to_string();
            job.errors.push(error);
            job.end_time = Some(Utc::now());
        }
        Transition::Cancel => {
            job.status = JobStatus::Cancelled;
            job.current_step = "Cancelled".to_string();
            job.end_time = Some(Utc::now());
        }
    }
    Ok(())
}
