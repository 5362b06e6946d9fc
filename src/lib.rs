//! Background engine that turns an API description into generated server code.
//!
//! [`JobService`] is the entry point: `start` registers a job and hands it to
//! an [`Orchestrator`](worker::Orchestrator) task, `get`/`list` read committed
//! job state from the [`JobRegistry`](registry::JobRegistry), and `cancel`
//! requests cooperative cancellation.

pub mod api;
pub mod collaborators;
pub mod config;
pub mod events;
pub mod registry;
pub mod shutdown;
pub mod worker;

pub use api::job::dto;
pub use api::job::models::{
    ErrorKind, GeneratedFile, Job, JobError, JobId, JobResults, JobStatus, Stage, Statistics,
};
pub use api::job::{JobService, ServiceError};
pub use worker::Collaborators;
