pub mod dto;
pub mod models;
pub mod service;

// Re-export commonly used types
pub use models::{Job, JobId, JobStatus};
pub use service::{JobService, ServiceError};
