pub mod cancellation;
pub mod orchestrator;
pub mod status;

pub use cancellation::CancellationController;
pub use orchestrator::{Collaborators, Orchestrator};
pub use status::StatusReporter;
