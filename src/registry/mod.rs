pub mod job_registry;
pub mod state_machine;

pub use job_registry::{JobRegistry, RegistryError};
pub use state_machine::{checkpoint, Transition};
