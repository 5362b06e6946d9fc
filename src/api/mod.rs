pub mod job;
pub mod validation;
