use validator::{Validate, ValidationErrors};

/// Input of the `start` operation
#[derive(Debug, Validate)]
pub struct StartRequest {
    #[validate(length(
        min = 1,
        max = 128,
        message = "Project id must be between 1 and 128 characters"
    ))]
    pub project_id: String,
}

impl StartRequest {
    pub fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.trim().to_string(),
        }
    }
}

/// Flattens validator errors into one message
pub fn error_message(errors: &ValidationErrors) -> String {
    let messages: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Validation error in field: {}", field))
            })
        })
        .collect();
    messages.join("; ")
}
