use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use super::types::{Operation, Tool};
use super::{CollaboratorError, CollaboratorResult, Mapper};

/// Maps each API operation to one tool with a unique snake_case name.
#[derive(Debug, Default, Clone)]
pub struct ToolMapper;

#[async_trait]
impl Mapper for ToolMapper {
    async fn map_operations(&self, operations: &[Operation]) -> CollaboratorResult<Vec<Tool>> {
        if operations.is_empty() {
            return Err(CollaboratorError::Mapping(
                "specification defines no operations".into(),
            ));
        }

        let mut seen = HashSet::new();
        let tools = operations
            .iter()
            .map(|op| {
                let base = to_snake_case(&op.operation_id);
                let base = if base.is_empty() { "operation".to_string() } else { base };
                let mut name = base.clone();
                let mut suffix = 2;
                while !seen.insert(name.clone()) {
                    name = format!("{}_{}", base, suffix);
                    suffix += 1;
                }

                let description = op
                    .summary
                    .clone()
                    .or_else(|| op.description.clone())
                    .unwrap_or_else(|| format!("{} {}", op.method, op.path));

                Tool {
                    name,
                    description,
                    method: op.method.clone(),
                    path: op.path.clone(),
                    parameters: op.parameters.clone(),
                }
            })
            .collect::<Vec<_>>();

        debug!("Mapped {} operations to tools", tools.len());
        Ok(tools)
    }
}

/// `listPets` -> `list_pets`, `get-/pets/{id}` -> `get_pets_id`
pub fn to_snake_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 4);
    let mut prev_lower = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() {
                if prev_lower && !out.ends_with('_') {
                    out.push('_');
                }
                out.push(c.to_ascii_lowercase());
                prev_lower = false;
            } else {
                out.push(c);
                prev_lower = true;
            }
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
            prev_lower = false;
        }
    }
    out.trim_end_matches('_').to_string()
}
