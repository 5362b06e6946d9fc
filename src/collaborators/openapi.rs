use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::types::{Operation, Parameter, ParsedApi};
use super::{CollaboratorError, CollaboratorResult, SpecFetcher, SpecParser};

const METHODS: [&str; 8] = ["get", "put", "post", "delete", "options", "head", "patch", "trace"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

impl Format {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Some(Format::Json),
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Some(Format::Yaml)
            }
            _ => None,
        }
    }

    fn sniff(content: &str) -> Self {
        if content.trim_start().starts_with('{') {
            Format::Json
        } else {
            Format::Yaml
        }
    }
}

/// Parser for OpenAPI 3.x and Swagger 2.0 documents in JSON or YAML.
pub struct OpenApiParser {
    fetcher: Arc<dyn SpecFetcher>,
}

impl OpenApiParser {
    pub fn new(fetcher: Arc<dyn SpecFetcher>) -> Self {
        Self { fetcher }
    }

    fn parse_document(content: &str, format: Format) -> CollaboratorResult<ParsedApi> {
        let document: Value = match format {
            Format::Json => serde_json::from_str(content)
                .map_err(|e| CollaboratorError::Parse(format!("invalid JSON: {}", e)))?,
            Format::Yaml => serde_yaml::from_str(content)
                .map_err(|e| CollaboratorError::Parse(format!("invalid YAML: {}", e)))?,
        };
        parse_value(&document)
    }
}

#[async_trait]
impl SpecParser for OpenApiParser {
    async fn parse_from_file(&self, path: &Path) -> CollaboratorResult<ParsedApi> {
        debug!("Reading specification from {}", path.display());
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            CollaboratorError::Parse(format!("cannot read {}: {}", path.display(), e))
        })?;
        let format = Format::from_path(path).unwrap_or_else(|| Format::sniff(&content));
        let api = Self::parse_document(&content, format)?;
        info!(
            "Parsed specification {} ({} operations)",
            path.display(),
            api.operations.len()
        );
        Ok(api)
    }

    async fn parse_from_url(&self, url: &str) -> CollaboratorResult<ParsedApi> {
        let content = self.fetcher.fetch(url).await?;
        let format = Format::sniff(&content);
        let api = Self::parse_document(&content, format)?;
        info!("Parsed specification {} ({} operations)", url, api.operations.len());
        Ok(api)
    }
}

/// Extracts the parts of an OpenAPI/Swagger document the pipeline needs.
pub fn parse_value(document: &Value) -> CollaboratorResult<ParsedApi> {
    let root = document
        .as_object()
        .ok_or_else(|| CollaboratorError::Parse("document root must be an object".into()))?;

    let is_swagger = root.contains_key("swagger");
    if !is_swagger && !root.contains_key("openapi") {
        return Err(CollaboratorError::Parse(
            "missing `openapi` or `swagger` version field".into(),
        ));
    }

    let paths = root
        .get("paths")
        .and_then(Value::as_object)
        .ok_or_else(|| CollaboratorError::Parse("missing `paths` object".into()))?;

    let info = root.get("info").and_then(Value::as_object);
    let title = info
        .and_then(|i| str_field(i, "title"))
        .unwrap_or("api")
        .to_string();
    // YAML turns `version: 1.0` into a number
    let version = info
        .and_then(|i| i.get("version"))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "0.0.0".to_string());
    let description = info.and_then(|i| str_field(i, "description")).map(String::from);

    let base_url = if is_swagger {
        str_field(root, "host").map(|host| {
            let base = str_field(root, "basePath").unwrap_or("");
            format!("https://{}{}", host, base)
        })
    } else {
        root.get("servers")
            .and_then(Value::as_array)
            .and_then(|servers| servers.first())
            .and_then(Value::as_object)
            .and_then(|server| str_field(server, "url"))
            .map(String::from)
    };

    let mut operations = Vec::new();
    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };
        let shared = collect_parameters(root, item.get("parameters"));

        for method in METHODS {
            let Some(op) = item.get(method).and_then(Value::as_object) else {
                continue;
            };

            let mut parameters = shared.clone();
            for param in collect_parameters(root, op.get("parameters")) {
                parameters.retain(|p| !(p.name == param.name && p.location == param.location));
                parameters.push(param);
            }
            if let Some(body) = op.get("requestBody").and_then(Value::as_object) {
                parameters.push(Parameter {
                    name: "body".into(),
                    location: "body".into(),
                    required: body.get("required").and_then(Value::as_bool).unwrap_or(false),
                    schema_type: Some("object".into()),
                });
            }

            let operation_id = str_field(op, "operationId")
                .map(String::from)
                .unwrap_or_else(|| derive_operation_id(method, path));

            operations.push(Operation {
                operation_id,
                method: method.to_uppercase(),
                path: path.clone(),
                summary: str_field(op, "summary").map(String::from),
                description: str_field(op, "description").map(String::from),
                parameters,
            });
        }
    }

    Ok(ParsedApi {
        title,
        version,
        description,
        base_url,
        operations,
    })
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

fn collect_parameters(root: &Map<String, Value>, params: Option<&Value>) -> Vec<Parameter> {
    let Some(params) = params.and_then(Value::as_array) else {
        return Vec::new();
    };
    params
        .iter()
        .filter_map(|p| resolve_ref(root, p))
        .filter_map(|p| {
            let name = str_field(p, "name")?.to_string();
            let location = str_field(p, "in").unwrap_or("query").to_string();
            let schema_type = p
                .get("schema")
                .and_then(Value::as_object)
                .and_then(|s| str_field(s, "type"))
                .or_else(|| str_field(p, "type"))
                .map(String::from);
            Some(Parameter {
                required: location == "path"
                    || p.get("required").and_then(Value::as_bool).unwrap_or(false),
                name,
                location,
                schema_type,
            })
        })
        .collect()
}

/// Follows a local `#/...` reference; anything else is returned as is.
fn resolve_ref<'a>(root: &'a Map<String, Value>, value: &'a Value) -> Option<&'a Map<String, Value>> {
    let obj = value.as_object()?;
    let Some(reference) = str_field(obj, "$ref") else {
        return Some(obj);
    };
    let pointer = reference.strip_prefix('#')?;
    let mut current = root.get(pointer.trim_start_matches('/').split('/').next()?)?;
    for segment in pointer.trim_start_matches('/').split('/').skip(1) {
        current = current.get(segment)?;
    }
    current.as_object()
}

fn derive_operation_id(method: &str, path: &str) -> String {
    let mut id = method.to_string();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let segment = segment.trim_start_matches('{').trim_end_matches('}');
        id.push('_');
        id.push_str(segment);
    }
    id
}
