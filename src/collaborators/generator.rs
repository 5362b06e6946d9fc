use std::path::Path;

use async_trait::async_trait;
use minijinja::{context, Environment};
use serde::Serialize;
use tracing::{debug, info};

use super::types::{Artifact, ParsedApi, Tool};
use super::{CollaboratorError, CollaboratorResult, Generator};

const SERVER_FILE: &str = "server.rs";
const MANIFEST_FILE: &str = "tools.json";
const README_FILE: &str = "README.md";

const SERVER_TEMPLATE: &str = r#"//! {{ package_name }}: tool server for {{ title }} {{ version }}.
//! Generated code, regenerate instead of editing.

pub const BASE_URL: &str = {{ base_url }};

pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub method: &'static str,
    pub path: &'static str,
    pub parameters: &'static [&'static str],
}

pub const TOOLS: &[ToolSpec] = &[
{%- for tool in tools %}
    ToolSpec {
        name: {{ tool.name }},
        description: {{ tool.description }},
        method: {{ tool.method }},
        path: {{ tool.path }},
        parameters: &[{% for p in tool.parameters %}{{ p }}{% if not loop.last %}, {% endif %}{% endfor %}],
    },
{%- endfor %}
];

pub fn find_tool(name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|t| t.name == name)
}

/// Expands path placeholders and prefixes the base URL.
pub fn request_url(tool: &ToolSpec, args: &[(&str, &str)]) -> String {
    let mut path = tool.path.to_string();
    for (key, value) in args {
        let placeholder = String::from("{") + key + "}";
        path = path.replace(&placeholder, value);
    }
    format!("{}{}", BASE_URL, path)
}
"#;

const README_TEMPLATE: &str = r#"# {{ package_name }}

Tool server generated from **{{ title }}** (version {{ version }}).
{% if description %}
{{ description }}
{% endif %}
## Tools

| Tool | Method | Path | Description |
|------|--------|------|-------------|
{% for tool in tools -%}
| `{{ tool.name }}` | {{ tool.method }} | `{{ tool.path }}` | {{ tool.description }} |
{% endfor %}"#;

/// Tool fields pre-escaped as Rust string literals.
#[derive(Serialize)]
struct ToolLiteral {
    name: String,
    description: String,
    method: String,
    path: String,
    parameters: Vec<String>,
}

impl From<&Tool> for ToolLiteral {
    fn from(tool: &Tool) -> Self {
        Self {
            name: format!("{:?}", tool.name),
            description: format!("{:?}", tool.description),
            method: format!("{:?}", tool.method),
            path: format!("{:?}", tool.path),
            parameters: tool
                .parameters
                .iter()
                .map(|p| format!("{:?}", p.name))
                .collect(),
        }
    }
}

/// Renders the server module, tool manifest and README with minijinja.
pub struct TemplateGenerator {
    env: Environment<'static>,
}

impl TemplateGenerator {
    pub fn new() -> CollaboratorResult<Self> {
        let mut env = Environment::new();
        env.add_template(SERVER_FILE, SERVER_TEMPLATE)
            .map_err(template_error)?;
        env.add_template(README_FILE, README_TEMPLATE)
            .map_err(template_error)?;
        Ok(Self { env })
    }

    fn render_server(
        &self,
        api: &ParsedApi,
        tools: &[Tool],
        package_name: &str,
    ) -> CollaboratorResult<String> {
        let literals: Vec<ToolLiteral> = tools.iter().map(ToolLiteral::from).collect();
        let base_url = api.base_url.clone().unwrap_or_default();
        self.env
            .get_template(SERVER_FILE)
            .and_then(|t| {
                t.render(context! {
                    package_name => package_name,
                    title => &api.title,
                    version => &api.version,
                    base_url => format!("{:?}", base_url),
                    tools => literals,
                })
            })
            .map_err(template_error)
    }

    fn render_readme(
        &self,
        api: &ParsedApi,
        tools: &[Tool],
        package_name: &str,
    ) -> CollaboratorResult<String> {
        self.env
            .get_template(README_FILE)
            .and_then(|t| {
                t.render(context! {
                    package_name => package_name,
                    title => &api.title,
                    version => &api.version,
                    description => &api.description,
                    tools => tools,
                })
            })
            .map_err(template_error)
    }
}

fn template_error(e: minijinja::Error) -> CollaboratorError {
    CollaboratorError::Generation(format!("template error: {}", e))
}

async fn write_artifact(output_path: &Path, name: &str, content: &str) -> CollaboratorResult<()> {
    let target = output_path.join(name);
    tokio::fs::write(&target, content).await.map_err(|e| {
        CollaboratorError::Generation(format!("cannot write {}: {}", target.display(), e))
    })?;
    debug!("Wrote {} ({} bytes)", target.display(), content.len());
    Ok(())
}

#[async_trait]
impl Generator for TemplateGenerator {
    async fn generate(
        &self,
        api: &ParsedApi,
        tools: &[Tool],
        package_name: &str,
        output_path: &Path,
    ) -> CollaboratorResult<Vec<Artifact>> {
        let server = self.render_server(api, tools, package_name)?;
        let readme = self.render_readme(api, tools, package_name)?;
        let manifest = serde_json::to_string_pretty(&serde_json::json!({
            "package": package_name,
            "api": { "title": api.title, "version": api.version },
            "tools": tools,
        }))
        .map_err(|e| CollaboratorError::Generation(e.to_string()))?;

        tokio::fs::create_dir_all(output_path).await.map_err(|e| {
            CollaboratorError::Generation(format!(
                "cannot create output directory {}: {}",
                output_path.display(),
                e
            ))
        })?;

        write_artifact(output_path, SERVER_FILE, &server).await?;
        write_artifact(output_path, MANIFEST_FILE, &manifest).await?;
        write_artifact(output_path, README_FILE, &readme).await?;

        info!(
            "Generated {} tools for {} into {}",
            tools.len(),
            package_name,
            output_path.display()
        );

        Ok(vec![
            Artifact::new(SERVER_FILE, Artifact::SERVER),
            Artifact::new(MANIFEST_FILE, Artifact::MANIFEST),
            Artifact::new(README_FILE, Artifact::DOCUMENTATION),
        ])
    }
}
