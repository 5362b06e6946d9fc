use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use codegen_jobs::collaborators::{
    HttpSpecFetcher, JsonProjectStore, OpenApiParser, TemplateGenerator, ToolMapper,
};
use codegen_jobs::config::Config;
use codegen_jobs::dto::TOPIC_PROGRESS;
use codegen_jobs::events::{BroadcastEventBus, TracingNotifier};
use codegen_jobs::shutdown::ShutdownCoordinator;
use codegen_jobs::{Collaborators, JobService, JobStatus};

#[derive(Parser)]
#[command(name = "codegen-jobs", version, about = "Generate server code from API descriptions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a generation job for each project and wait for them to finish
    Generate {
        #[arg(required = true)]
        project_ids: Vec<String>,
    },
    /// List the configured projects
    Projects,
}

fn init_logging(log_dir: &Path) -> anyhow::Result<()> {
    // Create logs directory if it doesn't exist
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create logs directory {}", log_dir.display()))?;

    // Log files will be created as: logs/info.log.2026-10-19, logs/error.log.2026-10-19, etc.
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let info_file = tracing_appender::rolling::daily(log_dir, "info.log");
    let warn_file = tracing_appender::rolling::daily(log_dir, "warn.log");
    let error_file = tracing_appender::rolling::daily(log_dir, "error.log");
    let debug_file = tracing_appender::rolling::daily(log_dir, "debug.log");

    let info_layer = tracing_subscriber::fmt::layer()
        .with_writer(info_file)
        .with_ansi(false)
        .with_filter(LevelFilter::INFO);

    let warn_layer = tracing_subscriber::fmt::layer()
        .with_writer(warn_file)
        .with_ansi(false)
        .with_filter(LevelFilter::WARN);

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(error_file)
        .with_ansi(false)
        .with_filter(LevelFilter::ERROR);

    let debug_layer = tracing_subscriber::fmt::layer()
        .with_writer(debug_file)
        .with_ansi(false)
        .with_filter(LevelFilter::DEBUG);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(info_layer)
        .with(warn_layer)
        .with(error_layer)
        .with(debug_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

/// Log progress events until the bus is dropped
fn spawn_progress_logger(bus: &BroadcastEventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) if msg.topic == TOPIC_PROGRESS => {
                    let p = &msg.payload;
                    info!(
                        job_id = %p["job_id"].as_str().unwrap_or_default(),
                        progress = p["progress"].as_f64().unwrap_or_default(),
                        "{} - {}",
                        p["step"].as_str().unwrap_or_default(),
                        p["message"].as_str().unwrap_or_default()
                    );
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Progress log skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration from environment
    let config = Config::from_env().context("Failed to load configuration")?;
    init_logging(&config.log_dir)?;

    let store = Arc::new(JsonProjectStore::load(&config.projects_file).await?);

    let project_ids = match cli.command {
        Command::Projects => {
            for project in store.list() {
                let source = project
                    .spec_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .or(project.spec_url.clone())
                    .unwrap_or_else(|| "<no specification>".to_string());
                println!("{}\t{}\t{}", project.id, project.name, source);
            }
            return Ok(());
        }
        Command::Generate { project_ids } => project_ids,
    };

    info!("Starting codegen-jobs");
    info!("Configuration loaded successfully:");
    info!("  - Projects file: {}", config.projects_file.display());
    info!("  - Max specification size: {} bytes", config.max_spec_size);
    info!("  - Fetch timeout: {:?}", config.fetch_timeout);
    info!("  - Template version: {}", config.template_version);

    let fetcher = Arc::new(HttpSpecFetcher::new(config.max_spec_size, config.fetch_timeout));
    let collaborators = Collaborators {
        projects: store.clone(),
        parser: Arc::new(OpenApiParser::new(fetcher)),
        mapper: Arc::new(ToolMapper),
        generator: Arc::new(TemplateGenerator::new()?),
        status_sink: store.clone(),
    };

    let bus = Arc::new(BroadcastEventBus::new(config.event_channel_capacity));
    let progress_logger = spawn_progress_logger(&bus);
    let service = Arc::new(JobService::new(
        collaborators,
        bus.clone(),
        Arc::new(TracingNotifier),
        config.template_version.clone(),
    ));

    let mut job_ids = Vec::new();
    for project_id in &project_ids {
        match service.start(project_id) {
            Ok(job) => job_ids.push(job.id),
            Err(e) => error!("Could not start generation for {}: {}", project_id, e),
        }
    }

    let jobs = ShutdownCoordinator::new(Arc::clone(&service), job_ids).run().await;
    progress_logger.abort();

    let mut unsuccessful = 0;
    for job in &jobs {
        match job.status {
            JobStatus::Completed => {
                if let Some(results) = &job.results {
                    info!(
                        "{}: completed, {} files, server at {}",
                        job.project_id,
                        results.generated_files.len(),
                        results.server_path.display()
                    );
                }
            }
            status => {
                unsuccessful += 1;
                let reason = job
                    .errors
                    .first()
                    .map(|e| e.message.as_str())
                    .unwrap_or_default();
                warn!("{}: {} {}", job.project_id, status, reason);
            }
        }
    }

    if unsuccessful > 0 || jobs.len() < project_ids.len() {
        anyhow::bail!(
            "{} of {} generation jobs did not complete",
            project_ids.len() - (jobs.len() - unsuccessful),
            project_ids.len()
        );
    }
    Ok(())
}
