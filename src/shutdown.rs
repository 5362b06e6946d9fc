use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{error, info};

use crate::api::job::{Job, JobId, JobService};

/// Handles graceful shutdown of running generation jobs
///
/// This module orchestrates graceful shutdown by:
/// 1. Waiting for every tracked job to reach a terminal state
/// 2. Listening for shutdown signals (SIGTERM, SIGINT/CTRL+C) meanwhile
/// 3. On a signal, cancelling every non-terminal job
/// 4. Waiting for the job tasks to stop at their next checkpoint
pub struct ShutdownCoordinator {
    service: Arc<JobService>,
    job_ids: Vec<JobId>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new(service: Arc<JobService>, job_ids: Vec<JobId>) -> Self {
        Self { service, job_ids }
    }

    /// Wait for all jobs, cancelling them if a shutdown signal arrives first
    ///
    /// Returns the final snapshot of every job that could still be read.
    pub async fn run(self) -> Vec<Job> {
        let service = Arc::clone(&self.service);
        let finished = join_all(self.job_ids.iter().map(|id| service.wait(id)));
        tokio::pin!(finished);

        let results = tokio::select! {
            results = &mut finished => results,
            _ = shutdown_signal() => {
                info!("Cancelling running jobs...");
                let cancelled = self.service.cancel_all().await;
                info!("Cancelled {} jobs, waiting for them to stop", cancelled);
                finished.await
            }
        };

        results
            .into_iter()
            .filter_map(|result| match result {
                Ok(job) => Some(job),
                Err(e) => {
                    error!("Failed to read job after shutdown: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// Resolves on CTRL+C or SIGTERM (Unix only)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install CTRL+C signal handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal, initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM signal, initiating graceful shutdown...");
        }
    }
}
