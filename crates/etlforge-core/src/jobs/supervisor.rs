//! Entry point: wires the Status Store, Log Store, Log Pipeline, Job
//! Queue, Scheduler, and Worker pool together and owns their lifecycle.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::catalog::{Job, JobCatalog};
use super::log_pipeline::LogPipeline;
use super::log_store::{LogStore, SqliteLogStore};
use super::queue::JobQueue;
use super::retention;
use super::scheduler::Scheduler;
use super::status_store::{SqliteStatusStore, StatusStore};
use super::worker::Worker;
use crate::config::Config;
use crate::{Error, Result};

/// Runs the orchestrator until a fatal error or an external shutdown
/// signal (`shutdown`) is observed.
pub struct Supervisor {
    config: Config,
    catalog: Arc<JobCatalog>,
    status_store: Arc<dyn StatusStore>,
    log_store: Arc<dyn LogStore>,
    config_path: Option<String>,
}

impl Supervisor {
    /// Validate the catalog, connect to the store, and register the
    /// built-in retention job.
    pub async fn build(
        config: Config,
        jobs: Vec<Job>,
        config_path: Option<String>,
    ) -> Result<Self> {
        let mut jobs = jobs;
        jobs.push(retention::build(&config.db_uri, config.days_logs_to_keep));

        let catalog = JobCatalog::build(jobs)?;
        let catalog = Arc::new(catalog);

        let pool = crate::db::connect(&config.db_uri).await?;
        let status_store: Arc<dyn StatusStore> = Arc::new(SqliteStatusStore::new(pool.clone()));
        let log_store: Arc<dyn LogStore> = Arc::new(SqliteLogStore::new(pool));

        Ok(Self {
            config,
            catalog,
            status_store,
            log_store,
            config_path,
        })
    }

    /// Remove status rows for job names no longer in the catalog and
    /// clear any `Running` rows left by a prior crash. Must run before
    /// the scheduler begins scanning.
    async fn cleanup_orphans(&self) -> Result<()> {
        let known_names: Vec<String> = self.catalog.names().map(String::from).collect();
        let removed_orphans = self.status_store.delete_orphans(&known_names).await?;
        let cleared_running = self.status_store.clear_running().await?;
        info!(removed_orphans, cleared_running, "startup cleanup complete");
        Ok(())
    }

    /// Run until `shutdown` is cancelled. Workers finish their current
    /// attempt before exiting; queued-but-unstarted work is discarded.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        self.cleanup_orphans().await?;

        let (log_pipeline, log_writer) =
            LogPipeline::new(self.config.log_level, self.log_store.clone());
        let log_writer_handle = tokio::spawn(log_writer.run());

        let queue = Arc::new(JobQueue::new(self.config.max_workers));

        let scheduler = Scheduler::new(
            self.catalog.clone(),
            self.status_store.clone(),
            queue.clone(),
            Duration::from_secs(self.config.scan_interval_seconds),
            shutdown.clone(),
        );
        let scheduler_handle = tokio::spawn(scheduler.run());

        let mut worker_handles = Vec::with_capacity(self.config.max_workers);
        for id in 0..self.config.max_workers {
            let worker = Worker::new(
                id,
                self.catalog.clone(),
                queue.clone(),
                self.status_store.clone(),
                log_pipeline.clone(),
                self.config_path.clone(),
                shutdown.clone(),
            );
            worker_handles.push(tokio::spawn(worker.run()));
        }

        info!(workers = self.config.max_workers, "supervisor running");

        shutdown.cancelled().await;
        info!("shutdown signal received, draining workers");

        scheduler_handle
            .await
            .map_err(|e| Error::infrastructure(format!("scheduler task panicked: {e}")))?;

        for handle in worker_handles {
            handle
                .await
                .map_err(|e| Error::infrastructure(format!("worker task panicked: {e}")))?;
        }

        drop(log_pipeline);
        log_writer_handle
            .await
            .map_err(|e| Error::infrastructure(format!("log writer task panicked: {e}")))?;

        info!("supervisor shut down cleanly");
        Ok(())
    }
}
