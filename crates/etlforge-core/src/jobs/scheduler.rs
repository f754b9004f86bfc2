//! Periodic scan that decides which catalog jobs are ready to run

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::catalog::{Job, JobCatalog};
use super::queue::JobQueue;
use super::schedule::is_due;
use super::status_store::{JobState, StatusStore};

/// Extra time beyond a job's own timeout before the scheduler considers
/// a `Running` row stale rather than legitimately still in flight.
const RUNNING_GRACE_SECONDS: i64 = 10;

pub struct Scheduler {
    catalog: Arc<JobCatalog>,
    status_store: Arc<dyn StatusStore>,
    queue: Arc<JobQueue>,
    scan_interval: Duration,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(
        catalog: Arc<JobCatalog>,
        status_store: Arc<dyn StatusStore>,
        queue: Arc<JobQueue>,
        scan_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            catalog,
            status_store,
            queue,
            scan_interval,
            shutdown,
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.scan_interval);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("scheduler shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.scan().await {
                        error!(error = %e, "scheduler scan failed, will retry next tick");
                    }
                }
            }
        }
    }

    async fn scan(&self) -> crate::Result<()> {
        let now = Utc::now();
        for job in self.catalog.iter() {
            if self.is_ready(job, now).await? {
                debug!(job = %job.name, "job ready, enqueuing");
                self.queue.put(job.name.clone()).await;
            }
        }
        Ok(())
    }

    /// Evaluate whether a job is ready to run: not already running (or
    /// running stale past its grace period), every dependency has
    /// completed no earlier than this job's own last run, and its
    /// schedule is due. Exposed publicly so embedding applications (and
    /// tests) can answer "would this job run right now?" without
    /// waiting for a tick.
    pub async fn is_ready(&self, job: &Job, now: chrono::DateTime<Utc>) -> crate::Result<bool> {
        let current = self.status_store.status(&job.name).await?;

        if let Some(status) = &current {
            if status.state == JobState::Running {
                let elapsed = now - status.started;
                let grace = chrono::Duration::seconds(
                    job.timeout_seconds as i64 + RUNNING_GRACE_SECONDS,
                );
                if elapsed < grace {
                    return Ok(false);
                }
            }
        }

        // Success-filtered, matching the Status Store's own definition of
        // "last completed" (`latest_completed_time`). A job's *current*
        // status row can be non-null `ended` from a prior `Error` —
        // using that instead would permanently block a job that has
        // never actually succeeded from becoming ready again.
        let last_completed = self.status_store.latest_completed_time(&job.name).await?;

        for dep in &job.dependencies {
            let dep_status = self.status_store.status(dep).await?;
            let Some(dep_status) = dep_status else {
                return Ok(false);
            };
            if dep_status.state == JobState::Running {
                return Ok(false);
            }
            if let Some(last_completed) = last_completed {
                if dep_status.ended.map_or(true, |ended| ended < last_completed) {
                    return Ok(false);
                }
            }
        }

        let due = job.schedule.iter().any(|spec| is_due(spec, last_completed, now));

        Ok(due)
    }
}
