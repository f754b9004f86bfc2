//! Worker pool: one task per pool slot, each looping `take -> dispatch`

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::catalog::JobCatalog;
use super::log_pipeline::LogPipeline;
use super::queue::JobQueue;
use super::runner::{ChildMessage, TerminalResult, CHILD_ATTEMPT_ENV, CHILD_JOB_ENV};
use super::status_store::StatusStore;
use crate::error::JobFailure;
use crate::Error;

/// Identifies one worker task for log correlation.
pub type WorkerId = usize;

/// A single pool slot: takes job names from the shared queue and runs
/// them to completion, one at a time, forever (until cancelled).
pub struct Worker {
    pub id: WorkerId,
    catalog: Arc<JobCatalog>,
    queue: Arc<JobQueue>,
    status_store: Arc<dyn StatusStore>,
    log_pipeline: Arc<LogPipeline>,
    config_path: Option<String>,
    shutdown: CancellationToken,
    child_exe: Option<PathBuf>,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        catalog: Arc<JobCatalog>,
        queue: Arc<JobQueue>,
        status_store: Arc<dyn StatusStore>,
        log_pipeline: Arc<LogPipeline>,
        config_path: Option<String>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            catalog,
            queue,
            status_store,
            log_pipeline,
            config_path,
            shutdown,
            child_exe: None,
        }
    }

    /// Override the executable re-exec'd for each dispatch instead of
    /// `std::env::current_exe()`. Lets an embedding binary (or a test)
    /// point dispatch at a different executable than the one currently
    /// running, e.g. a dedicated fixture binary in integration tests.
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.child_exe = Some(path.into());
        self
    }

    /// Main loop: take a job name, dispatch it, repeat until shutdown.
    pub async fn run(self) {
        loop {
            let name = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!(worker = self.id, "shutting down, no more jobs will be taken");
                    return;
                }
                name = self.queue.take() => name,
            };

            let Some(job) = self.catalog.get(&name) else {
                warn!(worker = self.id, job = %name, "job vanished from catalog, skipping");
                continue;
            };

            if let Err(e) = self.dispatch(job).await {
                error!(worker = self.id, job = %name, error = %e, "dispatch failed");
            }
        }
    }

    /// Run one job to completion (including its internal retry budget),
    /// recording status transitions. Public so a one-shot CLI command
    /// or a test can dispatch a single job without the full take-loop.
    pub async fn dispatch(&self, job: &super::catalog::Job) -> crate::Result<()> {
        let id = self.status_store.start(&job.name).await?;
        let mut attempt = 0u32;

        loop {
            match self.attempt_once(job, attempt).await {
                Ok(()) => {
                    self.status_store.done(id).await?;
                    return Ok(());
                }
                Err(AttemptOutcome::UserError(failure)) => {
                    if attempt < job.retries {
                        attempt += 1;
                        warn!(job = %job.name, attempt, error = %failure, "retrying after user error");
                        continue;
                    }
                    self.status_store.error(id, &failure.render()).await?;
                    return Ok(());
                }
                Err(AttemptOutcome::Timeout) => {
                    let message = format!(
                        "the job, {}, timed out after {} seconds",
                        job.name, job.timeout_seconds
                    );
                    self.status_store.error(id, &message).await?;
                    return Ok(());
                }
                Err(AttemptOutcome::Infrastructure(message)) => {
                    self.status_store.error(id, &message).await?;
                    return Err(Error::infrastructure(message));
                }
            }
        }
    }

    async fn attempt_once(
        &self,
        job: &super::catalog::Job,
        attempt: u32,
    ) -> std::result::Result<(), AttemptOutcome> {
        let exe = match &self.child_exe {
            Some(path) => path.clone(),
            None => std::env::current_exe()
                .map_err(|e| AttemptOutcome::Infrastructure(format!("cannot resolve current exe: {e}")))?,
        };

        let mut command = Command::new(exe);
        command
            .env(CHILD_JOB_ENV, &job.name)
            .env(CHILD_ATTEMPT_ENV, attempt.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        if let Some(path) = &self.config_path {
            command.env("ETLFORGE_CONFIG", path);
        }

        let mut child = command
            .spawn()
            .map_err(|e| AttemptOutcome::Infrastructure(format!("failed to spawn child: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AttemptOutcome::Infrastructure("child had no stdout".to_string()))?;

        let log_pipeline = self.log_pipeline.clone();
        let reader_task = tokio::spawn(async move {
            let mut terminal = None;
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match serde_json::from_str::<ChildMessage>(&line) {
                    Ok(ChildMessage::Log(record)) => {
                        log_pipeline.forward(record).await;
                    }
                    Ok(ChildMessage::Terminal(result)) => {
                        terminal = Some(result);
                    }
                    Err(e) => {
                        warn!(error = %e, line, "unparseable child output line, ignoring");
                    }
                }
            }
            terminal
        });

        let deadline = Duration::from_secs(job.timeout_seconds);
        let wait = tokio::time::timeout(deadline, child.wait()).await;

        match wait {
            Ok(Ok(_status)) => {
                let terminal = reader_task.await.unwrap_or(None);
                match terminal {
                    Some(TerminalResult::Success) => Ok(()),
                    Some(TerminalResult::Error(failure)) => Err(AttemptOutcome::UserError(failure)),
                    None => Err(AttemptOutcome::Infrastructure(
                        "child exited without a terminal result".to_string(),
                    )),
                }
            }
            Ok(Err(e)) => Err(AttemptOutcome::Infrastructure(format!("error waiting on child: {e}"))),
            Err(_elapsed) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                reader_task.abort();
                Err(AttemptOutcome::Timeout)
            }
        }
    }
}

enum AttemptOutcome {
    UserError(JobFailure),
    Timeout,
    Infrastructure(String),
}
