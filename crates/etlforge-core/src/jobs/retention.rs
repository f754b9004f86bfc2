//! The built-in `delete_old_log_entries` retention job
//!
//! Registered by the Supervisor at startup alongside the embedding
//! application's own catalog entries. Runs through the same dispatch
//! mechanism as any other job (re-exec'd child, NDJSON result), which
//! keeps it subject to the same timeout and status-row bookkeeping.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use super::catalog::{Job, RunResult};
use super::schedule::ScheduleSpec;
use crate::error::JobFailure;

pub const RETENTION_JOB_NAME: &str = "delete_old_log_entries";

/// Build the retention job. `db_uri` and `retention_days` are captured
/// in the job's config so the re-exec'd child can open its own
/// connection without depending on parent-process state.
pub fn build(db_uri: &str, retention_days: u32) -> Job {
    Job::builder(RETENTION_JOB_NAME, run())
        .timeout_seconds(120)
        .retries(1)
        .schedule(ScheduleSpec::daily())
        .config(json!({ "db_uri": db_uri, "retention_days": retention_days }))
        .build()
}

fn run() -> super::catalog::RunFn {
    Arc::new(|config, logger| -> RunResult {
        let db_uri = config
            .get("db_uri")
            .and_then(|v| v.as_str())
            .ok_or_else(|| JobFailure::new("ConfigError", "retention job missing db_uri"))?
            .to_string();
        let retention_days = config
            .get("retention_days")
            .and_then(|v| v.as_u64())
            .unwrap_or(3);

        // This closure runs inside the child binary's own `#[tokio::main]`
        // runtime (see `run_in_child`), so we can't build and block_on a
        // second runtime on this thread — Tokio forbids nesting runtimes
        // on the same thread. A scoped thread gives the nested
        // current-thread runtime a thread of its own while still letting
        // us borrow `logger` without requiring `'static`.
        std::thread::scope(|scope| {
            scope
                .spawn(move || {
                    let runtime = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .map_err(|e| JobFailure::new("RuntimeError", e.to_string()))?;

                    runtime.block_on(async move {
                        let pool = crate::db::connect(&db_uri)
                            .await
                            .map_err(|e| JobFailure::new("DatabaseError", e.to_string()))?;

                        let status_store =
                            crate::jobs::status_store::SqliteStatusStore::new(pool.clone());
                        let log_store = crate::jobs::log_store::SqliteLogStore::new(pool);

                        let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);

                        use crate::jobs::log_store::LogStore;
                        use crate::jobs::status_store::StatusStore;

                        let history_deleted = status_store
                            .delete_before(cutoff)
                            .await
                            .map_err(|e| JobFailure::new("DatabaseError", e.to_string()))?;
                        let log_deleted = log_store
                            .delete_before(cutoff)
                            .await
                            .map_err(|e| JobFailure::new("DatabaseError", e.to_string()))?;

                        logger.info(format!(
                            "pruned {history_deleted} history rows and {log_deleted} log rows older than {retention_days} days"
                        ));

                        Ok(())
                    })
                })
                .join()
                .unwrap_or_else(|_| Err(JobFailure::new("Panic", "retention thread panicked")))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_produces_a_daily_scheduled_job() {
        let job = build("sqlite://./etlforge.db", 3);
        assert_eq!(job.name, RETENTION_JOB_NAME);
        assert_eq!(job.schedule.len(), 1);
        assert_eq!(job.config["retention_days"], 3);
    }
}
