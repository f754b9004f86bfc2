//! Durable per-job state: the scheduler's memory across restarts

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::{Error, Result};

/// Terminal or in-flight state of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum JobState {
    Running,
    Success,
    Error,
    Skipped,
}

impl JobState {
    fn as_str(self) -> &'static str {
        match self {
            JobState::Running => "Running",
            JobState::Success => "Success",
            JobState::Error => "Error",
            JobState::Skipped => "Skipped",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "Running" => Ok(JobState::Running),
            "Success" => Ok(JobState::Success),
            "Error" => Ok(JobState::Error),
            "Skipped" => Ok(JobState::Skipped),
            other => Err(Error::infrastructure(format!("unknown job state {other}"))),
        }
    }
}

/// The current (or, in the history table, a historical) state of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub job_name: String,
    pub state: JobState,
    pub started: DateTime<Utc>,
    pub ended: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub skipped_reason: Option<String>,
}

/// Persists per-job latest state and history.
///
/// All mutations are transactional. Concurrent workers operating on
/// different job names never conflict; the job queue's dedup-by-name
/// guarantee means concurrent mutation of the same name should not
/// occur, but last-writer-wins is acceptable if it does.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Upsert the current-status row to `Running`, returning the row's
    /// identity for the subsequent terminal update.
    async fn start(&self, name: &str) -> Result<i64>;

    async fn done(&self, id: i64) -> Result<()>;
    async fn error(&self, id: i64, message: &str) -> Result<()>;
    async fn skipped(&self, id: i64, reason: &str) -> Result<()>;

    async fn status(&self, name: &str) -> Result<Option<JobStatus>>;
    async fn latest_completed_time(&self, name: &str) -> Result<Option<DateTime<Utc>>>;

    async fn delete_before(&self, ts: DateTime<Utc>) -> Result<u64>;
    async fn delete_orphans(&self, known_names: &[String]) -> Result<u64>;
    async fn clear_running(&self) -> Result<u64>;
}

pub struct SqliteStatusStore {
    pool: SqlitePool,
}

impl SqliteStatusStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn terminate(
        &self,
        id: i64,
        state: JobState,
        error_message: Option<&str>,
        skipped_reason: Option<&str>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT job_name, started FROM status WHERE rowid = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::infrastructure(format!("no status row with id {id}")))?;

        let job_name: String = row.get("job_name");
        let started: String = row.get("started");
        let ended = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE status SET status = ?, ended = ?, error_message = ?, skipped_reason = ? WHERE rowid = ?",
        )
        .bind(state.as_str())
        .bind(&ended)
        .bind(error_message)
        .bind(skipped_reason)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO job_history (job_name, status, started, ended, error_message, skipped_reason) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&job_name)
        .bind(state.as_str())
        .bind(&started)
        .bind(&ended)
        .bind(error_message)
        .bind(skipped_reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl StatusStore for SqliteStatusStore {
    async fn start(&self, name: &str) -> Result<i64> {
        // Delete-then-insert rather than an upsert: an `ON CONFLICT ...
        // DO UPDATE` would rewrite the existing row in place and keep
        // its rowid, which defeats the whole point of addressing
        // terminal updates by id — a stale `done`/`error` from a
        // previous dispatch would then land on the *new* dispatch's
        // row. Deleting and reinserting forces SQLite to mint a fresh
        // rowid every time.
        let mut tx = self.pool.begin().await?;
        let started = Utc::now().to_rfc3339();

        sqlx::query("DELETE FROM status WHERE job_name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        let id = sqlx::query(
            "INSERT INTO status (job_name, status, started, ended, error_message, skipped_reason) VALUES (?, 'Running', ?, NULL, NULL, NULL)",
        )
        .bind(name)
        .bind(&started)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;
        Ok(id)
    }

    async fn done(&self, id: i64) -> Result<()> {
        self.terminate(id, JobState::Success, None, None).await
    }

    async fn error(&self, id: i64, message: &str) -> Result<()> {
        self.terminate(id, JobState::Error, Some(message), None).await
    }

    async fn skipped(&self, id: i64, reason: &str) -> Result<()> {
        self.terminate(id, JobState::Skipped, None, Some(reason)).await
    }

    async fn status(&self, name: &str) -> Result<Option<JobStatus>> {
        let row = sqlx::query(
            "SELECT job_name, status, started, ended, error_message, skipped_reason FROM status WHERE job_name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let started: String = row.get("started");
        let ended: Option<String> = row.get("ended");
        let status: String = row.get("status");

        Ok(Some(JobStatus {
            job_name: row.get("job_name"),
            state: JobState::parse(&status)?,
            started: DateTime::parse_from_rfc3339(&started)
                .map_err(|e| Error::infrastructure(e.to_string()))?
                .with_timezone(&Utc),
            ended: ended
                .map(|e| DateTime::parse_from_rfc3339(&e).map(|d| d.with_timezone(&Utc)))
                .transpose()
                .map_err(|e| Error::infrastructure(e.to_string()))?,
            error_message: row.get("error_message"),
            skipped_reason: row.get("skipped_reason"),
        }))
    }

    async fn latest_completed_time(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(Option<String>,)> = sqlx::query_as(
            "SELECT MAX(ended) FROM job_history WHERE job_name = ? AND status = 'Success'",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.and_then(|(ended,)| ended)
            .map(|ended| {
                DateTime::parse_from_rfc3339(&ended)
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|e| Error::infrastructure(e.to_string()))
            })
            .transpose()
    }

    async fn delete_before(&self, ts: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM job_history WHERE ended < ?")
            .bind(ts.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_orphans(&self, known_names: &[String]) -> Result<u64> {
        if known_names.is_empty() {
            let result = sqlx::query("DELETE FROM status").execute(&self.pool).await?;
            return Ok(result.rows_affected());
        }

        let placeholders = known_names.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!("DELETE FROM status WHERE job_name NOT IN ({placeholders})");

        let mut query = sqlx::query(&sql);
        for name in known_names {
            query = query.bind(name);
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn clear_running(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM status WHERE status = 'Running'")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
