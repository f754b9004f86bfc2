//! Durable append-only log storage

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::config::LogLevel;
use crate::Result;

/// A single structured log event produced by a job (or the orchestrator
/// itself) during a dispatch.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LogRecord {
    pub logger_name: String,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LogRecord {
    pub fn new(logger_name: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            logger_name: logger_name.into(),
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

fn level_str(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "Debug",
        LogLevel::Info => "Info",
        LogLevel::Error => "Error",
    }
}

fn level_from_str(s: &str) -> LogLevel {
    match s {
        "Debug" => LogLevel::Debug,
        "Error" => LogLevel::Error,
        _ => LogLevel::Info,
    }
}

/// Append-only log storage, pruned by age.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn add(&self, record: &LogRecord) -> Result<()>;
    async fn delete_before(&self, ts: DateTime<Utc>) -> Result<u64>;
}

pub struct SqliteLogStore {
    pool: SqlitePool,
}

impl SqliteLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogStore for SqliteLogStore {
    async fn add(&self, record: &LogRecord) -> Result<()> {
        sqlx::query("INSERT INTO log (name, level, ts, message) VALUES (?, ?, ?, ?)")
            .bind(&record.logger_name)
            .bind(level_str(record.level))
            .bind(record.timestamp.to_rfc3339())
            .bind(&record.message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_before(&self, ts: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM log WHERE ts < ?")
            .bind(ts.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::migrate::Migrator::new(pool.clone())
            .migrate()
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn add_and_prune_round_trip() {
        let store = SqliteLogStore::new(pool().await);
        let old = LogRecord {
            logger_name: "nightly_sync".into(),
            level: LogLevel::Info,
            message: "starting".into(),
            timestamp: Utc::now() - chrono::Duration::days(10),
        };
        let fresh = LogRecord::new("nightly_sync", LogLevel::Info, "done");

        store.add(&old).await.unwrap();
        store.add(&fresh).await.unwrap();

        let deleted = store
            .delete_before(Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
    }

    #[test]
    fn level_round_trips_through_str() {
        for level in [LogLevel::Debug, LogLevel::Info, LogLevel::Error] {
            assert_eq!(level_from_str(level_str(level)), level);
        }
    }
}
