//! Buffered many-producers -> one-consumer funnel from workers to the
//! Log Store
//!
//! Workers must never block on database I/O when logging a job's
//! activity, so records are handed to a bounded channel and a single
//! `LogWriter` task drains it into the store.

use std::collections::{HashMap, VecDeque};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, warn};

use super::log_store::{LogRecord, LogStore};
use crate::config::LogLevel;
use std::sync::Arc;

const CHANNEL_CAPACITY: usize = 1024;
const DEDUP_WINDOW_SECONDS: i64 = 10;
const DEDUP_HISTORY_PER_LOGGER: usize = 30;

/// Ingress side of the log pipeline: applies severity filtering and
/// per-logger throttling/dedup before handing a record to the bounded
/// channel that feeds the `LogWriter`.
pub struct LogPipeline {
    sender: mpsc::Sender<LogRecord>,
    min_level: LogLevel,
    recent: Mutex<HashMap<String, VecDeque<(String, chrono::DateTime<chrono::Utc>)>>>,
}

impl LogPipeline {
    /// Build a pipeline and its paired writer. The writer must be
    /// spawned as its own task by the caller.
    pub fn new(min_level: LogLevel, store: Arc<dyn LogStore>) -> (Arc<Self>, LogWriter) {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let pipeline = Arc::new(Self {
            sender,
            min_level,
            recent: Mutex::new(HashMap::new()),
        });
        let writer = LogWriter { receiver, store };
        (pipeline, writer)
    }

    /// Submit a record, applying severity threshold, then throttling
    /// and dedup: the last 30 distinct messages per logger retain their
    /// last-emitted timestamp, and a message identical to one emitted
    /// less than 10s ago is dropped.
    pub async fn forward(&self, record: LogRecord) {
        if record.level < self.min_level {
            return;
        }

        if self.is_throttled(&record).await {
            return;
        }

        if self.sender.try_send(record).is_err() {
            eprintln!("log pipeline full or closed, dropping record");
        }
    }

    async fn is_throttled(&self, record: &LogRecord) -> bool {
        let mut recent = self.recent.lock().await;
        let history = recent.entry(record.logger_name.clone()).or_default();

        if let Some(pos) = history.iter().position(|(msg, _)| msg == &record.message) {
            let (_, last_emitted) = history[pos];
            if record.timestamp - last_emitted < chrono::Duration::seconds(DEDUP_WINDOW_SECONDS) {
                return true;
            }
            history.remove(pos);
        }

        history.push_back((record.message.clone(), record.timestamp));
        while history.len() > DEDUP_HISTORY_PER_LOGGER {
            history.pop_front();
        }

        false
    }
}

/// Single-consumer task that drains the channel into the Log Store.
/// Store failures are reported to stderr; the loop never stops on a
/// single failed write.
pub struct LogWriter {
    receiver: mpsc::Receiver<LogRecord>,
    store: Arc<dyn LogStore>,
}

impl LogWriter {
    pub async fn run(mut self) {
        while let Some(record) = self.receiver.recv().await {
            if let Err(e) = self.store.add(&record).await {
                error!(error = %e, logger = %record.logger_name, "failed to persist log record");
            }
        }
        warn!("log pipeline closed, log writer exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::log_store::SqliteLogStore;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> Arc<dyn LogStore> {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::migrate::Migrator::new(pool.clone())
            .migrate()
            .await
            .unwrap();
        Arc::new(SqliteLogStore::new(pool))
    }

    #[tokio::test]
    async fn below_threshold_records_are_dropped() {
        let (pipeline, writer) = LogPipeline::new(LogLevel::Info, store().await);
        let handle = tokio::spawn(writer.run());

        pipeline
            .forward(LogRecord::new("job", LogLevel::Debug, "noisy"))
            .await;
        drop(pipeline);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_message_within_window_is_throttled() {
        let (pipeline, _writer) = LogPipeline::new(LogLevel::Debug, store().await);

        let now = chrono::Utc::now();
        let first = LogRecord {
            logger_name: "job".into(),
            level: LogLevel::Info,
            message: "retrying".into(),
            timestamp: now,
        };
        let second = LogRecord {
            timestamp: now + chrono::Duration::seconds(1),
            ..first.clone()
        };

        assert!(!pipeline.is_throttled(&first).await);
        assert!(pipeline.is_throttled(&second).await);
    }

    #[tokio::test]
    async fn duplicate_message_after_window_is_not_throttled() {
        let (pipeline, _writer) = LogPipeline::new(LogLevel::Debug, store().await);

        let now = chrono::Utc::now();
        let first = LogRecord {
            logger_name: "job".into(),
            level: LogLevel::Info,
            message: "retrying".into(),
            timestamp: now,
        };
        let later = LogRecord {
            timestamp: now + chrono::Duration::seconds(11),
            ..first.clone()
        };

        assert!(!pipeline.is_throttled(&first).await);
        assert!(!pipeline.is_throttled(&later).await);
    }
}
