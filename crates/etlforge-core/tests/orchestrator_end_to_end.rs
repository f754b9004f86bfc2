//! End-to-end scenarios against a real, file-backed SQLite database.
//!
//! These exercise the Scheduler/Status Store/Job Queue interaction
//! directly rather than spawning real child processes, since the
//! child-process re-exec path is owned by whatever binary embeds this
//! crate (see `etlforge-cli`).

use std::sync::Arc;
use std::time::Duration;

use etlforge_core::{Job, JobCatalog, JobQueue, JobState, RunResult, ScheduleSpec, SqliteStatusStore, StatusStore};
use tokio_util::sync::CancellationToken;

async fn temp_db() -> (tempfile::TempDir, sqlx::SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("etl.db");
    let uri = format!("sqlite://{}", path.display());
    let pool = etlforge_core::db::connect(&uri).await.unwrap();
    (dir, pool)
}

fn noop_run() -> etlforge_core::RunFn {
    Arc::new(|_config, _logger| -> RunResult { Ok(()) })
}

#[tokio::test]
async fn orphan_cleanup_clears_stale_and_unknown_rows() {
    let (_dir, pool) = temp_db().await;
    let store = SqliteStatusStore::new(pool);

    store.start("job_gone").await.unwrap();
    store.start("extract").await.unwrap();

    let removed_orphans = store.delete_orphans(&["extract".to_string()]).await.unwrap();
    assert_eq!(removed_orphans, 1);
    assert!(store.status("job_gone").await.unwrap().is_none());

    let cleared_running = store.clear_running().await.unwrap();
    assert_eq!(cleared_running, 1, "the surviving extract row was left Running");
    assert!(store.status("extract").await.unwrap().is_none());

    let id = store.start("extract").await.unwrap();
    store.done(id).await.unwrap();
    let status = store.status("extract").await.unwrap().unwrap();
    assert_eq!(status.state, JobState::Success);
}

#[tokio::test]
async fn dependency_monotonicity_across_scheduler_ticks() {
    let (_dir, pool) = temp_db().await;
    let store: Arc<dyn StatusStore> = Arc::new(SqliteStatusStore::new(pool));

    let catalog = Arc::new(
        JobCatalog::build(vec![
            Job::builder("extract", noop_run())
                .schedule(ScheduleSpec::every_x_seconds(1))
                .build(),
            Job::builder("report", noop_run())
                .depends_on("extract")
                .schedule(ScheduleSpec::every_x_seconds(1))
                .build(),
        ])
        .unwrap(),
    );

    let queue = Arc::new(JobQueue::new(2));
    let scheduler = etlforge_core::Scheduler::new(
        catalog.clone(),
        store.clone(),
        queue.clone(),
        Duration::from_secs(1),
        CancellationToken::new(),
    );

    // `report` depends on `extract`, which has never run: not ready yet.
    let now = chrono::Utc::now();
    let report_ready = scheduler.is_ready(catalog.get("report").unwrap(), now).await.unwrap();
    assert!(!report_ready);

    let id = store.start("extract").await.unwrap();
    store.done(id).await.unwrap();
    let extract_ended = store.status("extract").await.unwrap().unwrap().ended.unwrap();

    let now = chrono::Utc::now();
    let report_ready = scheduler.is_ready(catalog.get("report").unwrap(), now).await.unwrap();
    assert!(report_ready);

    let report_id = store.start("report").await.unwrap();
    store.done(report_id).await.unwrap();
    let report_ended = store.status("report").await.unwrap().unwrap().ended.unwrap();
    assert!(extract_ended <= report_ended);
}
