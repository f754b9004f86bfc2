//! Re-exec target for `tests/worker_end_to_end.rs`.
//!
//! `Worker` always dispatches by spawning a fresh child process, so
//! exercising it for real (rather than only the Scheduler/Status Store
//! plumbing) needs an actual executable on the other end. This binary
//! plays that role: a small fixed catalog of jobs whose behavior is
//! driven entirely by name, built the same way `etlforge-cli`'s
//! `catalog.rs` builds its own demo catalog.

use std::sync::Arc;
use std::time::Duration;

use etlforge_core::error::JobFailure;
use etlforge_core::jobs::runner::CHILD_ATTEMPT_ENV;
use etlforge_core::{child_dispatch_args, run_in_child, Job, JobCatalog, RunResult};

fn main() {
    let args = child_dispatch_args().expect("job fixture binary only runs as a re-exec'd child dispatch");
    let catalog = build_catalog();
    run_in_child(&catalog, args);
}

fn build_catalog() -> JobCatalog {
    let jobs = vec![
        Job::builder("happy", Arc::new(|_config, logger| -> RunResult {
            logger.info("done");
            Ok(())
        }))
        .build(),
        Job::builder("always_fails", Arc::new(|_config, _logger| -> RunResult {
            Err(JobFailure::new("ValueError", "deliberate fixture failure"))
        }))
        .build(),
        Job::builder("sleeps_forever", Arc::new(|_config, _logger| -> RunResult {
            std::thread::sleep(Duration::from_secs(30));
            Ok(())
        }))
        .build(),
        Job::builder("flaky_twice", Arc::new(|_config, logger| -> RunResult {
            let attempt: u32 = std::env::var(CHILD_ATTEMPT_ENV)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            if attempt < 2 {
                logger.info(format!("attempt {attempt} failing on purpose"));
                Err(JobFailure::new("Flaky", "not ready yet"))
            } else {
                logger.info(format!("attempt {attempt} succeeding"));
                Ok(())
            }
        }))
        .build(),
    ];
    JobCatalog::build(jobs).expect("fixture catalog is valid")
}
