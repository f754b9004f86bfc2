//! The job catalog this binary registers with the orchestrator
//!
//! In a real deployment this module would be the application-specific
//! part: whoever embeds etlforge writes their own run-functions here.
//! This one ships a couple of illustrative jobs so the binary is
//! runnable out of the box.

use std::sync::Arc;

use etlforge_core::{Job, JobCatalog, RunResult, ScheduleSpec};
use serde_json::json;

/// Build the demonstration catalog: a fast extract job, a report job
/// that depends on it, and a deliberately flaky job that exercises the
/// retry path.
pub fn build() -> std::result::Result<JobCatalog, etlforge_core::error::CatalogError> {
    let jobs = vec![
        Job::builder("extract_orders", extract_orders())
            .timeout_seconds(30)
            .schedule(ScheduleSpec::every_x_seconds(30))
            .config(json!({ "source": "orders.csv" }))
            .build(),
        Job::builder("summarize_orders", summarize_orders())
            .timeout_seconds(30)
            .retries(1)
            .depends_on("extract_orders")
            .schedule(ScheduleSpec::every_x_seconds(30))
            .build(),
    ];

    JobCatalog::build(jobs)
}

fn extract_orders() -> etlforge_core::RunFn {
    Arc::new(|config, logger| -> RunResult {
        logger.info(format!("extracting from {config}"));
        Ok(())
    })
}

fn summarize_orders() -> etlforge_core::RunFn {
    Arc::new(|_config, logger| -> RunResult {
        logger.info("summarizing extracted orders");
        Ok(())
    })
}
