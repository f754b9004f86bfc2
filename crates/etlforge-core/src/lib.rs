pub mod config;
pub mod db;
pub mod error;
pub mod jobs;

pub use config::Config;
pub use error::{Error, Result};
pub use jobs::{
    child_dispatch_args, is_due, run_in_child, ChildDispatchArgs, ChildLogger, Job, JobBuilder,
    JobCatalog, JobQueue, JobState, JobStatus, LogPipeline, LogRecord, LogStore, Resource, RunFn,
    RunResult, Scheduler, ScheduleSpec, SqliteLogStore, SqliteStatusStore, StatusStore, Supervisor,
    Worker,
};

/// Current version of etlforge.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
    }
}
