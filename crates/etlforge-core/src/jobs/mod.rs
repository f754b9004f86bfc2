//! The scheduling-and-execution engine
//!
//! A static catalog of named jobs is evaluated on a periodic scan; jobs
//! that are due and not already in flight are queued, deduplicated, and
//! dispatched to a bounded worker pool. Each dispatch runs in an
//! isolated child process under a wall-clock timeout with a bounded
//! retry budget, and reports status and log events back through the
//! Status Store and Log Pipeline.

pub mod catalog;
pub mod log_pipeline;
pub mod log_store;
pub mod queue;
pub mod resource;
pub mod retention;
pub mod runner;
pub mod schedule;
pub mod scheduler;
pub mod status_store;
pub mod supervisor;
pub mod worker;

pub use catalog::{Job, JobBuilder, JobCatalog, RunFn, RunResult};
pub use log_pipeline::{LogPipeline, LogWriter};
pub use log_store::{LogRecord, LogStore, SqliteLogStore};
pub use queue::JobQueue;
pub use resource::Resource;
pub use runner::{child_dispatch_args, run_in_child, ChildDispatchArgs, ChildLogger};
pub use schedule::{is_due, IntervalRule, ScheduleSpec};
pub use scheduler::Scheduler;
pub use status_store::{JobState, JobStatus, SqliteStatusStore, StatusStore};
pub use supervisor::Supervisor;
pub use worker::{Worker, WorkerId};
