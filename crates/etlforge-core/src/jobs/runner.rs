//! Child-process isolation
//!
//! A job's run-function executes inside a disposable child process: the
//! embedding binary re-executes itself with hidden arguments identifying
//! the job and attempt, rebuilds its own catalog (deterministic given
//! the same binary and config), looks up the job by name, and invokes
//! its run-function directly. Results and log records cross the
//! process boundary as newline-delimited JSON on the child's stdout.

use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use super::catalog::JobCatalog;
use super::log_store::LogRecord;
use crate::config::LogLevel;
use crate::error::{Frame, JobFailure};

/// Last panic location seen by the hook installed in [`run_in_child`],
/// read back after `catch_unwind` returns `Err` since the unwind
/// payload itself carries no location. Child-process local: each
/// dispatch attempt runs in its own disposable process, so there is no
/// cross-attempt contamination to worry about.
static LAST_PANIC_LOCATION: Mutex<Option<(String, u32)>> = Mutex::new(None);

pub const CHILD_JOB_ENV: &str = "ETLFORGE_CHILD_JOB";
pub const CHILD_ATTEMPT_ENV: &str = "ETLFORGE_CHILD_ATTEMPT";

/// Arguments identifying a single child dispatch attempt, read back out
/// of the environment the worker set before spawning this process.
#[derive(Debug, Clone)]
pub struct ChildDispatchArgs {
    pub job_name: String,
    pub attempt: u32,
}

/// If the current process was spawned as a job attempt, return the
/// arguments that identify it. Returns `None` for the normal,
/// supervisor-running invocation of the binary.
pub fn child_dispatch_args() -> Option<ChildDispatchArgs> {
    let job_name = std::env::var(CHILD_JOB_ENV).ok()?;
    let attempt = std::env::var(CHILD_ATTEMPT_ENV)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    Some(ChildDispatchArgs { job_name, attempt })
}

/// One line of the child's stdout protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChildMessage {
    Log(LogRecord),
    Terminal(TerminalResult),
}

/// The single terminal line every child attempt emits before exiting,
/// unless it is killed (timeout) before reaching that point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TerminalResult {
    Success,
    Error(JobFailure),
}

/// A logger handle passed to the run-function. Every call writes one
/// `ChildMessage::Log` line to stdout immediately.
pub struct ChildLogger {
    logger_name: String,
}

impl ChildLogger {
    fn new(logger_name: impl Into<String>) -> Self {
        Self {
            logger_name: logger_name.into(),
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.emit(LogLevel::Debug, message.into());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(LogLevel::Info, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(LogLevel::Error, message.into());
    }

    fn emit(&self, level: LogLevel, message: String) {
        let record = LogRecord::new(self.logger_name.clone(), level, message);
        write_line(&ChildMessage::Log(record));
    }
}

fn write_line(message: &ChildMessage) {
    match serde_json::to_string(message) {
        Ok(line) => println!("{line}"),
        Err(e) => eprintln!("failed to serialize child message: {e}"),
    }
}

/// Entry point for a re-exec'd child process. Looks up `args.job_name`
/// in `catalog`, runs it, and exits with status 0 after writing exactly
/// one terminal line. Never returns.
pub fn run_in_child(catalog: &JobCatalog, args: ChildDispatchArgs) -> ! {
    let logger = ChildLogger::new(args.job_name.clone());

    let job = match catalog.get(&args.job_name) {
        Some(job) => job,
        None => {
            write_line(&ChildMessage::Terminal(TerminalResult::Error(JobFailure::new(
                "CatalogError",
                format!("no such job: {}", args.job_name),
            ))));
            std::process::exit(1);
        }
    };

    let run = job.run.clone();
    let config = job.config.clone();

    std::panic::set_hook(Box::new(|info| {
        eprintln!("{info}");
        if let Some(location) = info.location() {
            if let Ok(mut captured) = LAST_PANIC_LOCATION.lock() {
                *captured = Some((location.file().to_string(), location.line()));
            }
        }
    }));

    let outcome = catch_unwind(AssertUnwindSafe(|| run(config, &logger)));

    let terminal = match outcome {
        Ok(Ok(())) => TerminalResult::Success,
        Ok(Err(failure)) => TerminalResult::Error(failure),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "job panicked".to_string());
            let panic_frame = LAST_PANIC_LOCATION.lock().ok().and_then(|g| g.clone()).map(|(file, line)| Frame {
                code: crate::error::read_source_line(&file, line),
                file,
                line,
            });
            let failure = match panic_frame {
                Some(frame) => JobFailure::new("Panic", message).with_frames(vec![frame]),
                None => JobFailure::new("Panic", message),
            };
            TerminalResult::Error(failure)
        }
    };

    write_line(&ChildMessage::Terminal(terminal));
    std::process::exit(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_message_round_trips_through_json() {
        let log = ChildMessage::Log(LogRecord::new("job", LogLevel::Info, "hello"));
        let line = serde_json::to_string(&log).unwrap();
        let parsed: ChildMessage = serde_json::from_str(&line).unwrap();
        match parsed {
            ChildMessage::Log(record) => assert_eq!(record.message, "hello"),
            _ => panic!("expected a log message"),
        }
    }

    #[test]
    fn panic_hook_captures_a_frame_for_the_terminal_message() {
        std::panic::set_hook(Box::new(|info| {
            if let Some(location) = info.location() {
                if let Ok(mut captured) = LAST_PANIC_LOCATION.lock() {
                    *captured = Some((location.file().to_string(), location.line()));
                }
            }
        }));

        let outcome = catch_unwind(AssertUnwindSafe(|| panic!("boom")));
        assert!(outcome.is_err());

        let panic_frame = LAST_PANIC_LOCATION.lock().ok().and_then(|g| g.clone()).map(|(file, line)| Frame {
            code: crate::error::read_source_line(&file, line),
            file,
            line,
        });
        let frame = panic_frame.expect("hook should have captured a location");
        assert!(frame.file.ends_with("runner.rs"));
        assert!(frame.line > 0);

        let _ = std::panic::take_hook();
    }

    #[test]
    fn terminal_error_round_trips() {
        let terminal = ChildMessage::Terminal(TerminalResult::Error(JobFailure::new(
            "ValueError",
            "bad input",
        )));
        let line = serde_json::to_string(&terminal).unwrap();
        let parsed: ChildMessage = serde_json::from_str(&line).unwrap();
        match parsed {
            ChildMessage::Terminal(TerminalResult::Error(failure)) => {
                assert_eq!(failure.error_type, "ValueError");
            }
            _ => panic!("expected a terminal error"),
        }
    }
}
