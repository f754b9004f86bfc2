//! Crate-wide error taxonomy
//!
//! The orchestrator distinguishes startup-fatal catalog problems from
//! per-attempt job failures, per-attempt timeouts, and infrastructure
//! hiccups (store/queue trouble) that should not take the whole process
//! down.

use std::path::PathBuf;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for etlforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Startup-fatal catalog problems: duplicate job names, dangling
    /// dependency references.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// The relational store returned an error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A job attempt raised/returned an error from user code.
    #[error("job error: {0}")]
    UserJob(JobFailure),

    /// A job attempt exceeded its wall-clock timeout.
    #[error("the job, {job_name}, timed out after {timeout_seconds} seconds")]
    Timeout {
        job_name: String,
        timeout_seconds: u64,
    },

    /// Infrastructure trouble unrelated to any single job attempt: a
    /// broken queue, a crashed log writer, a failed child spawn.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Config-file parsing errors.
    #[error("config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// IO errors (reading config files, spawning child processes, …).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with a description, used sparingly.
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn catalog<T: Into<String>>(msg: T) -> Self {
        Error::Catalog(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Error::Config(msg.into())
    }

    pub fn infrastructure<T: Into<String>>(msg: T) -> Self {
        Error::Infrastructure(msg.into())
    }

    pub fn other<T: Into<String>>(msg: T) -> Self {
        Error::Other(msg.into())
    }

    /// The message that should be written to the job's terminal `Error`
    /// status row when this error surfaces during a dispatch.
    pub fn as_job_error_message(&self) -> String {
        match self {
            Error::Timeout {
                job_name,
                timeout_seconds,
            } => format!("the job, {job_name}, timed out after {timeout_seconds} seconds"),
            Error::UserJob(failure) => failure.render(),
            other => other.to_string(),
        }
    }
}

/// A single stack frame captured from a failing job attempt, rendered as
/// `(file, line, code)` the way the parent process reconstructs it from
/// the child's structured failure report.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Frame {
    pub file: String,
    pub line: u32,
    pub code: String,
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.file, self.line, self.code)
    }
}

impl Frame {
    /// Build a frame from a source location, best-effort reading back
    /// the offending line of source text the way `traceback.extract_tb`
    /// does for the source this orchestrator is modeled on. Falls back
    /// to an empty `code` field if the file can't be read (e.g. a
    /// panic inside a dependency not shipped alongside the binary).
    pub fn from_location(location: &std::panic::Location<'_>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
            code: read_source_line(location.file(), location.line()),
        }
    }
}

pub(crate) fn read_source_line(file: &str, line: u32) -> String {
    std::fs::read_to_string(file)
        .ok()
        .and_then(|contents| contents.lines().nth(line.saturating_sub(1) as usize).map(str::trim).map(str::to_string))
        .unwrap_or_default()
}

/// A captured failure from user code running in the isolated child
/// process: exception/panic type, message, and a truncated frame list.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct JobFailure {
    pub error_type: String,
    pub message: String,
    pub frames: Vec<Frame>,
}

impl JobFailure {
    /// The single caller-site frame is captured automatically via
    /// `#[track_caller]`, so a plain `JobFailure::new(...)` from user
    /// code still renders a non-empty frame list without the caller
    /// having to build one by hand.
    #[track_caller]
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            error_type: error_type.into(),
            message: message.into(),
            frames: vec![Frame::from_location(location)],
        }
    }

    pub fn with_frames(mut self, frames: Vec<Frame>) -> Self {
        self.frames = frames;
        self
    }

    /// Human-readable rendering: `Type: message\n  > file [line]: code`.
    pub fn render(&self) -> String {
        if self.frames.is_empty() {
            format!("{}: {}", self.error_type, self.message)
        } else {
            let frames = self
                .frames
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join("\n  > ");
            format!("{}: {}\n  > {}", self.error_type, self.message, frames)
        }
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl std::error::Error for JobFailure {}

/// Raised at startup when the catalog fails validation.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("the following job names are duplicated: {0:?}")]
    DuplicateJobNames(Vec<String>),

    #[error("the following resource keys are duplicated: {0:?}")]
    DuplicateResourceKey(Vec<String>),

    #[error("job {job_name} depends on unknown job {dependency}")]
    UnknownDependency { job_name: String, dependency: String },

    #[error("config file not found at {0}")]
    ConfigFileMissing(PathBuf),
}

impl From<CatalogError> for Error {
    fn from(err: CatalogError) -> Self {
        Error::Catalog(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_failure_renders_type_message_and_frames() {
        let failure = JobFailure::new("ValueError", "bad input").with_frames(vec![Frame {
            file: "job.rs".into(),
            line: 42,
            code: "do_thing()".into(),
        }]);
        let rendered = failure.render();
        assert!(rendered.starts_with("ValueError: bad input"));
        assert!(rendered.contains("job.rs [42]: do_thing()"));
    }

    #[test]
    fn new_failure_auto_captures_the_call_site_frame() {
        let failure = JobFailure::new("ValueError", "bad input");
        assert_eq!(failure.frames.len(), 1);
        assert!(failure.frames[0].file.ends_with("error.rs"));
    }

    #[test]
    fn timeout_message_matches_required_wording() {
        let err = Error::Timeout {
            job_name: "nightly_sync".into(),
            timeout_seconds: 5,
        };
        assert_eq!(
            err.as_job_error_message(),
            "the job, nightly_sync, timed out after 5 seconds"
        );
    }
}
