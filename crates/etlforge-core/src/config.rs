use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Error;

/// Minimum severity a log record must carry to survive the producer-side
/// filter before it reaches the log store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Connection string for the relational store, e.g.
    /// `sqlite://./etlforge.db`.
    pub db_uri: String,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default = "default_days_logs_to_keep")]
    pub days_logs_to_keep: u32,

    #[serde(default = "default_false")]
    pub log_sql_to_console: bool,

    #[serde(default = "default_scan_interval_seconds")]
    pub scan_interval_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_uri: default_db_uri(),
            max_workers: default_max_workers(),
            log_level: LogLevel::default(),
            days_logs_to_keep: default_days_logs_to_keep(),
            log_sql_to_console: default_false(),
            scan_interval_seconds: default_scan_interval_seconds(),
        }
    }
}

fn default_db_uri() -> String {
    "sqlite://./etlforge.db".to_string()
}

fn default_max_workers() -> usize {
    5
}

fn default_days_logs_to_keep() -> u32 {
    3
}

fn default_scan_interval_seconds() -> u64 {
    10
}

fn default_false() -> bool {
    false
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read config file {path}: {e}")))?;

        let config: Config = toml::from_str(&contents)?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration the way the service is actually started: an
    /// explicit `--config` path if given, else `ETLFORGE_CONFIG`, else
    /// `./etlforge.toml` if present, falling back to defaults with
    /// `ETLFORGE_*` environment variables layered on top of whichever
    /// file (if any) was found.
    pub fn from_env(explicit_path: Option<&str>) -> Result<Self, Error> {
        use config::{Environment, File};

        let mut builder = config::Config::builder();

        let file_path = explicit_path
            .map(str::to_string)
            .or_else(|| std::env::var("ETLFORGE_CONFIG").ok())
            .or_else(|| {
                let default = "./etlforge.toml";
                Path::new(default).exists().then(|| default.to_string())
            });

        if let Some(path) = &file_path {
            if !Path::new(path).exists() {
                return Err(Error::config(format!("config file not found at {path}")));
            }
            builder = builder.add_source(File::with_name(path));
        }

        builder = builder.add_source(Environment::with_prefix("ETLFORGE").separator("__"));

        let built = builder
            .build()
            .map_err(|e| Error::config(format!("failed to assemble configuration: {e}")))?;

        let config: Config = built
            .try_deserialize()
            .map_err(|e| Error::config(format!("failed to parse configuration: {e}")))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate invariants `#[serde(default)]` alone can't express.
    pub fn validate(&self) -> Result<(), Error> {
        if self.db_uri.trim().is_empty() {
            return Err(Error::config("db_uri must not be empty"));
        }
        if self.max_workers == 0 {
            return Err(Error::config("max_workers must be greater than zero"));
        }
        if self.days_logs_to_keep == 0 {
            return Err(Error::config("days_logs_to_keep must be greater than zero"));
        }
        if self.scan_interval_seconds == 0 {
            return Err(Error::config(
                "scan_interval_seconds must be greater than zero",
            ));
        }
        Ok(())
    }
}
