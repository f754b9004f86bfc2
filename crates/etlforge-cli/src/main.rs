use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use etlforge_core::{child_dispatch_args, run_in_child, Config, Supervisor};

mod catalog;

#[derive(Parser)]
#[command(name = "etlforge")]
#[command(about = "A lightweight, long-running ETL job orchestrator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Configuration file path")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator until a shutdown signal is received
    Run,

    /// Print the resolved configuration and exit
    Config,
}

#[tokio::main]
async fn main() {
    // Every invocation of this binary rebuilds the same catalog. If we
    // were re-exec'd as a job attempt, run that job in-process and exit
    // before touching clap or the supervisor at all.
    if let Some(args) = child_dispatch_args() {
        let catalog = match catalog::build() {
            Ok(catalog) => catalog,
            Err(e) => {
                eprintln!("failed to rebuild catalog in child: {e}");
                std::process::exit(1);
            }
        };
        run_in_child(&catalog, args);
    }

    let cli = Cli::parse();

    let config_path = cli.config.as_ref().map(|p| p.display().to_string());
    let config = match Config::from_env(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&config);

    match cli.command {
        Commands::Run => run(config, config_path).await,
        Commands::Config => print_config(&config),
    }
}

async fn run(config: Config, config_path: Option<String>) {
    let catalog_jobs = match catalog::build() {
        Ok(catalog) => catalog.iter().cloned().collect::<Vec<_>>(),
        Err(e) => {
            error!(error = %e, "catalog validation failed at startup");
            std::process::exit(1);
        }
    };

    let supervisor = match Supervisor::build(config, catalog_jobs, config_path).await {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!(error = %e, "failed to start supervisor");
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt, shutting down");
            shutdown_for_signal.cancel();
        }
    });

    if let Err(e) = supervisor.run(shutdown).await {
        error!(error = %e, "supervisor exited with an error");
        std::process::exit(1);
    }
}

fn print_config(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to render configuration: {e}"),
    }
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(tracing_directives(config)));
    fmt().with_env_filter(filter).init();
}

/// `log_sql_to_console` is a diagnostic escape hatch: it turns on
/// sqlx's own query-level tracing target, which is silent by default
/// because it's noisy for normal operation.
fn tracing_directives(config: &Config) -> String {
    use etlforge_core::config::LogLevel;

    let default_level = match config.log_level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Error => "error",
    };

    let mut directives = default_level.to_string();
    if config.log_sql_to_console {
        directives.push_str(",sqlx=debug");
    }
    directives
}

#[cfg(test)]
mod tests {
    use super::*;
    use etlforge_core::config::LogLevel;

    #[test]
    fn sql_logging_off_by_default() {
        let config = Config {
            log_level: LogLevel::Info,
            log_sql_to_console: false,
            ..Config::default()
        };
        assert_eq!(tracing_directives(&config), "info");
    }

    #[test]
    fn sql_logging_adds_sqlx_directive() {
        let config = Config {
            log_level: LogLevel::Debug,
            log_sql_to_console: true,
            ..Config::default()
        };
        assert_eq!(tracing_directives(&config), "debug,sqlx=debug");
    }
}
