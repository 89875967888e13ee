use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use config::ConfigError;
use dbbench_core::telemetry::init_logging;
use dbbench_core::{BackendKind, BenchConfig, CoreError, RunResult};
use dbbench_engine::Runner;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "dbbench")]
#[command(about = "Concurrent load benchmark for transactional databases", long_about = None)]
#[command(version)]
struct Cli {
    /// Backend to benchmark: memory, sqlite or postgres
    #[arg(long, required_unless_present = "list")]
    db: Option<BackendKind>,

    /// Workload family, e.g. ecommerce
    #[arg(long, required_unless_present = "list")]
    workload: Option<String>,

    /// Test within the family, e.g. inventory_update
    #[arg(long, required_unless_present = "list")]
    test: Option<String>,

    /// Concurrent workers (defaults to benchmark_settings.default_concurrency)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Run duration such as 30s or 500ms (defaults to benchmark_settings.default_duration)
    #[arg(long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    /// Configuration file layered over ./config/dbbench.yaml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format of the result record
    #[arg(long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Print the known workloads and exit
    #[arg(long)]
    list: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging() {
        eprintln!("dbbench: logging unavailable: {e}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Benchmark failed");
            eprintln!("dbbench: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.list {
        return print_catalog();
    }
    let (Some(backend), Some(family), Some(test)) = (cli.db, cli.workload, cli.test) else {
        let message = "--db, --workload and --test are required".to_string();
        return Err(CoreError::InvalidConfig(message).into());
    };

    let config = BenchConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let concurrency = cli
        .concurrency
        .unwrap_or(config.benchmark_settings.default_concurrency);
    let duration = cli
        .duration
        .unwrap_or(config.benchmark_settings.default_duration);

    let workload = dbbench_workloads::build(&family, &test, backend)?;
    let driver = dbbench_drivers::open(backend, config.databases.dsn(backend)).await?;
    info!(%backend, workload = %family, test = %test, concurrency, ?duration, "Starting benchmark");

    let outcome = Runner::new(config.engine.clone())
        .run(Arc::clone(&driver), workload, concurrency, duration)
        .await;
    if let Err(e) = driver.close().await {
        warn!(error = %e, "Closing the driver failed");
    }

    print_result(&outcome?, cli.format)
}

fn print_result(result: &RunResult, format: OutputFormat) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, result).context("serializing result")?;
            writeln!(out)?;
        }
        OutputFormat::Text => {
            for (key, value) in result.to_key_values() {
                writeln!(out, "{key}={value}")?;
            }
        }
    }
    Ok(())
}

fn print_catalog() -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    for (family, tests) in dbbench_workloads::CATALOG {
        writeln!(out, "{family}: {}", tests.join(", "))?;
    }
    Ok(())
}

/// 2 for bad arguments or configuration, 3 when the backend is unreachable,
/// 4 when setup failed, 1 for anything else.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(core) = err.downcast_ref::<CoreError>() {
        return match core {
            CoreError::InvalidConfig(_) => 2,
            CoreError::Connection { .. } => 3,
            CoreError::SetupFailed { .. } => 4,
            _ => 1,
        };
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return 2;
    }
    1
}
