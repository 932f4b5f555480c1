//! fetch-jsonl: fetch a list of URLs concurrently and write JSON bodies as JSON Lines.
//!
//! Reads one URL per line from the input file, fetches with a bounded worker
//! pool and appends `{"<url>": <body>}` for every response that is a 200 with
//! a JSON content type. Stops early on SIGINT/SIGTERM, keeping what was fetched.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use fetch_jsonl::{Config, Pipeline, RecordFormat, Result, run_with_shutdown};

/// Fetch URLs concurrently into a JSON Lines file.
#[derive(Parser, Debug)]
#[command(name = "fetch-jsonl")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File with one URL per line
    input: PathBuf,

    /// JSON Lines file to create (truncated if it exists)
    output: PathBuf,

    /// JSON configuration file; command-line options override its values
    #[arg(short, long, env = "FETCH_JSONL_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum number of requests in flight
    #[arg(short = 'j', long)]
    max_concurrent: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long, value_parser = parse_secs)]
    timeout: Option<Duration>,

    /// Seconds to wait for queued URLs after input ends before cancelling
    #[arg(long, value_parser = parse_secs)]
    drain_timeout: Option<Duration>,

    /// Capacity of the intake and result queues
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Output line shape: "keyed" ({"<url>": body}) or "wrapped" ({"url", "content"})
    #[arg(long)]
    format: Option<RecordFormat>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "FETCH_JSONL_LOG")]
    log_level: String,

    /// Also append log lines to this file, with the same filter as the console
    #[arg(long, env = "FETCH_JSONL_LOG_FILE")]
    log_file: Option<PathBuf>,
}

fn parse_secs(raw: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = raw
        .parse()
        .map_err(|e| format!("invalid number of seconds {raw:?}: {e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid duration {raw:?}: {e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_file = match args.log_file.as_deref().map(open_log_file).transpose() {
        Ok(file) => file,
        Err(e) => {
            eprintln!("fetch-jsonl: {e}");
            return ExitCode::FAILURE;
        }
    };

    // RUST_LOG takes priority over --log-level; the filter applies to every layer
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(Arc::new(file))
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fetch-jsonl failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = build_config(&args)?;
    let pipeline = Pipeline::new(config)?;

    let summary = run_with_shutdown(&pipeline, &args.input, &args.output).await?;

    if summary.cancelled {
        tracing::warn!("Run was interrupted, output holds the records fetched before the signal");
    }
    tracing::info!(
        records = summary.records_written,
        skipped = summary.skipped,
        failed = summary.failed,
        ignored_lines = summary.urls_rejected,
        output = %args.output.display(),
        "Done"
    );
    Ok(())
}

/// Open the log file for appending, creating it if needed.
fn open_log_file(path: &Path) -> std::io::Result<File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("cannot open log file {}: {e}", path.display()),
            )
        })
}

/// Load the config file (if any) and apply command-line overrides.
fn build_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };

    if let Some(n) = args.max_concurrent {
        config.pipeline.max_concurrent = n;
    }
    if let Some(timeout) = args.timeout {
        config.pipeline.request_timeout = timeout;
    }
    if let Some(timeout) = args.drain_timeout {
        config.pipeline.drain_timeout = timeout;
    }
    if let Some(capacity) = args.queue_capacity {
        config.pipeline.intake_capacity = capacity;
        config.pipeline.result_capacity = capacity;
    }
    if let Some(format) = args.format {
        config.output.format = format;
    }

    config.validate()?;
    Ok(config)
}
