//! # fetch-jsonl
//!
//! Bounded concurrent fetching of a URL list into a JSON Lines file.
//!
//! ## Design Philosophy
//!
//! fetch-jsonl is designed to be:
//! - **Bounded** - At most `max_concurrent` requests in flight, with finite queues between stages
//! - **Failure-isolated** - A bad URL is logged and skipped, it never stops the run
//! - **Single-writer** - One task owns the output file, so lines never interleave
//! - **Event-driven** - Consumers can subscribe to per-URL and lifecycle events
//!
//! ## Quick Start
//!
//! ```no_run
//! use fetch_jsonl::{Config, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new(Config::with_max_concurrent(8))?;
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = pipeline.run("urls.txt", "output.jsonl").await?;
//!     println!("{} records written", summary.records_written);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// HTTP fetch abstraction and the reqwest-backed implementation
pub mod fetcher;
/// Source, worker pool, writer and run lifecycle
pub mod pipeline;
/// Core types and events
pub mod types;

use std::path::Path;

use tokio_util::sync::CancellationToken;

// Re-export commonly used types
pub use config::{Config, HttpConfig, OutputConfig, PipelineConfig};
pub use error::{Error, FetchError, ReasonCode, Result, SkipReason};
pub use fetcher::{BodyReader, BufferedBody, FetchResponse, Fetcher, HttpFetcher};
pub use pipeline::{Pipeline, is_json_content_type};
pub use types::{
    Event, FetchOutcome, OutputRecord, PipelineState, RecordFormat, RunSummary, TargetUrl,
};

/// Fetch every URL in `input` with default settings and write `{"<url>": <body>}`
/// lines to `output`.
///
/// # Errors
///
/// Fails if `max_concurrent` is zero, if the input cannot be read or the output
/// cannot be written. Individual URL failures are never errors; they are counted
/// in the returned [`RunSummary`].
pub async fn fetch_urls(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    max_concurrent: usize,
) -> Result<RunSummary> {
    let pipeline = Pipeline::new(Config::with_max_concurrent(max_concurrent))?;
    pipeline.run(input, output).await
}

/// Helper function to run the pipeline with graceful signal handling.
///
/// The run stops early when a termination signal arrives: reading stops,
/// in-flight fetches are cancelled and the records already fetched are still
/// written. The returned summary has `cancelled` set in that case.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use fetch_jsonl::{Config, Pipeline, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = Pipeline::new(Config::default())?;
///
///     // Run with automatic signal handling
///     let summary = run_with_shutdown(&pipeline, "urls.txt", "output.jsonl").await?;
///     println!("cancelled: {}", summary.cancelled);
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(
    pipeline: &Pipeline,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<RunSummary> {
    let shutdown = CancellationToken::new();
    let signal_watcher = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if wait_for_signal().await {
                tracing::info!("Stopping run, records fetched so far will still be written");
                shutdown.cancel();
            }
        }
    });

    let result = pipeline.run_with_cancel(input, output, shutdown).await;
    signal_watcher.abort();
    result
}

/// Wait for a termination signal. Returns `false` if no handler could be installed.
#[cfg(unix)]
async fn wait_for_signal() -> bool {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
            true
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
            true
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
            true
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            wait_for_ctrl_c().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> bool {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> bool {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal, run cannot be interrupted");
            false
        }
    }
}
