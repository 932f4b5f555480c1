//! Fetch pipeline split into focused submodules.
//!
//! A run is a straight line of bounded stages:
//!
//! ```text
//! source ──intake queue──▶ N workers ──result queue──▶ writer ──▶ output.jsonl
//! ```
//!
//! - [`source`] - reads the URL list and feeds the intake queue
//! - [`worker`] - fetches, classifies and parses one URL at a time
//! - [`writer`] - the only owner of the output file
//! - [`lifecycle`] - spawns the stages and shuts them down in order
//! - [`stats`] - counters shared by the stages

mod lifecycle;
mod source;
mod stats;
mod worker;
mod writer;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use worker::is_json_content_type;

use crate::config::Config;
use crate::error::Result;
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::types::{Event, PipelineState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Reusable entry point for fetch runs (cloneable - all fields are Arc-wrapped)
///
/// A `Pipeline` holds configuration, the fetch transport and the event channel.
/// Queues, tasks and the output file exist only inside a single call to
/// [`run`](Pipeline::run), so nothing carries over between runs.
#[derive(Clone)]
pub struct Pipeline {
    pub(crate) config: Arc<Config>,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
}

impl Pipeline {
    /// Create a pipeline that fetches over HTTP with reqwest
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let fetcher = HttpFetcher::new(&config.http)?;
        Self::with_fetcher(config, Arc::new(fetcher))
    }

    /// Create a pipeline with a custom fetch transport
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        config.validate()?;
        let (event_tx, _rx) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config: Arc::new(config),
            fetcher,
            event_tx,
        })
    }

    /// Subscribe to run events
    ///
    /// Each subscriber receives every event independently. A subscriber that
    /// falls more than 1000 events behind gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the configuration this pipeline runs with
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }
}

/// State shared by every task of one run.
///
/// Built fresh by each run and dropped when it returns.
#[derive(Clone)]
pub(crate) struct RunContext {
    pub(crate) config: Arc<Config>,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    pub(crate) stats: Arc<stats::RunStats>,
    /// Stops the whole run: cancelled by the caller or by a fatal writer error
    pub(crate) cancel: CancellationToken,
    /// Stops the worker pool only; a child of `cancel`, also fired when the drain times out
    pub(crate) workers_stop: CancellationToken,
}

impl RunContext {
    pub(crate) fn new(pipeline: &Pipeline, external: &CancellationToken) -> Self {
        let cancel = external.child_token();
        let workers_stop = cancel.child_token();
        Self {
            config: Arc::clone(&pipeline.config),
            fetcher: Arc::clone(&pipeline.fetcher),
            event_tx: pipeline.event_tx.clone(),
            stats: Arc::new(stats::RunStats::default()),
            cancel,
            workers_stop,
        }
    }

    /// Emit an event to all subscribers
    ///
    /// With no subscribers the event is dropped, which is fine.
    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    pub(crate) fn set_state(&self, state: PipelineState) {
        tracing::debug!(%state, "Pipeline state changed");
        self.emit(Event::StateChanged { state });
    }
}
