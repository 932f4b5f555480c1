//! Run coordination: opens the files, spawns the stages and shuts them down in order.

use std::path::Path;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{Pipeline, RunContext, source, worker, writer};
use crate::error::{Error, Result};
use crate::types::{Event, OutputRecord, PipelineState, RunSummary, TargetUrl};

/// How long stopped workers get to notice cancellation before they are aborted
const WORKER_STOP_GRACE: Duration = Duration::from_secs(5);

impl Pipeline {
    /// Fetch every URL listed in `input` and write one JSON record per line to `output`
    ///
    /// Equivalent to [`run_with_cancel`](Pipeline::run_with_cancel) with a token
    /// that is never cancelled.
    ///
    /// # Errors
    ///
    /// See [`run_with_cancel`](Pipeline::run_with_cancel).
    pub async fn run(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<RunSummary> {
        self.run_with_cancel(input, output, CancellationToken::new())
            .await
    }

    /// Run the pipeline until the input is exhausted or `shutdown` is cancelled
    ///
    /// The sequence is:
    /// 1. Open the input, then create (truncate) the output. Nothing is spawned
    ///    if either fails.
    /// 2. Start the writer, `max_concurrent` workers and the URL source.
    /// 3. When the source is done, drain: workers finish every queued URL.
    ///    If that takes longer than `drain_timeout`, in-flight fetches are
    ///    cancelled and the run proceeds.
    /// 4. The writer flushes everything that reached the result queue and
    ///    closes the file.
    ///
    /// Cancelling `shutdown` stops reading and cancels in-flight fetches, but
    /// records already handed to the writer are still written. The summary
    /// reports `cancelled = true` in that case; it is not an error.
    ///
    /// # Errors
    ///
    /// - [`Error::Input`] if the input cannot be opened, or a read fails mid-run
    /// - [`Error::Output`] if the output cannot be created or a write fails
    /// - [`Error::TaskJoin`] if a pipeline task panicked
    ///
    /// Errors that occur after startup are returned only once every task has
    /// stopped and the output file is closed.
    pub async fn run_with_cancel(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        shutdown: CancellationToken,
    ) -> Result<RunSummary> {
        let input = input.as_ref();
        let output = output.as_ref();

        let input_file = tokio::fs::File::open(input)
            .await
            .map_err(|source| Error::Input {
                path: input.to_path_buf(),
                source,
            })?;
        let output_file = tokio::fs::File::create(output)
            .await
            .map_err(|source| Error::Output {
                path: output.to_path_buf(),
                source,
            })?;

        let ctx = RunContext::new(self, &shutdown);
        let settings = &ctx.config.pipeline;
        tracing::info!(
            input = %input.display(),
            output = %output.display(),
            max_concurrent = settings.max_concurrent,
            format = %ctx.config.output.format,
            "Starting fetch run"
        );
        ctx.set_state(PipelineState::Running);

        let (intake_tx, intake_rx) = async_channel::bounded::<TargetUrl>(settings.intake_capacity);
        let (result_tx, result_rx) = mpsc::channel::<OutputRecord>(settings.result_capacity);

        let writer_handle =
            writer::spawn_writer(output_file, output.to_path_buf(), result_rx, ctx.clone());

        let mut workers = JoinSet::new();
        for worker_id in 0..settings.max_concurrent {
            workers.spawn(worker::run_worker(
                worker_id,
                intake_rx.clone(),
                result_tx.clone(),
                ctx.clone(),
            ));
        }
        // Workers now hold the only receivers and senders, so each queue
        // closes once its producers are gone
        drop(intake_rx);
        drop(result_tx);

        let source_handle =
            source::spawn_url_source(BufReader::new(input_file), intake_tx, ctx.clone());

        // 1. Wait for the source to run out of input (or be cancelled)
        let source_error = match source_handle.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                tracing::error!(
                    path = %input.display(),
                    error = %e,
                    "Failed to read input, draining queued URLs"
                );
                Some(Error::Input {
                    path: input.to_path_buf(),
                    source: e,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, "URL source task failed");
                Some(Error::TaskJoin(format!("URL source: {e}")))
            }
        };

        // 2. Drain the worker pool
        ctx.set_state(PipelineState::Draining);
        let drain_timeout = settings.drain_timeout;
        let mut worker_panics = Vec::new();
        let drained = tokio::time::timeout(
            drain_timeout,
            join_workers(&mut workers, &mut worker_panics),
        )
        .await;

        let drain_timed_out = drained.is_err();
        if drain_timed_out {
            tracing::warn!(
                timeout_secs = drain_timeout.as_secs_f64(),
                busy_workers = workers.len(),
                "Timeout waiting for workers to drain, cancelling in-flight fetches"
            );
            ctx.emit(Event::DrainTimedOut {
                timeout: drain_timeout,
            });
            ctx.workers_stop.cancel();

            let stopped = tokio::time::timeout(
                WORKER_STOP_GRACE,
                join_workers(&mut workers, &mut worker_panics),
            )
            .await;
            if stopped.is_err() {
                tracing::error!(
                    remaining = workers.len(),
                    "Workers did not stop after cancellation, aborting them"
                );
                workers.abort_all();
                while workers.join_next().await.is_some() {}
            }
        } else {
            tracing::debug!("All workers finished");
        }

        // 3. Every result sender is gone now, so the writer drains and exits
        let writer_error = match writer_handle.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(e) => {
                tracing::error!(error = %e, "Writer task failed");
                Some(Error::TaskJoin(format!("writer: {e}")))
            }
        };

        let summary = ctx.stats.snapshot(drain_timed_out, shutdown.is_cancelled());
        ctx.set_state(PipelineState::Stopped);
        tracing::info!(
            lines_read = summary.lines_read,
            urls_enqueued = summary.urls_enqueued,
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            records_written = summary.records_written,
            drain_timed_out = summary.drain_timed_out,
            cancelled = summary.cancelled,
            "Fetch run finished"
        );
        ctx.emit(Event::Finished {
            summary: summary.clone(),
        });

        // The output error is the most severe: records may have been lost
        if let Some(e) = writer_error.or(source_error) {
            return Err(e);
        }
        if let Some(panic) = worker_panics.into_iter().next() {
            return Err(Error::TaskJoin(panic));
        }
        Ok(summary)
    }
}

/// Join workers until the set is empty, collecting panic messages.
///
/// Cancel-safe: dropping the future leaves unjoined workers in the set.
async fn join_workers(workers: &mut JoinSet<()>, panics: &mut Vec<String>) {
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined
            && !e.is_cancelled()
        {
            tracing::error!(error = %e, "Worker task panicked");
            panics.push(format!("worker: {e}"));
        }
    }
}
