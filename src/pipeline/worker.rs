//! Worker loop: fetches, classifies and parses one URL at a time.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;

use super::RunContext;
use crate::error::{FetchError, ReasonCode, SkipReason};
use crate::types::{Event, FetchOutcome, OutputRecord, TargetUrl};

/// Why a URL did not produce a record
enum Rejection {
    Skipped(SkipReason),
    Failed(FetchError),
}

/// Whether a `Content-Type` value denotes a JSON document.
///
/// Matches `application/json` and any structured `+json` type such as
/// `application/problem+json`, ignoring parameters and case.
pub fn is_json_content_type(content_type: &str) -> bool {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media_type == "application/json" || media_type.ends_with("+json")
}

/// Run one worker until the intake queue is closed and empty, or the pool is stopped.
///
/// A worker holds at most one URL at a time, so the pool size is the cap on
/// in-flight requests. Failures are confined to the URL that caused them.
pub(super) async fn run_worker(
    worker_id: usize,
    intake_rx: async_channel::Receiver<TargetUrl>,
    result_tx: mpsc::Sender<OutputRecord>,
    ctx: RunContext,
) {
    tracing::debug!(worker_id, "Worker started");

    loop {
        let url = tokio::select! {
            biased;
            _ = ctx.workers_stop.cancelled() => break,
            next = intake_rx.recv() => match next {
                Ok(url) => url,
                // Closed and drained: the source is done
                Err(_) => break,
            },
        };

        let in_flight = url.clone();
        let outcome = tokio::select! {
            biased;
            _ = ctx.workers_stop.cancelled() => FetchOutcome::Failed {
                url: in_flight,
                error: FetchError::Cancelled,
            },
            outcome = classify(&ctx, url) => outcome,
        };

        // After a cancelled fetch the next select sees the stop signal and exits
        match outcome {
            FetchOutcome::Success { url, body } => deliver(url, body, &result_tx, &ctx).await,
            FetchOutcome::Skipped { url, reason } => report_skipped(url, reason, &ctx),
            FetchOutcome::Failed { url, error } => report_failed(url, error, &ctx),
        }
    }

    tracing::debug!(worker_id, "Worker stopped");
}

/// Fetch one URL and decide its outcome.
async fn classify(ctx: &RunContext, url: TargetUrl) -> FetchOutcome {
    match fetch_and_parse(ctx, &url).await {
        Ok(body) => FetchOutcome::Success { url, body },
        Err(Rejection::Skipped(reason)) => FetchOutcome::Skipped { url, reason },
        Err(Rejection::Failed(error)) => FetchOutcome::Failed { url, error },
    }
}

/// Fetch, check and parse one URL.
///
/// The request timeout is a deadline for the whole exchange, including the
/// body read. The body is only downloaded once status and content type have
/// been accepted, so the size limit never applies to skipped responses.
async fn fetch_and_parse(
    ctx: &RunContext,
    url: &TargetUrl,
) -> Result<serde_json::Value, Rejection> {
    let request_timeout = ctx.config.pipeline.request_timeout;
    let deadline = Instant::now() + request_timeout;
    let timed_out = || Rejection::Failed(FetchError::Timeout(request_timeout));

    let response = tokio::time::timeout_at(deadline, ctx.fetcher.fetch(url, request_timeout))
        .await
        .map_err(|_| timed_out())?
        .map_err(Rejection::Failed)?;

    if response.status != 200 {
        return Err(Rejection::Skipped(SkipReason::Status(response.status)));
    }

    let content_type = response.content_type().unwrap_or_default();
    if !is_json_content_type(content_type) {
        return Err(Rejection::Skipped(SkipReason::ContentType(
            content_type.to_string(),
        )));
    }

    let max_body_bytes = ctx.config.http.max_body_bytes;
    let body = tokio::time::timeout_at(deadline, response.read_body(max_body_bytes))
        .await
        .map_err(|_| timed_out())?
        .map_err(Rejection::Failed)?;

    parse_body(body, ctx.config.pipeline.blocking_parse_threshold).await
}

/// Parse a JSON body, moving large ones off the async workers.
async fn parse_body(
    body: Bytes,
    blocking_threshold: usize,
) -> Result<serde_json::Value, Rejection> {
    let parsed = if body.len() >= blocking_threshold {
        tokio::task::spawn_blocking(move || serde_json::from_slice::<serde_json::Value>(&body))
            .await
            .map_err(|e| {
                Rejection::Failed(FetchError::Body(format!("JSON decoder task failed: {e}")))
            })?
    } else {
        serde_json::from_slice(&body)
    };

    parsed.map_err(|e| Rejection::Skipped(SkipReason::InvalidJson(e.to_string())))
}

/// Hand a successful body to the writer.
///
/// A record that fits in the result queue is always handed over, even when the
/// pool is already stopping. Waiting on a full queue is the second
/// backpressure point; if the pool is stopped during that wait, or the writer
/// is gone, the URL ends as `Failed` instead, so it is still accounted for
/// exactly once.
async fn deliver(
    url: TargetUrl,
    body: serde_json::Value,
    result_tx: &mpsc::Sender<OutputRecord>,
    ctx: &RunContext,
) {
    let record = OutputRecord {
        url: url.clone(),
        content: body,
    };

    let sent = match result_tx.try_send(record) {
        Ok(()) => Ok(()),
        Err(TrySendError::Closed(_)) => Err(FetchError::WriterClosed),
        Err(TrySendError::Full(record)) => tokio::select! {
            biased;
            _ = ctx.workers_stop.cancelled() => Err(FetchError::Cancelled),
            sent = result_tx.send(record) => sent.map_err(|_| FetchError::WriterClosed),
        },
    };

    match sent {
        Ok(()) => {
            ctx.stats.success();
            tracing::debug!(url = %url, "Fetched JSON record");
            ctx.emit(Event::UrlSucceeded { url });
        }
        Err(error) => report_failed(url, error, ctx),
    }
}

fn report_skipped(url: TargetUrl, reason: SkipReason, ctx: &RunContext) {
    ctx.stats.skipped();
    tracing::warn!(url = %url, reason = reason.code(), detail = %reason, "Skipped URL");
    ctx.emit(Event::UrlSkipped { url, reason });
}

fn report_failed(url: TargetUrl, error: FetchError, ctx: &RunContext) {
    ctx.stats.failed();
    if error == FetchError::Cancelled {
        tracing::warn!(url = %url, reason = error.code(), "Fetch cancelled");
    } else {
        tracing::error!(url = %url, reason = error.code(), error = %error, "Fetch failed");
    }
    ctx.emit(Event::UrlFailed { url, error });
}
