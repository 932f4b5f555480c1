//! JSON Lines writer: the single owner of the output file.
//!
//! The writer does not listen to any cancellation token. It stops only when
//! every result sender is gone (end-of-stream) and the queue is empty, so a
//! record that reached the queue is always written. Cancelling a run therefore
//! never loses results that were already handed over; the lifecycle
//! coordinator ends the stream by joining the workers first.

use std::path::PathBuf;

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::RunContext;
use crate::error::{Error, Result};
use crate::types::{OutputRecord, RecordFormat};

/// Write buffer size for the output file
const WRITE_BUFFER_BYTES: usize = 64 * 1024;

/// Spawn the writer task.
pub(super) fn spawn_writer(
    file: tokio::fs::File,
    path: PathBuf,
    result_rx: mpsc::Receiver<OutputRecord>,
    ctx: RunContext,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let format = ctx.config.output.format;
        let result = write_records(file, result_rx, format, &ctx).await;
        if let Err(e) = &result {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "Output file write failed, stopping run"
            );
            // Nothing more can be written; stop the source and workers too
            ctx.cancel.cancel();
        }
        result.map_err(|source| Error::Output { path, source })
    })
}

async fn write_records(
    file: tokio::fs::File,
    mut result_rx: mpsc::Receiver<OutputRecord>,
    format: RecordFormat,
    ctx: &RunContext,
) -> std::io::Result<()> {
    let mut out = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);

    while let Some(record) = result_rx.recv().await {
        let line = match record.into_line(format) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize record, dropping it");
                continue;
            }
        };

        // One write per complete line, newline included
        out.write_all(&line).await?;
        ctx.stats.record_written();

        // Flush whenever the queue is momentarily empty so records become visible as they complete
        if result_rx.is_empty() {
            out.flush().await?;
        }
    }

    // End of stream: flush the buffer and let the file finish any pending operation
    out.shutdown().await?;
    tracing::debug!("Writer drained result queue and closed output file");
    Ok(())
}
