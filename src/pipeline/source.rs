//! URL source: reads the input list and feeds the intake queue.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tokio::task::JoinHandle;

use super::RunContext;
use crate::types::TargetUrl;

/// Longest input line considered; longer lines are rejected without being buffered
const MAX_LINE_BYTES: usize = 8 * 1024;

/// Spawn the source task.
///
/// Lines are read one at a time and only valid http(s) URLs are enqueued.
/// Lines longer than 8 KiB are rejected as malformed without being held in
/// memory. A full intake queue suspends the task, which is what throttles reading to the
/// pace of the workers. When input runs out (or the run is cancelled) the
/// intake queue is closed exactly once, after the last URL was enqueued.
pub(super) fn spawn_url_source<R>(
    reader: R,
    intake_tx: async_channel::Sender<TargetUrl>,
    ctx: RunContext,
) -> JoinHandle<std::io::Result<()>>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let result = feed_intake(reader, &intake_tx, &ctx).await;
        intake_tx.close();
        tracing::debug!("Intake queue closed");
        result
    })
}

async fn feed_intake<R>(
    mut reader: R,
    intake_tx: &async_channel::Sender<TargetUrl>,
    ctx: &RunContext,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();

    loop {
        line.clear();
        let mut limited = (&mut reader).take(MAX_LINE_BYTES as u64 + 1);
        let read = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                tracing::debug!("Source cancelled before end of input");
                return Ok(());
            }
            read = limited.read_until(b'\n', &mut line) => read?,
        };
        if read == 0 {
            return Ok(());
        }
        ctx.stats.line_read();

        if line.len() > MAX_LINE_BYTES && line.last() != Some(&b'\n') {
            ctx.stats.url_rejected();
            tracing::debug!(limit = MAX_LINE_BYTES, "Ignoring overlong input line");
            let skipped = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    tracing::debug!("Source cancelled while skipping an overlong line");
                    return Ok(());
                }
                skipped = skip_line(&mut reader) => skipped?,
            };
            if !skipped {
                return Ok(());
            }
            continue;
        }

        // Non-UTF-8 lines cannot hold a valid URL, so they count as malformed
        let Some(url) = std::str::from_utf8(&line).ok().and_then(TargetUrl::parse) else {
            ctx.stats.url_rejected();
            tracing::trace!(
                line = %String::from_utf8_lossy(&line).trim_end(),
                "Ignoring input line"
            );
            continue;
        };

        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                tracing::debug!("Source cancelled while waiting for intake capacity");
                return Ok(());
            }
            sent = intake_tx.send(url) => {
                if sent.is_err() {
                    // Every worker is gone; nothing left to feed
                    tracing::debug!("Intake queue has no consumers, stopping source");
                    return Ok(());
                }
            }
        }
        ctx.stats.url_enqueued();
    }
}

/// Consume input up to and including the next newline without buffering it.
///
/// Returns `false` if the input ended first.
async fn skip_line<R>(reader: &mut R) -> std::io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Ok(false);
        }
        match buf.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(true);
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_helpers::{MockFetcher, test_config, test_pipeline};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn context() -> RunContext {
        let pipeline = test_pipeline(test_config(1), MockFetcher::new());
        RunContext::new(&pipeline, &CancellationToken::new())
    }

    async fn collect(rx: async_channel::Receiver<TargetUrl>) -> Vec<String> {
        let mut urls = Vec::new();
        while let Ok(url) = rx.recv().await {
            urls.push(url.to_string());
        }
        urls
    }

    #[tokio::test]
    async fn enqueues_valid_urls_in_order_and_skips_the_rest() {
        let ctx = context();
        let input: &[u8] =
            b"http://a.test/1\n\nnot a url\r\nhttps://b.test/2\r\nftp://c.test/3\n  http://d.test/4  ";
        let (tx, rx) = async_channel::bounded(16);

        let handle = spawn_url_source(input, tx, ctx.clone());
        let urls = collect(rx).await;
        handle.await.unwrap().unwrap();

        assert_eq!(
            urls,
            vec!["http://a.test/1", "https://b.test/2", "http://d.test/4"]
        );
        let summary = ctx.stats.snapshot(false, false);
        assert_eq!(summary.lines_read, 6);
        assert_eq!(summary.urls_rejected, 3);
        assert_eq!(summary.urls_enqueued, 3);
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_rejected() {
        let ctx = context();
        let input: &[u8] = b"http://a.test/\xff\xfe\nhttp://b.test/ok\n";
        let (tx, rx) = async_channel::bounded(4);

        let handle = spawn_url_source(input, tx, ctx.clone());
        let urls = collect(rx).await;
        handle.await.unwrap().unwrap();

        assert_eq!(urls, vec!["http://b.test/ok"]);
        assert_eq!(ctx.stats.snapshot(false, false).urls_rejected, 1);
    }

    #[tokio::test]
    async fn empty_input_closes_queue_immediately() {
        let ctx = context();
        let (tx, rx) = async_channel::bounded(4);

        let handle = spawn_url_source(&b""[..], tx, ctx);
        handle.await.unwrap().unwrap();

        assert!(rx.is_closed());
        assert!(rx.recv().await.is_err());
    }

    #[tokio::test]
    async fn full_queue_suspends_source() {
        let ctx = context();
        let input: &[u8] = b"http://a.test/1\nhttp://a.test/2\nhttp://a.test/3\n";
        let (tx, rx) = async_channel::bounded(1);

        let handle = spawn_url_source(input, tx, ctx.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;

        // One URL fits in the queue, the source is parked on the second
        assert_eq!(rx.len(), 1);
        assert!(!handle.is_finished());
        assert!(!rx.is_closed());

        let urls = collect(rx).await;
        handle.await.unwrap().unwrap();
        assert_eq!(urls.len(), 3);
    }

    #[tokio::test]
    async fn cancellation_unblocks_source_and_closes_queue() {
        let ctx = context();
        let input: &[u8] = b"http://a.test/1\nhttp://a.test/2\nhttp://a.test/3\n";
        let (tx, rx) = async_channel::bounded(1);

        let handle = spawn_url_source(input, tx, ctx.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("source did not stop after cancellation")
            .unwrap()
            .unwrap();
        assert!(rx.is_closed());
        assert_eq!(ctx.stats.snapshot(false, true).urls_enqueued, 1);
    }

    #[tokio::test]
    async fn overlong_line_is_rejected_and_reading_resumes_after_it() {
        let ctx = context();
        let mut input = b"http://a.test/".to_vec();
        input.extend(std::iter::repeat_n(b'x', 20 * 1024));
        input.extend_from_slice(b"\nhttp://a.test/ok\n");
        let (tx, rx) = async_channel::bounded(4);

        let reader = tokio::io::BufReader::new(std::io::Cursor::new(input));
        let handle = spawn_url_source(reader, tx, ctx.clone());
        let urls = collect(rx).await;
        handle.await.unwrap().unwrap();

        assert_eq!(urls, vec!["http://a.test/ok"]);
        let summary = ctx.stats.snapshot(false, false);
        assert_eq!(summary.lines_read, 2);
        assert_eq!(summary.urls_rejected, 1);
        assert_eq!(summary.urls_enqueued, 1);
    }

    #[tokio::test]
    async fn overlong_last_line_without_newline_ends_input() {
        let ctx = context();
        let mut input = b"http://a.test/1\n".to_vec();
        input.extend(std::iter::repeat_n(b'y', MAX_LINE_BYTES * 3));
        let (tx, rx) = async_channel::bounded(4);

        let handle = spawn_url_source(std::io::Cursor::new(input), tx, ctx.clone());
        let urls = collect(rx).await;
        handle.await.unwrap().unwrap();

        assert_eq!(urls, vec!["http://a.test/1"]);
        assert_eq!(ctx.stats.snapshot(false, false).urls_rejected, 1);
    }

    #[tokio::test]
    async fn line_at_the_length_limit_is_still_read() {
        let ctx = context();
        let prefix = b"http://a.test/";
        let mut input = prefix.to_vec();
        input.extend(std::iter::repeat_n(b'z', MAX_LINE_BYTES - prefix.len() - 1));
        input.push(b'\n');
        let (tx, rx) = async_channel::bounded(4);

        let handle = spawn_url_source(std::io::Cursor::new(input), tx, ctx.clone());
        let urls = collect(rx).await;
        handle.await.unwrap().unwrap();

        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].len(), MAX_LINE_BYTES - 1);
    }
}
