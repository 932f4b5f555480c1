//! Shared test helpers: a scripted fetcher and file fixtures.

use crate::config::Config;
use crate::error::FetchError;
use crate::fetcher::{FetchResponse, Fetcher};
use crate::pipeline::Pipeline;
use crate::types::TargetUrl;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted answer for one URL
#[derive(Clone, Debug)]
pub(crate) enum MockReply {
    /// Answer after `delay`; a delay at or beyond the request timeout times out instead
    Respond {
        status: u16,
        content_type: Option<String>,
        body: Bytes,
        delay: Duration,
    },
    /// Fail immediately with a transport error
    Fail(FetchError),
    /// Never answer
    Hang,
}

/// In-memory [`Fetcher`] with per-URL scripted replies.
///
/// Clones share the call log and in-flight counters, so a test can keep one
/// clone for assertions while the pipeline owns another. Unknown URLs answer
/// 404 with a text body.
#[derive(Clone, Default)]
pub(crate) struct MockFetcher {
    routes: HashMap<String, MockReply>,
    calls: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(mut self, url: &str, reply: MockReply) -> Self {
        self.routes.insert(url.to_string(), reply);
        self
    }

    pub(crate) fn respond(self, url: &str, status: u16, content_type: &str, body: &str) -> Self {
        self.reply(
            url,
            MockReply::Respond {
                status,
                content_type: Some(content_type.to_string()),
                body: Bytes::from(body.to_string()),
                delay: Duration::ZERO,
            },
        )
    }

    /// 200 with `application/json`
    pub(crate) fn json(self, url: &str, body: &str) -> Self {
        self.respond(url, 200, "application/json", body)
    }

    pub(crate) fn json_after(self, url: &str, body: &str, delay: Duration) -> Self {
        self.reply(
            url,
            MockReply::Respond {
                status: 200,
                content_type: Some("application/json".to_string()),
                body: Bytes::from(body.to_string()),
                delay,
            },
        )
    }

    pub(crate) fn fail(self, url: &str, error: FetchError) -> Self {
        self.reply(url, MockReply::Fail(error))
    }

    pub(crate) fn hang(self, url: &str) -> Self {
        self.reply(url, MockReply::Hang)
    }

    /// URLs in the order their fetches started
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of fetches that were running at the same time
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Fetches that are running right now
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl<'a> InFlightGuard<'a> {
    fn enter(in_flight: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(in_flight)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(
        &self,
        url: &TargetUrl,
        timeout: Duration,
    ) -> std::result::Result<FetchResponse, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let _guard = InFlightGuard::enter(&self.in_flight, &self.max_in_flight);

        let reply = self
            .routes
            .get(url.as_str())
            .cloned()
            .unwrap_or_else(|| MockReply::Respond {
                status: 404,
                content_type: Some("text/plain".to_string()),
                body: Bytes::from_static(b"not found"),
                delay: Duration::ZERO,
            });

        match reply {
            MockReply::Respond {
                status,
                content_type,
                body,
                delay,
            } => {
                if delay >= timeout {
                    tokio::time::sleep(timeout).await;
                    return Err(FetchError::Timeout(timeout));
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let mut headers = HashMap::new();
                if let Some(content_type) = content_type {
                    headers.insert("content-type".to_string(), content_type);
                }
                Ok(FetchResponse::buffered(status, headers, body))
            }
            MockReply::Fail(error) => Err(error),
            MockReply::Hang => std::future::pending().await,
        }
    }
}

/// Config with short timeouts suitable for tests
pub(crate) fn test_config(max_concurrent: usize) -> Config {
    let mut config = Config::with_max_concurrent(max_concurrent);
    config.pipeline.request_timeout = Duration::from_millis(500);
    config.pipeline.drain_timeout = Duration::from_secs(5);
    config.pipeline.intake_capacity = 4;
    config.pipeline.result_capacity = 4;
    config
}

pub(crate) fn test_pipeline(config: Config, fetcher: MockFetcher) -> Pipeline {
    Pipeline::with_fetcher(config, Arc::new(fetcher)).unwrap()
}

/// Write `lines` to `<dir>/urls.txt`, one per line
pub(crate) fn write_input(dir: &Path, lines: &[&str]) -> PathBuf {
    let path = dir.join("urls.txt");
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(&path, content).unwrap();
    path
}

/// Parse every line of a JSON Lines file
pub(crate) fn read_output(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
