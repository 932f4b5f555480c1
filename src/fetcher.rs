//! The fetch capability: one GET request with a deadline.
//!
//! The pipeline depends only on the [`Fetcher`] trait. [`HttpFetcher`] is the
//! production implementation on top of a shared `reqwest::Client`; tests plug in
//! scripted fetchers through [`Pipeline::with_fetcher`](crate::Pipeline::with_fetcher).
//!
//! A fetch resolves as soon as the status line and headers are in. The body
//! stays on the wire behind a [`BodyReader`] until the caller decides it wants
//! it, so responses that will be skipped are never downloaded.

use crate::config::HttpConfig;
use crate::error::{FetchError, Result};
use crate::types::TargetUrl;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

/// Incremental access to a response body.
#[async_trait::async_trait]
pub trait BodyReader: Send {
    /// Next chunk of the body, or `None` once it is complete
    async fn next_chunk(&mut self) -> std::result::Result<Option<Bytes>, FetchError>;
}

/// A body that is already in memory
#[derive(Debug, Default)]
pub struct BufferedBody(Option<Bytes>);

impl BufferedBody {
    /// Wrap bytes as a single-chunk body
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self(Some(body.into()))
    }
}

#[async_trait::async_trait]
impl BodyReader for BufferedBody {
    async fn next_chunk(&mut self) -> std::result::Result<Option<Bytes>, FetchError> {
        Ok(self.0.take().filter(|chunk| !chunk.is_empty()))
    }
}

/// Status and headers of a response whose body has not been read yet
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers with lower-cased names
    pub headers: HashMap<String, String>,
    /// Body size announced by the server, if any
    pub content_length: Option<u64>,
    /// The unread body
    pub body: Box<dyn BodyReader>,
}

impl std::fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl FetchResponse {
    /// Response with an in-memory body
    pub fn buffered(status: u16, headers: HashMap<String, String>, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            status,
            headers,
            content_length: Some(body.len() as u64),
            body: Box::new(BufferedBody::new(body)),
        }
    }

    /// Value of the `Content-Type` header, if present
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    /// Read the whole body, giving up once it exceeds `limit` bytes.
    ///
    /// A declared `Content-Length` above the limit fails before anything is read.
    pub async fn read_body(self, limit: u64) -> std::result::Result<Bytes, FetchError> {
        if let Some(len) = self.content_length
            && len > limit
        {
            return Err(FetchError::BodyTooLarge { size: len, limit });
        }

        let mut reader = self.body;
        let mut body = Vec::with_capacity(self.content_length.map_or(0, |len| len as usize));
        while let Some(chunk) = reader.next_chunk().await? {
            let size = (body.len() + chunk.len()) as u64;
            if size > limit {
                return Err(FetchError::BodyTooLarge { size, limit });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(body))
    }
}

/// Abstraction over HTTP fetching, enabling testability.
///
/// Implementations should give up once `timeout` has elapsed and report
/// [`FetchError::Timeout`]; the pipeline enforces the same deadline around
/// every call and the body read that follows. They never retry.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Send a GET for `url` and return once the response head has arrived
    async fn fetch(
        &self,
        url: &TargetUrl,
        timeout: Duration,
    ) -> std::result::Result<FetchResponse, FetchError>;
}

/// Production [`Fetcher`] backed by a pooled reqwest client.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build the client from HTTP settings
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client })
    }

    fn classify(err: &reqwest::Error, timeout: Duration) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(timeout)
        } else if err.is_connect() {
            FetchError::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            FetchError::Body(err.to_string())
        } else {
            FetchError::Request(err.to_string())
        }
    }
}

/// Body of a reqwest response, read chunk by chunk
struct HttpBody {
    response: reqwest::Response,
    timeout: Duration,
}

#[async_trait::async_trait]
impl BodyReader for HttpBody {
    async fn next_chunk(&mut self) -> std::result::Result<Option<Bytes>, FetchError> {
        self.response
            .chunk()
            .await
            .map_err(|e| HttpFetcher::classify(&e, self.timeout))
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &TargetUrl,
        timeout: Duration,
    ) -> std::result::Result<FetchResponse, FetchError> {
        // reqwest's timeout keeps running while the body is read
        let request = self.client.get(url.as_str()).timeout(timeout).send();
        let response = match tokio::time::timeout(timeout, request).await {
            Ok(result) => result.map_err(|e| Self::classify(&e, timeout))?,
            Err(_) => return Err(FetchError::Timeout(timeout)),
        };

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Ok(FetchResponse {
            status: response.status().as_u16(),
            headers,
            content_length: response.content_length(),
            body: Box::new(HttpBody { response, timeout }),
        })
    }
}
