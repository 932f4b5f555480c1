//! Error types for fetch-jsonl
//!
//! Errors fall into two tiers:
//! - [`Error`] is returned to the caller. It covers setup failures (bad
//!   configuration, unreadable input, uncreatable output) and the few runtime
//!   failures that abort a whole run (the output file stops accepting writes).
//! - [`FetchError`] and [`SkipReason`] describe what happened to a single URL.
//!   They are recorded in a [`FetchOutcome`](crate::types::FetchOutcome),
//!   logged, and never escape the worker that produced them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for fetch-jsonl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for fetch-jsonl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent")
        key: Option<String>,
    },

    /// The URL list could not be opened or read
    #[error("failed to read input file {path}: {source}")]
    Input {
        /// Path of the input file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The output file could not be created or written
    #[error("failed to write output file {path}: {source}")]
    Output {
        /// Path of the output file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// HTTP client construction error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A pipeline task panicked or was aborted
    #[error("pipeline task failed: {0}")]
    TaskJoin(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key.
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Transport-level failure for a single URL.
///
/// Produced by a [`Fetcher`](crate::fetcher::Fetcher) or by the worker that
/// drives it. A `FetchError` turns the URL's outcome into `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchError {
    /// The request did not complete within the per-request timeout
    #[error("request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// A connection to the host could not be established
    #[error("connection failed: {0}")]
    Connect(String),

    /// The response body could not be read to completion
    #[error("failed to read response body: {0}")]
    Body(String),

    /// The declared or received body exceeds the configured maximum
    #[error("response body of {size} bytes exceeds limit of {limit} bytes")]
    BodyTooLarge {
        /// Size reported by the server or observed while reading
        size: u64,
        /// Configured limit
        limit: u64,
    },

    /// Any other request failure (invalid request, redirect loop, TLS, ...)
    #[error("request failed: {0}")]
    Request(String),

    /// The run was cancelled while this URL was being fetched
    #[error("cancelled before completion")]
    Cancelled,

    /// The record was parsed but the writer was no longer accepting records
    #[error("writer closed before the record could be queued")]
    WriterClosed,
}

/// Protocol or decoding reason for skipping a URL.
///
/// The server answered, but not with something that belongs in the output.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// The response status was not 200
    #[error("status {0}")]
    Status(u16),

    /// Status 200, but the content type does not denote JSON
    #[error("non-JSON content type {0:?}")]
    ContentType(String),

    /// Status 200 with a JSON content type, but the body failed to parse
    #[error("invalid JSON body: {0}")]
    InvalidJson(String),
}

/// Machine-readable code for structured log fields and event consumers.
pub trait ReasonCode {
    /// Short stable identifier (e.g., "timeout", "status")
    fn code(&self) -> &'static str;
}

impl ReasonCode for FetchError {
    fn code(&self) -> &'static str {
        match self {
            FetchError::Timeout(_) => "timeout",
            FetchError::Connect(_) => "connect",
            FetchError::Body(_) => "body",
            FetchError::BodyTooLarge { .. } => "body_too_large",
            FetchError::Request(_) => "request",
            FetchError::Cancelled => "cancelled",
            FetchError::WriterClosed => "writer_closed",
        }
    }
}

impl ReasonCode for SkipReason {
    fn code(&self) -> &'static str {
        match self {
            SkipReason::Status(_) => "status",
            SkipReason::ContentType(_) => "content_type",
            SkipReason::InvalidJson(_) => "invalid_json",
        }
    }
}
