//! Configuration types for fetch-jsonl

use crate::error::{Error, Result};
use crate::types::RecordFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Pipeline sizing and timing (workers, queues, timeouts)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Number of concurrent workers, which is also the cap on in-flight requests (default: 5)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Per-request timeout covering connect, headers and body (default: 10 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Upper bound on the wait for workers to finish once input is exhausted (default: 60 seconds)
    ///
    /// When it elapses, in-flight fetches are cancelled and the run finishes
    /// with whatever was already written.
    #[serde(default = "default_drain_timeout", with = "duration_serde")]
    pub drain_timeout: Duration,

    /// Capacity of the intake queue between the URL source and the workers (default: 1000)
    #[serde(default = "default_queue_capacity")]
    pub intake_capacity: usize,

    /// Capacity of the result queue between the workers and the writer (default: 1000)
    #[serde(default = "default_queue_capacity")]
    pub result_capacity: usize,

    /// Bodies of at least this many bytes are parsed on the blocking pool (default: 1 MiB)
    #[serde(default = "default_blocking_parse_threshold")]
    pub blocking_parse_threshold: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            request_timeout: default_request_timeout(),
            drain_timeout: default_drain_timeout(),
            intake_capacity: default_queue_capacity(),
            result_capacity: default_queue_capacity(),
            blocking_parse_threshold: default_blocking_parse_threshold(),
        }
    }
}

/// HTTP client settings for the built-in reqwest transport
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// TCP/TLS connect timeout (default: 5 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Maximum number of redirects to follow (default: 10)
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Largest JSON response body read, in bytes (default: 512 MiB)
    ///
    /// Only applies once status and content type were accepted; skipped
    /// responses are never downloaded.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout: default_connect_timeout(),
            max_redirects: default_max_redirects(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Output file settings
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Shape of each output line (default: keyed, `{"<url>": <body>}`)
    #[serde(default)]
    pub format: RecordFormat,
}

/// Main configuration
///
/// Every field has a default, so an empty JSON object is a valid config file.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Worker pool, queue and timeout settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// HTTP transport settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Output line format
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Default configuration with a different worker count
    pub fn with_max_concurrent(max_concurrent: usize) -> Self {
        let mut config = Self::default();
        config.pipeline.max_concurrent = max_concurrent;
        config
    }

    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their defaults. The loaded config is validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file '{}': {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse config file '{}': {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every setting is usable
    ///
    /// Zero-sized pools or queues would deadlock the pipeline, and a zero timeout
    /// would fail every request, so all of them are rejected up front.
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.max_concurrent == 0 {
            return Err(Error::config("max_concurrent", "must be at least 1"));
        }
        if p.intake_capacity == 0 {
            return Err(Error::config("intake_capacity", "must be at least 1"));
        }
        if p.result_capacity == 0 {
            return Err(Error::config("result_capacity", "must be at least 1"));
        }
        if p.request_timeout.is_zero() {
            return Err(Error::config("request_timeout", "must be greater than zero"));
        }
        if p.drain_timeout.is_zero() {
            return Err(Error::config("drain_timeout", "must be greater than zero"));
        }
        if self.http.connect_timeout.is_zero() {
            return Err(Error::config("connect_timeout", "must be greater than zero"));
        }
        if self.http.max_body_bytes == 0 {
            return Err(Error::config("max_body_bytes", "must be greater than zero"));
        }
        Ok(())
    }
}

// Default value functions
fn default_max_concurrent() -> usize {
    5
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_drain_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_blocking_parse_threshold() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_user_agent() -> String {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_redirects() -> usize {
    10
}

fn default_max_body_bytes() -> u64 {
    512 * 1024 * 1024 // 512 MiB
}

// Duration serialization helper (whole seconds, or fractional seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_u64(duration.as_secs())
        } else {
            serializer.serialize_f64(duration.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
