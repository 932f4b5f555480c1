//! Core types for fetch-jsonl

use crate::error::{FetchError, SkipReason};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::time::Duration;

/// A validated URL taken from one line of the input list.
///
/// Only absolute `http://` or `https://` URLs with a host are accepted. The
/// original spelling (minus surrounding whitespace) is kept, because it is the
/// key written to the output file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetUrl(String);

impl TargetUrl {
    /// Validate one input line.
    ///
    /// Returns `None` for blank lines, lines without an `http://`/`https://`
    /// scheme, and lines that do not parse as a URL with a host.
    pub fn parse(line: &str) -> Option<Self> {
        let candidate = line.trim();
        if !(candidate.starts_with("http://") || candidate.starts_with("https://")) {
            return None;
        }
        let parsed = url::Url::parse(candidate).ok()?;
        if !parsed.has_host() {
            return None;
        }
        Some(Self(candidate.to_string()))
    }

    /// Get the URL as written in the input
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TargetUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TargetUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for TargetUrl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("not an http(s) URL: {s:?}"))
    }
}

impl TryFrom<String> for TargetUrl {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TargetUrl> for String {
    fn from(url: TargetUrl) -> Self {
        url.0
    }
}

/// Terminal outcome for one dequeued URL.
///
/// Every URL a worker takes off the intake queue ends in exactly one of these.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome {
    /// Status 200, JSON content type, body parsed
    Success {
        /// Source URL
        url: TargetUrl,
        /// Parsed response body
        body: serde_json::Value,
    },
    /// The server answered with something that does not belong in the output
    Skipped {
        /// Source URL
        url: TargetUrl,
        /// Why it was skipped
        reason: SkipReason,
    },
    /// The request itself failed
    Failed {
        /// Source URL
        url: TargetUrl,
        /// Transport error
        error: FetchError,
    },
}

impl FetchOutcome {
    /// URL this outcome belongs to
    pub fn url(&self) -> &TargetUrl {
        match self {
            FetchOutcome::Success { url, .. }
            | FetchOutcome::Skipped { url, .. }
            | FetchOutcome::Failed { url, .. } => url,
        }
    }

    /// Whether this outcome produces an output record
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }
}

/// Shape of each output line.
///
/// One format is used for every line of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// `{"<url>": <body>}`
    #[default]
    Keyed,
    /// `{"url": "<url>", "content": <body>}`
    Wrapped,
}

impl std::fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordFormat::Keyed => f.write_str("keyed"),
            RecordFormat::Wrapped => f.write_str("wrapped"),
        }
    }
}

impl std::str::FromStr for RecordFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keyed" => Ok(RecordFormat::Keyed),
            "wrapped" => Ok(RecordFormat::Wrapped),
            other => Err(format!(
                "unknown record format '{other}' (expected 'keyed' or 'wrapped')"
            )),
        }
    }
}

/// A parsed body on its way to the writer.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputRecord {
    /// Source URL
    pub url: TargetUrl,
    /// Parsed response body
    pub content: serde_json::Value,
}

impl OutputRecord {
    /// Serialize into one complete JSON line, newline included.
    pub fn into_line(self, format: RecordFormat) -> serde_json::Result<Vec<u8>> {
        let mut line = match format {
            RecordFormat::Keyed => serde_json::to_vec(&Keyed(&self))?,
            RecordFormat::Wrapped => serde_json::to_vec(&Wrapped {
                url: self.url.as_str(),
                content: &self.content,
            })?,
        };
        line.push(b'\n');
        Ok(line)
    }
}

struct Keyed<'a>(&'a OutputRecord);

impl Serialize for Keyed<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.0.url.as_str(), &self.0.content)?;
        map.end()
    }
}

#[derive(Serialize)]
struct Wrapped<'a> {
    url: &'a str,
    content: &'a serde_json::Value,
}

/// Lifecycle state of a run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Source, workers and writer all active
    Running,
    /// Input exhausted; waiting for workers to finish the queued URLs
    Draining,
    /// Everything joined and the output file closed
    Stopped,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Running => f.write_str("running"),
            PipelineState::Draining => f.write_str("draining"),
            PipelineState::Stopped => f.write_str("stopped"),
        }
    }
}

/// Event emitted during a run
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The run moved to a new lifecycle state
    StateChanged {
        /// New state
        state: PipelineState,
    },

    /// A URL produced a record
    UrlSucceeded {
        /// Source URL
        url: TargetUrl,
    },

    /// A URL answered but was not written
    UrlSkipped {
        /// Source URL
        url: TargetUrl,
        /// Why it was skipped
        reason: SkipReason,
    },

    /// A URL could not be fetched
    UrlFailed {
        /// Source URL
        url: TargetUrl,
        /// Transport error
        error: FetchError,
    },

    /// Workers were still busy when the drain timeout elapsed
    DrainTimedOut {
        /// The timeout that elapsed
        #[serde(with = "secs_f64")]
        timeout: Duration,
    },

    /// The run finished and all resources were released
    Finished {
        /// Final counters
        summary: RunSummary,
    },
}

mod secs_f64 {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

/// Counters describing a finished run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Lines read from the input file
    pub lines_read: u64,
    /// Lines dropped because they were not valid http(s) URLs
    pub urls_rejected: u64,
    /// URLs handed to the intake queue
    pub urls_enqueued: u64,
    /// URLs that produced a record
    pub succeeded: u64,
    /// URLs skipped for protocol or decoding reasons
    pub skipped: u64,
    /// URLs that failed at the transport level (including cancellation)
    pub failed: u64,
    /// Lines written to the output file
    pub records_written: u64,
    /// Whether the drain timeout elapsed with workers still busy
    pub drain_timed_out: bool,
    /// Whether the run was cancelled from outside
    pub cancelled: bool,
}

impl RunSummary {
    /// URLs that reached a terminal outcome
    pub fn processed(&self) -> u64 {
        self.succeeded + self.skipped + self.failed
    }
}
