use super::test_helpers::*;
use super::*;
use crate::error::{Error, FetchError, SkipReason};
use crate::types::{Event, RecordFormat, RunSummary};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;


/// Everything emitted so far, without waiting
fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Per-URL outcome events as `(url, kind)` pairs
fn outcome_events(events: &[Event]) -> Vec<(String, &'static str)> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::UrlSucceeded { url } => Some((url.to_string(), "succeeded")),
            Event::UrlSkipped { url, .. } => Some((url.to_string(), "skipped")),
            Event::UrlFailed { url, .. } => Some((url.to_string(), "failed")),
            _ => None,
        })
        .collect()
}
