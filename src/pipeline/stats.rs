//! Run counters shared by the source, workers and writer.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::RunSummary;

#[derive(Debug, Default)]
pub(crate) struct RunStats {
    lines_read: AtomicU64,
    urls_rejected: AtomicU64,
    urls_enqueued: AtomicU64,
    succeeded: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    records_written: AtomicU64,
}

impl RunStats {
    pub(crate) fn line_read(&self) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn url_rejected(&self) {
        self.urls_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn url_enqueued(&self) {
        self.urls_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_written(&self) {
        self.records_written.fetch_add(1, Ordering::Relaxed);
    }

    // Exactly one of the three outcome counters moves per dequeued URL

    pub(crate) fn success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, drain_timed_out: bool, cancelled: bool) -> RunSummary {
        RunSummary {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            urls_rejected: self.urls_rejected.load(Ordering::Relaxed),
            urls_enqueued: self.urls_enqueued.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            drain_timed_out,
            cancelled,
        }
    }
}
