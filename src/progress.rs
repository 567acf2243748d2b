use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::ProgressCadence;

/// Shared atomic counters updated by indexer/writer worker threads at chunk
/// boundaries. No UI lives here; a caller observes these through a
/// [`ProgressSink`] or by polling the getters directly.
pub struct Progress {
    bytes_indexed: AtomicU64,
    rows_indexed: AtomicU64,
    bytes_total: AtomicU64,
    started: Instant,
    last_report: Mutex<Option<Instant>>,
}

impl Progress {
    pub fn new(bytes_total: u64) -> Arc<Self> {
        Arc::new(Self {
            bytes_indexed: AtomicU64::new(0),
            rows_indexed: AtomicU64::new(0),
            bytes_total: AtomicU64::new(bytes_total),
            started: Instant::now(),
            last_report: Mutex::new(None),
        })
    }

    pub(crate) fn add_bytes(&self, n: u64) {
        self.bytes_indexed.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_rows(&self, n: u64) {
        self.rows_indexed.fetch_add(n, Ordering::Relaxed);
    }

    /// Calls `sink.on_progress` if both `cadence.show_after` has elapsed
    /// since this `Progress` was created and `cadence.update_interval` has
    /// elapsed since the last call that actually reported. Safe to call
    /// concurrently from several worker threads; only one wins each window.
    pub(crate) fn report_if_due(&self, sink: &dyn ProgressSink, cadence: &ProgressCadence) {
        let now = Instant::now();

        if now.duration_since(self.started) < cadence.show_after {
            return;
        }

        let mut last = self.last_report.lock().unwrap();
        let due = last.map_or(true, |prev| now.duration_since(prev) >= cadence.update_interval);

        if due {
            *last = Some(now);
            drop(last);
            sink.on_progress(self);
        }
    }

    pub fn bytes_indexed(&self) -> u64 {
        self.bytes_indexed.load(Ordering::Relaxed)
    }

    pub fn rows_indexed(&self) -> u64 {
        self.rows_indexed.load(Ordering::Relaxed)
    }

    pub fn bytes_total(&self) -> u64 {
        self.bytes_total.load(Ordering::Relaxed)
    }

    pub fn fraction(&self) -> f64 {
        let total = self.bytes_total();

        if total == 0 {
            1.0
        } else {
            self.bytes_indexed() as f64 / total as f64
        }
    }
}

/// A caller-supplied sink the core notifies of progress snapshots. The core
/// never spawns or drives a UI thread; it only calls this at its own
/// cadence, gated by [`crate::config::ProgressCadence`].
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: &Progress);
}

/// A sink that drops every update, used when progress reporting is disabled.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&self, _progress: &Progress) {}
}

/// Bundles the counters a chunk of indexing work reports into with the
/// caller's sink and cadence, so the indexer's worker threads can carry a
/// single `Copy` value instead of three separate optionals. Built once per
/// [`crate::indexer::build_index`] call; shared, unchanged, across every
/// worker thread a parallel scan spawns.
#[derive(Clone, Copy)]
pub(crate) struct ProgressCtx<'a> {
    pub progress: &'a Progress,
    pub sink: Option<&'a dyn ProgressSink>,
    pub cadence: ProgressCadence,
}

impl<'a> ProgressCtx<'a> {
    /// Adds `bytes`/`rows` to the shared counters and, if a sink is
    /// registered, asks it to report provided the cadence allows it.
    pub(crate) fn advance(&self, bytes: u64, rows: u64) {
        self.progress.add_bytes(bytes);
        self.progress.add_rows(rows);

        if let Some(sink) = self.sink {
            self.progress.report_if_due(sink, &self.cadence);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let progress = Progress::new(100);
        progress.add_bytes(25);
        progress.add_rows(3);

        assert_eq!(progress.bytes_indexed(), 25);
        assert_eq!(progress.rows_indexed(), 3);
        assert_eq!(progress.fraction(), 0.25);
    }

    #[test]
    fn test_fraction_with_unknown_total() {
        let progress = Progress::new(0);
        assert_eq!(progress.fraction(), 1.0);
    }

    struct CountingSink {
        calls: std::sync::atomic::AtomicU64,
    }

    impl ProgressSink for CountingSink {
        fn on_progress(&self, _progress: &Progress) {
            self.calls.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_report_if_due_respects_show_after() {
        let progress = Progress::new(100);
        let sink = CountingSink { calls: std::sync::atomic::AtomicU64::new(0) };
        let cadence = ProgressCadence {
            show_after: std::time::Duration::from_secs(3600),
            update_interval: std::time::Duration::from_millis(0),
        };

        progress.report_if_due(&sink, &cadence);
        assert_eq!(sink.calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_report_if_due_fires_once_interval_elapsed() {
        let progress = Progress::new(100);
        let sink = CountingSink { calls: std::sync::atomic::AtomicU64::new(0) };
        let cadence = ProgressCadence {
            show_after: std::time::Duration::from_millis(0),
            update_interval: std::time::Duration::from_secs(3600),
        };

        progress.report_if_due(&sink, &cadence);
        progress.report_if_due(&sink, &cadence);
        assert_eq!(sink.calls.load(Ordering::Relaxed), 1);
    }
}
