//! Live counters for a running batch

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    total: AtomicUsize,
}

/// Shared, cheaply cloneable progress counters.
///
/// Readable from any thread while the batch runs, e.g. to drive a progress
/// bar or to assert on the concurrency bound in tests.
#[derive(Debug, Clone, Default)]
pub struct TransferProgress {
    counters: Arc<Counters>,
}

impl TransferProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Units currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    /// Highest [`in_flight`](Self::in_flight) value observed so far.
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.counters.completed.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.counters.failed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.counters.total.load(Ordering::SeqCst)
    }

    /// Start a new batch of `total` units.
    pub(crate) fn begin_batch(&self, total: usize) {
        self.counters.total.store(total, Ordering::SeqCst);
        self.counters.completed.store(0, Ordering::SeqCst);
        self.counters.failed.store(0, Ordering::SeqCst);
    }

    pub(crate) fn unit_started(&self) {
        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    pub(crate) fn unit_finished(&self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn record_completed(&self) {
        self.counters.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_failed(&self) {
        self.counters.failed.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_tracks_the_high_water_mark() {
        let progress = TransferProgress::new();
        progress.unit_started();
        progress.unit_started();
        progress.unit_finished();
        progress.unit_started();

        assert_eq!(progress.in_flight(), 2);
        assert_eq!(progress.peak_in_flight(), 2);
    }

    #[test]
    fn begin_batch_resets_counts_but_not_peak() {
        let progress = TransferProgress::new();
        progress.unit_started();
        progress.record_completed();
        progress.begin_batch(10);

        assert_eq!(progress.total(), 10);
        assert_eq!(progress.completed(), 0);
        assert_eq!(progress.peak_in_flight(), 1);
    }
}
