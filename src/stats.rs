use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between the loggers and the batcher.
///
/// Every record that makes it into the queue ends up in exactly one of
/// `sent`, `dropped_permanent`, `dropped_exhausted` or `dropped_shutdown`.
#[derive(Debug, Default)]
pub(crate) struct Stats {
    pub(crate) submitted: AtomicU64,
    pub(crate) enqueued: AtomicU64,
    pub(crate) rejected: AtomicU64,
    pub(crate) dropped_overflow: AtomicU64,
    pub(crate) sent: AtomicU64,
    pub(crate) dropped_permanent: AtomicU64,
    pub(crate) dropped_exhausted: AtomicU64,
    pub(crate) dropped_shutdown: AtomicU64,
    pub(crate) batches_sent: AtomicU64,
    pub(crate) retries: AtomicU64,
}

impl Stats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Records enqueued but not yet sent or dropped.
    pub(crate) fn outstanding(&self) -> u64 {
        let snapshot = self.snapshot();
        snapshot.enqueued.saturating_sub(snapshot.resolved())
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Acquire),
            enqueued: self.enqueued.load(Ordering::Acquire),
            rejected: self.rejected.load(Ordering::Acquire),
            dropped_overflow: self.dropped_overflow.load(Ordering::Acquire),
            sent: self.sent.load(Ordering::Acquire),
            dropped_permanent: self.dropped_permanent.load(Ordering::Acquire),
            dropped_exhausted: self.dropped_exhausted.load(Ordering::Acquire),
            dropped_shutdown: self.dropped_shutdown.load(Ordering::Acquire),
            batches_sent: self.batches_sent.load(Ordering::Acquire),
            retries: self.retries.load(Ordering::Acquire),
        }
    }
}

/// Point-in-time copy of a client's counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Events that reached a logger at or above its minimum level.
    pub submitted: u64,
    /// Records accepted into the queue.
    pub enqueued: u64,
    /// Calls dropped by validation.
    pub rejected: u64,
    /// Records dropped because the queue was full.
    pub dropped_overflow: u64,
    /// Records the collector accepted.
    pub sent: u64,
    /// Records in batches the collector rejected permanently.
    pub dropped_permanent: u64,
    /// Records in batches that ran out of retry attempts.
    pub dropped_exhausted: u64,
    /// Records still pending when the shutdown deadline expired.
    pub dropped_shutdown: u64,
    /// Successful collector calls.
    pub batches_sent: u64,
    /// Attempts beyond the first, across all batches.
    pub retries: u64,
}

impl StatsSnapshot {
    /// Enqueued records whose fate is settled.
    pub fn resolved(&self) -> u64 {
        self.sent + self.dropped_permanent + self.dropped_exhausted + self.dropped_shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outstanding_tracks_unresolved_records() {
        let stats = Stats::default();
        Stats::add(&stats.enqueued, 10);
        Stats::add(&stats.sent, 6);
        Stats::add(&stats.dropped_permanent, 1);
        assert_eq!(stats.outstanding(), 3);

        Stats::add(&stats.dropped_shutdown, 3);
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(stats.snapshot().resolved(), 10);
    }
}
