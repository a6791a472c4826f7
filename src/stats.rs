use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live counters shared between the coordinator and its encode workers.
/// Read them from any thread via `ShotCoordinator::stats()`.
#[derive(Debug, Default)]
pub struct ShotStats {
    /// Calls to `advance()` so far.
    pub frames_advanced: AtomicU64,
    /// Requests accepted into a slot queue.
    pub requests_queued: AtomicU64,
    /// Requests discarded because their frame could not be captured or the
    /// coordinator shut down before copying them.
    pub requests_dropped: AtomicU64,
    /// Encode tasks handed to the pool.
    pub tasks_dispatched: AtomicU64,
    pub files_written: AtomicU64,
    pub encode_failures: AtomicU64,
    /// Cycles whose copy was skipped after a capture error.
    pub copies_failed: AtomicU64,
    /// Reuse barriers that outlasted `barrier_warn_after`.
    pub barrier_stalls: AtomicU64,
    /// Exponentially-weighted moving average of the reuse barrier wait in
    /// nanoseconds, stored as `f64` bits.
    pub barrier_wait_avg_ns: AtomicU64,
}

const BARRIER_WAIT_ALPHA: f64 = 0.1;

impl ShotStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        if n > 0 {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    /// Fold one barrier wait into the moving average. Only the coordinator
    /// thread records waits, so a plain load/store is enough.
    pub(crate) fn record_barrier_wait(&self, waited: Duration) {
        let previous = f64::from_bits(self.barrier_wait_avg_ns.load(Ordering::Relaxed));
        let sample = waited.as_nanos() as f64;
        let next = BARRIER_WAIT_ALPHA * sample + (1.0 - BARRIER_WAIT_ALPHA) * previous;
        self.barrier_wait_avg_ns.store(next.to_bits(), Ordering::Relaxed);
    }

    /// Snapshot the current stats into plain values.
    pub fn snapshot(&self) -> ShotStatsSnapshot {
        ShotStatsSnapshot {
            frames_advanced: self.frames_advanced.load(Ordering::Relaxed),
            requests_queued: self.requests_queued.load(Ordering::Relaxed),
            requests_dropped: self.requests_dropped.load(Ordering::Relaxed),
            tasks_dispatched: self.tasks_dispatched.load(Ordering::Relaxed),
            files_written: self.files_written.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            copies_failed: self.copies_failed.load(Ordering::Relaxed),
            barrier_stalls: self.barrier_stalls.load(Ordering::Relaxed),
            barrier_wait_avg: Duration::from_nanos(f64::from_bits(
                self.barrier_wait_avg_ns.load(Ordering::Relaxed),
            ) as u64),
        }
    }
}

/// A point-in-time copy of [`ShotStats`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShotStatsSnapshot {
    pub frames_advanced: u64,
    pub requests_queued: u64,
    pub requests_dropped: u64,
    pub tasks_dispatched: u64,
    pub files_written: u64,
    pub encode_failures: u64,
    pub copies_failed: u64,
    pub barrier_stalls: u64,
    pub barrier_wait_avg: Duration,
}
