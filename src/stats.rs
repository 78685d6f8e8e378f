//! Shared run statistics and id allocation.
//!
//! One [`FuzzStats`] instance is shared by the queue manager, the stages,
//! and the generator. Counters live behind a single lock; the cancel flag
//! and the id allocator are atomics so hot paths never contend.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Default)]
struct Counters {
    pending_fuzz: i64,
    pending_seeds: i64,
    processed: u64,
    backfeed: u64,
    filtered: u64,
    begin: Option<Instant>,
    totaltime: f64,
}

/// Process-wide mutable counters for one run.
#[derive(Debug, Default)]
pub struct FuzzStats {
    counters: Mutex<Counters>,
    cancelled: AtomicBool,
    next_id: AtomicU64,
    /// Expected number of generated requests, when the dictionary is countable.
    total: Mutex<Option<u64>>,
}

/// A point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct FuzzSnapshot {
    /// Requests emitted but not yet delivered (or dropped) downstream.
    pub pending_fuzz: i64,
    /// Seeds whose generator pass has not finished draining.
    pub pending_seeds: i64,
    /// Exchanges completed by the HTTP (or dry-run) stage.
    pub processed: u64,
    /// Requests injected by plugins or recursion.
    pub backfeed: u64,
    /// Results dropped by the slice or filter stages.
    pub filtered: u64,
    /// Whether the run was cancelled.
    pub cancelled: bool,
    /// Expected request count, if known up front.
    pub total: Option<u64>,
    /// Seconds elapsed between start and finish (or now, while running).
    pub totaltime: f64,
}

impl FuzzStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next monotonic result id.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn set_cancelled(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Record the expected request count from the generator.
    pub fn set_total(&self, total: Option<u64>) {
        *self.total.lock().unwrap() = total;
    }

    pub fn mark_start(&self) {
        let mut c = self.counters.lock().unwrap();
        c.begin = Some(Instant::now());
    }

    pub fn mark_end(&self) {
        let mut c = self.counters.lock().unwrap();
        if let Some(begin) = c.begin {
            c.totaltime = begin.elapsed().as_secs_f64();
        }
    }

    /// A request was emitted into the pipeline.
    pub fn fuzz_added(&self) {
        self.counters.lock().unwrap().pending_fuzz += 1;
    }

    /// A request reached the end of the pipeline or was dropped.
    /// Returns true when no work remains anywhere.
    pub fn fuzz_removed(&self) -> bool {
        let mut c = self.counters.lock().unwrap();
        c.pending_fuzz -= 1;
        c.pending_fuzz <= 0 && c.pending_seeds <= 0
    }

    /// A seed entered the pipeline (initial kick or recursion).
    pub fn seed_added(&self) {
        self.counters.lock().unwrap().pending_seeds += 1;
    }

    /// A seed's end marker was consumed. Returns true when no work remains.
    pub fn seed_removed(&self) -> bool {
        let mut c = self.counters.lock().unwrap();
        c.pending_seeds -= 1;
        c.pending_fuzz <= 0 && c.pending_seeds <= 0
    }

    pub fn mark_processed(&self) {
        self.counters.lock().unwrap().processed += 1;
    }

    pub fn mark_backfeed(&self) {
        self.counters.lock().unwrap().backfeed += 1;
    }

    pub fn mark_filtered(&self) {
        self.counters.lock().unwrap().filtered += 1;
    }

    pub fn snapshot(&self) -> FuzzSnapshot {
        let c = self.counters.lock().unwrap();
        FuzzSnapshot {
            pending_fuzz: c.pending_fuzz,
            pending_seeds: c.pending_seeds,
            processed: c.processed,
            backfeed: c.backfeed,
            filtered: c.filtered,
            cancelled: self.cancelled(),
            total: *self.total.lock().unwrap(),
            totaltime: if c.totaltime > 0.0 {
                c.totaltime
            } else {
                c.begin.map(|b| b.elapsed().as_secs_f64()).unwrap_or(0.0)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_strictly_increasing() {
        let stats = FuzzStats::new();
        let a = stats.next_id();
        let b = stats.next_id();
        let c = stats.next_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_pending_accounting() {
        let stats = FuzzStats::new();
        stats.seed_added();
        stats.fuzz_added();
        stats.fuzz_added();

        assert!(!stats.fuzz_removed());
        assert!(!stats.fuzz_removed()); // seeds still pending
        assert!(stats.seed_removed());

        let snap = stats.snapshot();
        assert_eq!(snap.pending_fuzz, 0);
        assert_eq!(snap.pending_seeds, 0);
    }

    #[test]
    fn test_cancel_flag() {
        let stats = FuzzStats::new();
        assert!(!stats.cancelled());
        stats.set_cancelled();
        assert!(stats.cancelled());
        assert!(stats.snapshot().cancelled);
    }

    #[test]
    fn test_counters_in_snapshot() {
        let stats = FuzzStats::new();
        stats.mark_processed();
        stats.mark_processed();
        stats.mark_backfeed();
        stats.mark_filtered();
        let snap = stats.snapshot();
        assert_eq!(snap.processed, 2);
        assert_eq!(snap.backfeed, 1);
        assert_eq!(snap.filtered, 1);
    }
}
