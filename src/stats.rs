use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Tracks pass and reconciliation counters for the bridge
#[derive(Debug, Default)]
pub struct BridgeStats {
    /// Update passes that ran to completion
    passes: AtomicU64,

    /// Update ticks skipped because a pass was already in flight
    busy_skips: AtomicU64,

    /// Update ticks skipped because the timestamp did not advance
    stale_skips: AtomicU64,

    /// Reconcile ticks skipped because reconciliation was cooling down
    reconcile_skips: AtomicU64,

    /// Recoverable update() failures, actors and pseudo actors
    update_failures: AtomicU64,

    actors_created: AtomicU64,
    actors_removed: AtomicU64,

    /// Wall-clock time of the last completed update pass
    last_pass_at: RwLock<Option<DateTime<Utc>>>,
}

impl BridgeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed pass and the failures it caught
    pub fn record_pass(&self, failures: usize) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.update_failures
            .fetch_add(failures as u64, Ordering::Relaxed);

        let mut last = self
            .last_pass_at
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *last = Some(Utc::now());
    }

    pub fn record_busy_skip(&self) {
        self.busy_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_skip(&self) {
        self.stale_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconcile_skip(&self) {
        self.reconcile_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconcile(&self, created: usize, removed: usize) {
        self.actors_created
            .fetch_add(created as u64, Ordering::Relaxed);
        self.actors_removed
            .fetch_add(removed as u64, Ordering::Relaxed);
    }

    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            passes: self.passes(),
            busy_skips: self.busy_skips.load(Ordering::Relaxed),
            stale_skips: self.stale_skips.load(Ordering::Relaxed),
            reconcile_skips: self.reconcile_skips.load(Ordering::Relaxed),
            update_failures: self.update_failures.load(Ordering::Relaxed),
            actors_created: self.actors_created.load(Ordering::Relaxed),
            actors_removed: self.actors_removed.load(Ordering::Relaxed),
            last_pass_at: *self
                .last_pass_at
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}

/// Snapshot of bridge counters at a point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub passes: u64,
    pub busy_skips: u64,
    pub stale_skips: u64,
    pub reconcile_skips: u64,
    pub update_failures: u64,
    pub actors_created: u64,
    pub actors_removed: u64,
    pub last_pass_at: Option<DateTime<Utc>>,
}
