//! Process-wide scoring counters

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::outcome::{IterationOutcome, IterationReport};

#[derive(Debug, Default)]
pub struct ScoringStats {
    iterations: AtomicU64,
    batches_committed: AtomicU64,
    batches_rolled_back: AtomicU64,
    store_errors: AtomicU64,
    readings_scored: AtomicU64,
    readings_anomalous: AtomicU64,
    readings_degraded: AtomicU64,
    readings_skipped: AtomicU64,
    readings_quarantined: AtomicU64,
    last_commit_at: RwLock<Option<DateTime<Utc>>>,
}

/// Point-in-time copy for logging
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub iterations: u64,
    pub batches_committed: u64,
    pub batches_rolled_back: u64,
    pub store_errors: u64,
    pub readings_scored: u64,
    pub readings_anomalous: u64,
    pub readings_degraded: u64,
    pub readings_skipped: u64,
    pub readings_quarantined: u64,
    pub last_commit_at: Option<DateTime<Utc>>,
}

impl ScoringStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, report: &IterationReport) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
        self.readings_skipped
            .fetch_add(report.skipped() as u64, Ordering::Relaxed);

        match report.outcome {
            IterationOutcome::Committed => {
                self.batches_committed.fetch_add(1, Ordering::Relaxed);
                self.readings_scored
                    .fetch_add(report.scored() as u64, Ordering::Relaxed);
                self.readings_anomalous
                    .fetch_add(report.anomalous() as u64, Ordering::Relaxed);
                self.readings_degraded
                    .fetch_add(report.degraded() as u64, Ordering::Relaxed);
                *self.last_commit_at.write() = Some(Utc::now());
            }
            IterationOutcome::RolledBack => {
                self.batches_rolled_back.fetch_add(1, Ordering::Relaxed);
                self.store_errors.fetch_add(1, Ordering::Relaxed);
            }
            IterationOutcome::StoreUnavailable | IterationOutcome::FetchFailed => {
                self.store_errors.fetch_add(1, Ordering::Relaxed);
            }
            IterationOutcome::Empty => {}
        }
    }

    pub fn record_quarantined(&self) {
        self.readings_quarantined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            iterations: self.iterations.load(Ordering::Relaxed),
            batches_committed: self.batches_committed.load(Ordering::Relaxed),
            batches_rolled_back: self.batches_rolled_back.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            readings_scored: self.readings_scored.load(Ordering::Relaxed),
            readings_anomalous: self.readings_anomalous.load(Ordering::Relaxed),
            readings_degraded: self.readings_degraded.load(Ordering::Relaxed),
            readings_skipped: self.readings_skipped.load(Ordering::Relaxed),
            readings_quarantined: self.readings_quarantined.load(Ordering::Relaxed),
            last_commit_at: *self.last_commit_at.read(),
        }
    }
}
