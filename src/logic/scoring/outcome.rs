//! Tagged per-record and per-iteration results

use serde::Serialize;

use crate::models::{ReadingId, Verdict};

/// What happened to one reading in a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    Scored {
        id: ReadingId,
        verdict: Verdict,
    },
    /// Scored with an all-zero device slice: the device was unseen in training
    Degraded {
        id: ReadingId,
        verdict: Verdict,
        device_id: String,
    },
    SkippedMissingDevice {
        id: ReadingId,
    },
    SkippedBuildError {
        id: ReadingId,
        reason: String,
    },
    SkippedPredictError {
        id: ReadingId,
        reason: String,
    },
}

impl RecordOutcome {
    pub fn id(&self) -> ReadingId {
        match self {
            RecordOutcome::Scored { id, .. }
            | RecordOutcome::Degraded { id, .. }
            | RecordOutcome::SkippedMissingDevice { id }
            | RecordOutcome::SkippedBuildError { id, .. }
            | RecordOutcome::SkippedPredictError { id, .. } => *id,
        }
    }

    /// Verdict to stage, if the reading was scored
    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            RecordOutcome::Scored { verdict, .. } | RecordOutcome::Degraded { verdict, .. } => {
                Some(*verdict)
            }
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.verdict().is_none()
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, RecordOutcome::Degraded { .. })
    }
}

/// How an iteration ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationOutcome {
    /// No connection could be acquired
    StoreUnavailable,
    /// The unscored query failed
    FetchFailed,
    /// Nothing to score
    Empty,
    /// Batch transaction committed
    Committed,
    /// Staging or commit failed; nothing from the batch was persisted
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationReport {
    pub outcome: IterationOutcome,
    pub records: Vec<RecordOutcome>,
}

impl IterationReport {
    pub fn new(outcome: IterationOutcome) -> Self {
        Self {
            outcome,
            records: Vec::new(),
        }
    }

    pub fn with_records(outcome: IterationOutcome, records: Vec<RecordOutcome>) -> Self {
        Self { outcome, records }
    }

    pub fn fetched(&self) -> usize {
        self.records.len()
    }

    pub fn scored(&self) -> usize {
        self.records.iter().filter(|r| !r.is_skipped()).count()
    }

    pub fn anomalous(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.verdict() == Some(Verdict::Anomalous))
            .count()
    }

    pub fn degraded(&self) -> usize {
        self.records.iter().filter(|r| r.is_degraded()).count()
    }

    pub fn skipped(&self) -> usize {
        self.records.iter().filter(|r| r.is_skipped()).count()
    }

    pub fn is_committed(&self) -> bool {
        self.outcome == IterationOutcome::Committed
    }

    /// Outcome for a specific reading
    #[cfg(test)]
    pub fn record(&self, id: ReadingId) -> Option<&RecordOutcome> {
        self.records.iter().find(|r| r.id() == id)
    }
}
