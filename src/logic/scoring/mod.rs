//! Scoring Loop - Store -> Features -> Model -> Store
//!
//! One iteration:
//! 1. acquire a session (retry after `poll_interval` if the store is down)
//! 2. fetch up to `batch_size` unscored readings, oldest first
//! 3. empty batch: wait `poll_interval`
//! 4. per reading: build features, predict, stage the verdict; a bad reading
//!    is skipped and never fails the batch
//! 5. commit the batch as one transaction, or roll it all back
//! 6. release the session, then pause `settle_delay` whatever happened
//!
//! Nothing escapes an iteration: every failure ends in a log line and an
//! [`IterationOutcome`].

pub mod outcome;
pub mod pacer;
pub mod quarantine;
pub mod stats;


use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::logic::features::{self, DeviceMatch, FeatureError};
use crate::logic::model::{self, ModelHandle, ModelLoadError};
use crate::logic::store::{ReadingStore, ScoringSession};
use crate::models::{Reading, ReadingId};

pub use outcome::{IterationOutcome, IterationReport, RecordOutcome};
pub use pacer::{Pacer, PauseReason, TokioPacer};
pub use quarantine::Quarantine;
pub use stats::ScoringStats;

/// Loop tuning
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub poll_interval: Duration,
    pub settle_delay: Duration,
    pub batch_size: u32,
    pub max_record_attempts: u32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            settle_delay: Duration::from_secs(2),
            batch_size: 100,
            max_record_attempts: 5,
        }
    }
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            settle_delay: config.settle_delay,
            batch_size: config.batch_size,
            max_record_attempts: config.max_record_attempts,
        }
    }
}

pub struct ScoringLoop<S, P> {
    model: Arc<ModelHandle>,
    store: S,
    pacer: P,
    settings: LoopSettings,
    quarantine: Quarantine,
    stats: Arc<ScoringStats>,
}

impl<S, P> ScoringLoop<S, P>
where
    S: ReadingStore,
    P: Pacer,
{
    pub fn new(model: Arc<ModelHandle>, store: S, pacer: P, settings: LoopSettings) -> Self {
        let quarantine = Quarantine::new(settings.max_record_attempts);
        Self {
            model,
            store,
            pacer,
            settings,
            quarantine,
            stats: Arc::new(ScoringStats::new()),
        }
    }

    /// Load the model first; the store is not touched unless that succeeds
    pub fn from_artifact(
        path: &Path,
        expected_sha256: Option<&str>,
        store: S,
        pacer: P,
        settings: LoopSettings,
    ) -> Result<Self, ModelLoadError> {
        let model = model::load_model(path, expected_sha256)?;
        Ok(Self::new(Arc::new(model), store, pacer, settings))
    }

    pub fn model(&self) -> &Arc<ModelHandle> {
        &self.model
    }

    pub fn stats(&self) -> Arc<ScoringStats> {
        Arc::clone(&self.stats)
    }

    pub fn quarantine(&self) -> &Quarantine {
        &self.quarantine
    }

    /// Run until the task is dropped
    pub async fn run(&mut self) {
        tracing::info!(
            batch_size = self.settings.batch_size,
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            "Scoring loop started, waiting for new readings"
        );

        loop {
            self.run_iteration().await;
        }
    }

    /// One full iteration including bookkeeping and the settle pause
    pub async fn run_iteration(&mut self) -> IterationReport {
        let report = self.iterate().await;

        self.stats.record(&report);
        self.update_quarantine(&report);

        self.pacer
            .pause(self.settings.settle_delay, PauseReason::Settle)
            .await;

        report
    }

    async fn iterate(&mut self) -> IterationReport {
        let mut session = match self.store.acquire().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(
                    "Store connection failed, retrying in {}s: {}",
                    self.settings.poll_interval.as_secs(),
                    e
                );
                self.pacer
                    .pause(self.settings.poll_interval, PauseReason::StoreUnavailable)
                    .await;
                return IterationReport::new(IterationOutcome::StoreUnavailable);
            }
        };

        let excluded = self.quarantine.excluded();
        let batch = match session
            .fetch_unscored(self.settings.batch_size, &excluded)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!("Failed to fetch unscored readings: {}", e);
                release(session).await;
                return IterationReport::new(IterationOutcome::FetchFailed);
            }
        };

        if batch.is_empty() {
            release(session).await;
            tracing::debug!(
                "No new readings, sleeping {}s",
                self.settings.poll_interval.as_secs()
            );
            self.pacer
                .pause(self.settings.poll_interval, PauseReason::Idle)
                .await;
            return IterationReport::new(IterationOutcome::Empty);
        }

        tracing::info!("Found {} unscored readings, processing", batch.len());

        let mut records = Vec::with_capacity(batch.len());
        for reading in &batch {
            let outcome = self.score(reading);

            if let Some(verdict) = outcome.verdict() {
                if let Err(e) = session.stage(reading.id, verdict).await {
                    tracing::error!(
                        reading_id = reading.id,
                        "Failed to stage anomaly status, rolling back batch: {}",
                        e
                    );
                    records.push(outcome);
                    release(session).await;
                    return IterationReport::with_records(IterationOutcome::RolledBack, records);
                }
            }

            records.push(outcome);
        }

        let report = match session.commit().await {
            Ok(()) => IterationReport::with_records(IterationOutcome::Committed, records),
            Err(e) => {
                tracing::error!(
                    "Batch commit failed, {} readings left unscored: {}",
                    batch.len(),
                    e
                );
                return IterationReport::with_records(IterationOutcome::RolledBack, records);
            }
        };

        tracing::info!(
            fetched = report.fetched(),
            scored = report.scored(),
            anomalous = report.anomalous(),
            degraded = report.degraded(),
            skipped = report.skipped(),
            "Batch committed"
        );

        report
    }

    /// Score one reading. Never fails; the outcome says what happened.
    fn score(&self, reading: &Reading) -> RecordOutcome {
        let id = reading.id;

        if reading.device().is_none() {
            tracing::warn!(reading_id = id, "Skipping reading without device_id");
            return RecordOutcome::SkippedMissingDevice { id };
        }

        let schema = self.model.schema();
        let built = match features::build(reading, schema) {
            Ok(built) => built,
            Err(FeatureError::MissingDeviceId { .. }) => {
                return RecordOutcome::SkippedMissingDevice { id };
            }
            Err(e) => {
                tracing::warn!(reading_id = id, "Skipping reading, feature build failed: {}", e);
                return RecordOutcome::SkippedBuildError {
                    id,
                    reason: e.to_string(),
                };
            }
        };

        if let DeviceMatch::Unknown { device_id } = &built.device {
            tracing::warn!(
                reading_id = id,
                device_id = %device_id,
                "Device is unknown to the model, prediction may be inaccurate"
            );
        }

        let prediction = match self.model.predict(&built.vector) {
            Ok(prediction) => prediction,
            Err(e) => {
                tracing::error!(reading_id = id, "Prediction failed: {}", e);
                tracing::debug!(
                    reading_id = id,
                    features = %built.vector.to_log_entry(schema),
                    "Rejected feature vector"
                );
                return RecordOutcome::SkippedPredictError {
                    id,
                    reason: e.to_string(),
                };
            }
        };

        let verdict = prediction.verdict();
        tracing::trace!(reading_id = id, decision = prediction.decision, ?verdict, "Scored");

        match built.device {
            DeviceMatch::Known => RecordOutcome::Scored { id, verdict },
            DeviceMatch::Unknown { device_id } => RecordOutcome::Degraded {
                id,
                verdict,
                device_id,
            },
        }
    }

    fn update_quarantine(&mut self, report: &IterationReport) {
        // A rolled-back batch says nothing about its readings
        if !report.is_committed() {
            return;
        }

        for record in &report.records {
            let id = record.id();
            if !record.is_skipped() {
                self.quarantine.forget(id);
                continue;
            }

            if self.quarantine.record_skip(id) {
                self.stats.record_quarantined();
                tracing::warn!(
                    reading_id = id,
                    quarantined = self.quarantine.len(),
                    "Reading skipped {} times, excluding it from further batches",
                    self.settings.max_record_attempts
                );
            } else if self.quarantine.is_enabled() {
                tracing::debug!(
                    reading_id = id,
                    attempts = self.quarantine.attempts(id),
                    "Reading left unscored"
                );
            }
        }

        let fetched: Vec<ReadingId> = report.records.iter().map(RecordOutcome::id).collect();
        self.quarantine.retain_attempts(&fetched);
    }
}

/// End the transaction without persisting anything
async fn release<T: ScoringSession>(session: T) {
    if let Err(e) = session.rollback().await {
        tracing::debug!("Rollback failed while releasing session: {}", e);
    }
}
