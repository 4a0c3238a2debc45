//! Inference - Model Handle and Classifier Trait
//!
//! A [`ModelHandle`] pairs a classifier with the feature schema it was trained
//! on. Both come from the same artifact and are immutable after load, so the
//! handle can be shared across tasks without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::logic::features::{FeatureSchema, FeatureVector, LayoutMismatchError};
use crate::models::Verdict;

// ============================================================================
// LABELS
// ============================================================================

/// Class code the classifier uses for outliers
pub const OUTLIER_LABEL: i8 = -1;

/// Class code for inliers
pub const INLIER_LABEL: i8 = 1;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Classifier output for one vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    /// `OUTLIER_LABEL` or `INLIER_LABEL`
    pub label: i8,
    /// Raw decision value; negative means outlier
    pub decision: f64,
}

impl Prediction {
    /// Outlier class maps to anomalous, anything else is normal
    pub fn verdict(&self) -> Verdict {
        if self.label == OUTLIER_LABEL {
            Verdict::Anomalous
        } else {
            Verdict::Normal
        }
    }
}

/// Where the loaded model came from
#[derive(Debug, Clone, Serialize)]
pub struct ModelMetadata {
    pub source: String,
    pub model_type: String,
    pub sha256: String,
    pub feature_count: usize,
    pub loaded_at: DateTime<Utc>,
}

/// Inference stats for status logging
#[derive(Debug, Clone, Serialize)]
pub struct InferenceStats {
    pub model_type: String,
    pub inference_count: u64,
    pub avg_latency_us: f64,
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error(transparent)]
    Layout(#[from] LayoutMismatchError),

    #[error("invalid model input: {0}")]
    Input(String),
}

// ============================================================================
// CLASSIFIER TRAIT
// ============================================================================

/// Binary classifier over a dense feature slice laid out by the model schema
pub trait Classifier: Send + Sync + std::fmt::Debug {
    fn model_type(&self) -> &'static str;

    fn predict(&self, features: &[f64]) -> Result<Prediction, InferenceError>;
}

// ============================================================================
// MODEL HANDLE
// ============================================================================

#[derive(Debug)]
pub struct ModelHandle {
    schema: FeatureSchema,
    classifier: Box<dyn Classifier>,
    metadata: ModelMetadata,
    latency_sum_us: AtomicU64,
    inference_count: AtomicU64,
}

impl ModelHandle {
    pub fn new(
        schema: FeatureSchema,
        classifier: Box<dyn Classifier>,
        metadata: ModelMetadata,
    ) -> Self {
        Self {
            schema,
            classifier,
            metadata,
            latency_sum_us: AtomicU64::new(0),
            inference_count: AtomicU64::new(0),
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Score a vector. Vectors built against another layout are refused.
    pub fn predict(&self, vector: &FeatureVector) -> Result<Prediction, InferenceError> {
        vector.validate(&self.schema)?;

        let start = Instant::now();
        let prediction = self.classifier.predict(vector.as_slice())?;

        self.latency_sum_us
            .fetch_add(start.elapsed().as_micros() as u64, Ordering::Relaxed);
        self.inference_count.fetch_add(1, Ordering::Relaxed);

        Ok(prediction)
    }

    pub fn stats(&self) -> InferenceStats {
        let sum = self.latency_sum_us.load(Ordering::Relaxed);
        let count = self.inference_count.load(Ordering::Relaxed);

        InferenceStats {
            model_type: self.classifier.model_type().to_string(),
            inference_count: count,
            avg_latency_us: if count > 0 { sum as f64 / count as f64 } else { 0.0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flags anything whose first feature exceeds a limit
    #[derive(Debug)]
    struct FirstFeatureLimit(f64);

    impl Classifier for FirstFeatureLimit {
        fn model_type(&self) -> &'static str {
            "first_feature_limit"
        }

        fn predict(&self, features: &[f64]) -> Result<Prediction, InferenceError> {
            let first = features
                .first()
                .copied()
                .ok_or_else(|| InferenceError::Input("empty".to_string()))?;
            let decision = self.0 - first;
            Ok(Prediction {
                label: if decision < 0.0 { OUTLIER_LABEL } else { INLIER_LABEL },
                decision,
            })
        }
    }

    fn handle(names: &[&str]) -> ModelHandle {
        let schema = FeatureSchema::new(names.iter().map(|s| s.to_string()).collect()).unwrap();
        let metadata = ModelMetadata {
            source: "<test>".to_string(),
            model_type: "first_feature_limit".to_string(),
            sha256: String::new(),
            feature_count: schema.len(),
            loaded_at: Utc::now(),
        };
        ModelHandle::new(schema, Box::new(FirstFeatureLimit(30.0)), metadata)
    }

    #[test]
    fn test_outlier_label_maps_to_anomalous() {
        let p = Prediction { label: OUTLIER_LABEL, decision: -0.2 };
        assert_eq!(p.verdict(), Verdict::Anomalous);
        let p = Prediction { label: INLIER_LABEL, decision: 0.2 };
        assert_eq!(p.verdict(), Verdict::Normal);
        // Any non-outlier code is normal
        let p = Prediction { label: 0, decision: 0.0 };
        assert_eq!(p.verdict(), Verdict::Normal);
    }

    #[test]
    fn test_predict_counts_inferences() {
        let model = handle(&["temperature", "humidity"]);
        let mut v = FeatureVector::zeroed(model.schema());
        v.set(0, 45.0);

        let p = model.predict(&v).unwrap();
        assert_eq!(p.verdict(), Verdict::Anomalous);
        assert_eq!(model.stats().inference_count, 1);
    }

    #[test]
    fn test_predict_refuses_foreign_layout() {
        let model = handle(&["temperature", "humidity"]);
        let other = FeatureSchema::new(vec!["humidity".into(), "temperature".into()]).unwrap();
        let v = FeatureVector::zeroed(&other);

        assert!(matches!(model.predict(&v), Err(InferenceError::Layout(_))));
        assert_eq!(model.stats().inference_count, 0);
    }
}
