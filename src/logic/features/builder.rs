//! Feature Builder - Reading -> Feature Vector
//!
//! Pure mapping from one stored reading onto the model's schema:
//! 1. every schema entry starts at zero
//! 2. base features the schema declares are copied/derived from the reading
//! 3. the reading's one-hot device feature is set to 1 if the model knows it
//!
//! A device unseen during training still produces a vector (all-zero device
//! slice) flagged as [`DeviceMatch::Unknown`]; only structurally incomplete
//! readings fail.

use chrono::{Datelike, Timelike};
use thiserror::Error;

use super::schema::{self, FeatureSchema};
use super::vector::FeatureVector;
use crate::models::{Reading, ReadingId};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeatureError {
    #[error("reading {id} has no device identifier")]
    MissingDeviceId { id: ReadingId },

    #[error("reading {id} has no value for '{feature}'")]
    MissingValue { id: ReadingId, feature: &'static str },

    #[error("reading {id} has a non-finite value for '{feature}': {value}")]
    NonFinite {
        id: ReadingId,
        feature: &'static str,
        value: f64,
    },
}

/// Whether the reading's device has a one-hot slot in the schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMatch {
    Known,
    Unknown { device_id: String },
}

/// A successful build
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltFeatures {
    pub vector: FeatureVector,
    pub device: DeviceMatch,
}

impl BuiltFeatures {
    /// The device was unseen during training; scores are less reliable
    pub fn is_degraded(&self) -> bool {
        matches!(self.device, DeviceMatch::Unknown { .. })
    }
}

/// Build the feature vector for one reading
pub fn build(reading: &Reading, schema: &FeatureSchema) -> Result<BuiltFeatures, FeatureError> {
    let device_id = reading
        .device()
        .ok_or(FeatureError::MissingDeviceId { id: reading.id })?;

    let mut vector = FeatureVector::zeroed(schema);

    // Sensor values: only demanded when the model was trained with them
    for (feature, value) in [
        (schema::TEMPERATURE, reading.temperature),
        (schema::HUMIDITY, reading.humidity),
    ] {
        let Some(index) = schema.index_of(feature) else {
            continue;
        };
        let value = value.ok_or(FeatureError::MissingValue {
            id: reading.id,
            feature,
        })?;
        if !value.is_finite() {
            return Err(FeatureError::NonFinite {
                id: reading.id,
                feature,
                value,
            });
        }
        vector.set(index, value);
    }

    // Time features, from the UTC timestamp
    let ts = reading.timestamp_utc;
    vector.set_by_name(schema, schema::HOUR, f64::from(ts.hour()));
    vector.set_by_name(schema, schema::MINUTE, f64::from(ts.minute()));
    vector.set_by_name(
        schema,
        schema::DAY_OF_WEEK,
        f64::from(ts.weekday().num_days_from_monday()),
    );

    // One-hot device
    let device = if vector.set_by_name(schema, &schema::device_feature_name(device_id), 1.0) {
        DeviceMatch::Known
    } else {
        DeviceMatch::Unknown {
            device_id: device_id.to_string(),
        }
    };

    Ok(BuiltFeatures { vector, device })
}
