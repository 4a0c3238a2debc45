//! Feature Schema - Model-declared Feature Layout
//!
//! **The model artifact is the single source of truth for the layout.**
//!
//! The schema is the ordered list of feature names the classifier was trained
//! with. It is frozen when the model loads and never changes afterwards.
//!
//! ## Naming conventions
//! - Base features: `temperature`, `humidity`, `hour`, `minute`, `dayofweek`
//! - One-hot device features: `device_id_<device identifier>`

use std::collections::HashMap;

use crc32fast::Hasher;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// FEATURE NAMES
// ============================================================================

pub const TEMPERATURE: &str = "temperature";
pub const HUMIDITY: &str = "humidity";
pub const HOUR: &str = "hour";
pub const MINUTE: &str = "minute";
/// Monday = 0
pub const DAY_OF_WEEK: &str = "dayofweek";

/// Prefix of every one-hot device feature
pub const DEVICE_FEATURE_PREFIX: &str = "device_id_";

/// Base features the builder knows how to fill
pub const BASE_FEATURES: &[&str] = &[TEMPERATURE, HUMIDITY, HOUR, MINUTE, DAY_OF_WEEK];

/// One-hot feature name for a device identifier
pub fn device_feature_name(device_id: &str) -> String {
    format!("{DEVICE_FEATURE_PREFIX}{device_id}")
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("feature schema is empty")]
    Empty,

    #[error("feature schema contains an empty name at position {0}")]
    EmptyName(usize),

    #[error("feature '{name}' appears twice in the schema (positions {first} and {second})")]
    Duplicate {
        name: String,
        first: usize,
        second: usize,
    },
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Ordered feature names with a precomputed name -> index table
#[derive(Debug, Clone)]
pub struct FeatureSchema {
    names: Vec<String>,
    index: HashMap<String, usize>,
    device_slots: Vec<usize>,
    fingerprint: u32,
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Result<Self, SchemaError> {
        if names.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if name.is_empty() {
                return Err(SchemaError::EmptyName(i));
            }
            if let Some(first) = index.insert(name.clone(), i) {
                return Err(SchemaError::Duplicate {
                    name: name.clone(),
                    first,
                    second: i,
                });
            }
        }

        let device_slots = names
            .iter()
            .enumerate()
            .filter(|(_, n)| n.starts_with(DEVICE_FEATURE_PREFIX))
            .map(|(i, _)| i)
            .collect();

        let fingerprint = compute_fingerprint(&names);

        Ok(Self {
            names,
            index,
            device_slots,
            fingerprint,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Position of a feature, O(1)
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Positions of the one-hot device features
    pub fn device_slots(&self) -> &[usize] {
        &self.device_slots
    }

    /// Device identifiers seen during training
    pub fn known_devices(&self) -> impl Iterator<Item = &str> {
        self.device_slots
            .iter()
            .map(move |&i| &self.names[i][DEVICE_FEATURE_PREFIX.len()..])
    }

    /// CRC32 of the ordered names; stamped on every vector built against it
    pub fn fingerprint(&self) -> u32 {
        self.fingerprint
    }

    pub fn info(&self) -> SchemaInfo {
        SchemaInfo {
            fingerprint: format!("{:08x}", self.fingerprint),
            feature_count: self.len(),
            base_features: BASE_FEATURES
                .iter()
                .filter(|f| self.contains(f))
                .map(|f| f.to_string())
                .collect(),
            device_count: self.device_slots.len(),
        }
    }
}

/// Summary for startup logging
#[derive(Debug, Clone, Serialize)]
pub struct SchemaInfo {
    pub fingerprint: String,
    pub feature_count: usize,
    pub base_features: Vec<String>,
    pub device_count: usize,
}

fn compute_fingerprint(names: &[String]) -> u32 {
    let mut hasher = Hasher::new();
    for name in names {
        hasher.update(name.as_bytes());
        hasher.update(&[0]); // Separator
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_index_lookup() {
        let schema = FeatureSchema::new(names(&["temperature", "hour", "device_id_A"])).unwrap();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.index_of("temperature"), Some(0));
        assert_eq!(schema.index_of("device_id_A"), Some(2));
        assert_eq!(schema.index_of("humidity"), None);
        assert_eq!(schema.name_at(1), Some("hour"));
        assert_eq!(schema.name_at(3), None);
    }

    #[test]
    fn test_device_slots_and_known_devices() {
        let schema = FeatureSchema::new(names(&[
            "device_id_A",
            "temperature",
            "device_id_B-7",
        ]))
        .unwrap();
        assert_eq!(schema.device_slots(), &[0, 2]);
        let known: Vec<_> = schema.known_devices().collect();
        assert_eq!(known, vec!["A", "B-7"]);
    }

    #[test]
    fn test_rejects_empty_schema() {
        assert_eq!(FeatureSchema::new(vec![]).unwrap_err(), SchemaError::Empty);
    }

    #[test]
    fn test_rejects_duplicates() {
        let err = FeatureSchema::new(names(&["hour", "minute", "hour"])).unwrap_err();
        assert_eq!(
            err,
            SchemaError::Duplicate {
                name: "hour".to_string(),
                first: 0,
                second: 2
            }
        );
    }

    #[test]
    fn test_rejects_empty_name() {
        let err = FeatureSchema::new(names(&["hour", ""])).unwrap_err();
        assert_eq!(err, SchemaError::EmptyName(1));
    }

    #[test]
    fn test_fingerprint_depends_on_order() {
        let a = FeatureSchema::new(names(&["hour", "minute"])).unwrap();
        let b = FeatureSchema::new(names(&["minute", "hour"])).unwrap();
        let c = FeatureSchema::new(names(&["hour", "minute"])).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_separator_prevents_concatenation_collisions() {
        let a = FeatureSchema::new(names(&["ab", "c"])).unwrap();
        let b = FeatureSchema::new(names(&["a", "bc"])).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_info_lists_present_base_features() {
        let schema =
            FeatureSchema::new(names(&["humidity", "dayofweek", "device_id_X", "extra"])).unwrap();
        let info = schema.info();
        assert_eq!(info.feature_count, 4);
        assert_eq!(info.base_features, vec!["humidity", "dayofweek"]);
        assert_eq!(info.device_count, 1);
        assert_eq!(info.fingerprint.len(), 8);
    }
}
