//! Feature Vector - Core data structure for model input
//!
//! Dense values in schema order, stamped with the schema fingerprint so a
//! vector built against one layout is never fed to a model with another.

use serde::Serialize;
use thiserror::Error;

use super::schema::FeatureSchema;

/// Vector does not match the schema it is checked against
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "feature layout mismatch: expected {expected_len} features (fingerprint {expected_fingerprint:08x}), \
     got {actual_len} (fingerprint {actual_fingerprint:08x})"
)]
pub struct LayoutMismatchError {
    pub expected_len: usize,
    pub expected_fingerprint: u32,
    pub actual_len: usize,
    pub actual_fingerprint: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    /// Fingerprint of the schema this vector was built against
    pub fingerprint: u32,
    /// Feature values in schema order
    pub values: Vec<f64>,
}

impl FeatureVector {
    /// Zeroed vector for a schema
    pub fn zeroed(schema: &FeatureSchema) -> Self {
        Self {
            fingerprint: schema.fingerprint(),
            values: vec![0.0; schema.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    pub fn get_by_name(&self, schema: &FeatureSchema, name: &str) -> Option<f64> {
        schema.index_of(name).and_then(|i| self.get(i))
    }

    pub fn set(&mut self, index: usize, value: f64) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }

    /// Set a feature by name; false if the schema does not have it
    pub fn set_by_name(&mut self, schema: &FeatureSchema, name: &str, value: f64) -> bool {
        match schema.index_of(name) {
            Some(index) => {
                self.set(index, value);
                true
            }
            None => false,
        }
    }

    /// Values of the one-hot device slice, in schema order
    pub fn device_slice(&self, schema: &FeatureSchema) -> Vec<f64> {
        schema
            .device_slots()
            .iter()
            .filter_map(|&i| self.get(i))
            .collect()
    }

    pub fn validate(&self, schema: &FeatureSchema) -> Result<(), LayoutMismatchError> {
        if self.fingerprint != schema.fingerprint() || self.values.len() != schema.len() {
            return Err(LayoutMismatchError {
                expected_len: schema.len(),
                expected_fingerprint: schema.fingerprint(),
                actual_len: self.values.len(),
                actual_fingerprint: self.fingerprint,
            });
        }
        Ok(())
    }

    /// Named values for debug logging
    pub fn to_log_entry(&self, schema: &FeatureSchema) -> serde_json::Value {
        let named: serde_json::Map<String, serde_json::Value> = schema
            .names()
            .iter()
            .zip(self.values.iter())
            .map(|(name, value)| (name.clone(), serde_json::json!(value)))
            .collect();

        serde_json::json!({
            "fingerprint": format!("{:08x}", self.fingerprint),
            "values": named,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(list: &[&str]) -> FeatureSchema {
        FeatureSchema::new(list.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[test]
    fn test_zeroed_matches_schema() {
        let s = schema(&["temperature", "humidity", "device_id_A"]);
        let v = FeatureVector::zeroed(&s);
        assert_eq!(v.len(), 3);
        assert!(v.as_slice().iter().all(|x| *x == 0.0));
        assert!(v.validate(&s).is_ok());
    }

    #[test]
    fn test_set_by_name() {
        let s = schema(&["temperature", "humidity"]);
        let mut v = FeatureVector::zeroed(&s);
        assert!(v.set_by_name(&s, "humidity", 55.5));
        assert!(!v.set_by_name(&s, "hour", 3.0));
        assert_eq!(v.get_by_name(&s, "humidity"), Some(55.5));
        assert_eq!(v.as_slice(), &[0.0, 55.5]);
    }

    #[test]
    fn test_set_out_of_range_is_ignored() {
        let s = schema(&["hour"]);
        let mut v = FeatureVector::zeroed(&s);
        v.set(5, 1.0);
        assert_eq!(v.as_slice(), &[0.0]);
    }

    #[test]
    fn test_validate_rejects_other_schema() {
        let a = schema(&["hour", "minute"]);
        let b = schema(&["minute", "hour"]);
        let v = FeatureVector::zeroed(&a);
        let err = v.validate(&b).unwrap_err();
        assert_eq!(err.expected_fingerprint, b.fingerprint());
        assert_eq!(err.actual_fingerprint, a.fingerprint());
    }

    #[test]
    fn test_validate_rejects_wrong_length() {
        let s = schema(&["hour", "minute"]);
        let mut v = FeatureVector::zeroed(&s);
        v.values.push(1.0);
        assert!(v.validate(&s).is_err());
    }

    #[test]
    fn test_log_entry_names_values() {
        let s = schema(&["hour", "device_id_A"]);
        let mut v = FeatureVector::zeroed(&s);
        v.set(1, 1.0);
        let entry = v.to_log_entry(&s);
        assert_eq!(entry["values"]["device_id_A"], 1.0);
        assert_eq!(entry["values"]["hour"], 0.0);
    }
}
