//! Logic Module - Scoring Pipeline
//!
//! - `features/` - schema-driven feature construction
//! - `model/` - artifact loading and inference
//! - `store` - work queue interface over `sensor_readings`
//! - `scoring/` - the polling loop tying them together

pub mod features;
pub mod model;
pub mod scoring;
pub mod store;
