//! Features Module - Feature Extraction Engine
//!
//! Turns stored readings into model input laid out by the model's own schema.

#![allow(dead_code)]

pub mod builder;
pub mod schema;
pub mod vector;


// Re-export common types
pub use builder::{build, DeviceMatch, FeatureError};
pub use schema::{FeatureSchema, SchemaError};
pub use vector::{FeatureVector, LayoutMismatchError};
