//! Model Module - Anomaly Classifier
//!
//! Loads the model artifact once at startup and exposes it as an immutable
//! [`ModelHandle`] bound to its feature schema.

pub mod inference;
pub mod isolation_forest;
pub mod loader;

// Re-export common types
pub use inference::ModelHandle;
pub use loader::{load_model, ModelLoadError};
