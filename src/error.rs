//! Error handling

use thiserror::Error;

use crate::config::ConfigError;
use crate::logic::model::ModelLoadError;

pub type AppResult<T> = Result<T, AppError>;

/// Startup failures. Anything that reaches `main` as an `AppError` stops the
/// process before the scoring loop is entered.
#[derive(Debug, Error)]
pub enum AppError {
    // Configuration errors
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    // Model errors
    #[error("model could not be loaded: {0}")]
    Model(#[from] ModelLoadError),

    // Database errors
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
