//! Errors raised across ingestion, training and publication

use thiserror::Error;

/// Failure of a pipeline operation
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Not enough history to fit a model. Callers skip the cycle and keep
    /// whatever model and forecast set they already have.
    #[error("Insufficient data: {available} samples available, {required} required")]
    InsufficientData { available: usize, required: usize },

    /// Fitting or evaluating the regressor failed
    #[error("Model error: {0}")]
    Model(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether this error only means "skip this cycle"
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::InsufficientData { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::InvalidInput(format!("CSV: {}", e))
    }
}

impl From<smartcore::error::Failed> for Error {
    fn from(e: smartcore::error::Failed) -> Self {
        Error::Model(e.to_string())
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
