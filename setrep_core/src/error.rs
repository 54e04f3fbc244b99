//! Error types for the setrep_core library.

use std::io;

use crate::repository::RepositoryError;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for setrep_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Plan validation error
    #[error("Plan validation error: {0}")]
    PlanValidation(String),

    /// The session repository rejected or failed a call
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Operation not valid in the current session state
    #[error("State error: {0}")]
    State(String),

    /// Exercise id not part of the loaded plan
    #[error("Unknown exercise: {0}")]
    UnknownExercise(String),

    /// Series number out of sequence or beyond the target set count
    #[error("Invalid series {series_number} for {exercise_id} (expected {expected})")]
    InvalidSeries {
        exercise_id: String,
        series_number: u32,
        expected: u32,
    },

    /// Generic error
    #[error("{0}")]
    Other(String),
}
