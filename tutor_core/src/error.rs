//! Error types for the tutor_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for tutor_core operations
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

    /// Knowledge-base validation error
    #[error("Knowledge validation error: {0}")]
    KnowledgeValidation(String),

    /// Referenced session, case or category does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Scoring oracle failure
    #[error("Scoring error: {0}")]
    Scoring(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
