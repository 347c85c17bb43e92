//! Error types for glutenconvert-core

use thiserror::Error;

/// Main error type for the glutenconvert-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Inference gateway error (transport failure or malformed payload)
    #[error("inference error: {0}")]
    Inference(String),

    /// Locally rejected input (empty message, non-positive serving size)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A non-terminal generation job already exists for this owner
    #[error("a generation job is already running for owner {0}")]
    AlreadyRunning(String),

    /// Image capture error
    #[error("capture error: {0}")]
    Capture(String),
}

/// Result type alias for glutenconvert-core
pub type Result<T> = std::result::Result<T, Error>;
