//! Error types for vesta-core

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Command identifier is not of the form `resource.operation`
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A required parameter is missing or malformed
    #[error("missing parameter: {0}")]
    MissingParameter(String),

    /// A schema id could not be resolved for the target
    #[error("schema resolution failed: {0}")]
    SchemaResolution(String),

    /// A timestamp selection could not be resolved into a window
    #[error("temporal resolution failed: {0}")]
    Temporal(String),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// History store error
    #[error("history error: {0}")]
    History(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
