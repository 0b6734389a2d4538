//! Error types for Granska.

use thiserror::Error;

/// Library-level error type for Granska operations.
#[derive(Error, Debug)]
pub enum GranskaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to fetch content: {0}")]
    FetchFailed(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Recoverable: the orchestrator substitutes a local fallback reply
    /// for summarization/description calls instead of failing the task.
    #[error("Provider quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Diarization failed: {0}")]
    Diarization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type alias for Granska operations.
pub type Result<T> = std::result::Result<T, GranskaError>;
