//! Error types for the chat digest pipeline

use crate::models::Route;
use thiserror::Error;

/// Result type alias for digest operations
pub type Result<T> = std::result::Result<T, DigestError>;

#[derive(Error, Debug)]
pub enum DigestError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Could not resolve message route for conversation {conversation_id}: {cause}")]
    Resolution {
        conversation_id: String,
        cause: SourceError,
    },

    #[error("Fetch failed on {route} route at page {page_index}: {cause}")]
    Fetch {
        route: Route,
        page_index: u32,
        cause: SourceError,
    },

    #[error("Summarization service still overloaded after {attempts} attempts")]
    Overloaded { attempts: u32 },

    #[error("Summarization failed: {0}")]
    Upstream(String),

    #[error("Invalid time window: {0}")]
    InvalidWindow(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Report job abandoned: {0}")]
    Abandoned(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failure reported by the upstream messaging API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("resource not found")]
    NotFound,

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed page: {0}")]
    Decode(String),
}

/// Failure reported by the generative-content API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// Transient overload; the call may succeed later.
    #[error("model overloaded: {0}")]
    Overloaded(String),

    #[error("{0}")]
    Failed(String),
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GenerationError::Overloaded(_))
    }
}
