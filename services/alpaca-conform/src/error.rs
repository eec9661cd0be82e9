//! Error types for the Alpaca conformance checker

/// Errors that can occur while driving a device under test
#[derive(Debug, thiserror::Error)]
pub enum ConformError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Test run cancelled")]
    Cancelled,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for conformance operations
pub type Result<T> = std::result::Result<T, ConformError>;
