use thiserror::Error;

/// Core error types for cordon
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Intent profile operation failed
    #[error("Intent error: {0}")]
    Intent(#[from] crate::core::intent::IntentError),

    /// Rule expression could not be parsed
    #[error("Rule expression error: {0}")]
    Parse(#[from] crate::core::parse::ParseError),

    /// Input validation failed
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// Referenced rule does not exist in the intent
    #[error("No rule matching '{0}' in intent")]
    RuleNotFound(String),

    /// Internal logic error
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
