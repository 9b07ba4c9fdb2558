//! Error types for the Turnstile service.

use thiserror::Error;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A counter record could not be encoded for the store
    #[error("Failed to serialize counter record: {0}")]
    Serialization(#[source] serde_json::Error),

    /// A stored counter record could not be decoded
    #[error("Failed to deserialize counter record: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// The store holds a value for the key that is not raw bytes
    #[error("Store consistency fault for key {key}: {reason}")]
    StoreConsistency { key: String, reason: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
