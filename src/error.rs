//! Colloquy error types

use thiserror::Error;

/// Colloquy error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A conditional store write matched zero documents. The caller owns
    /// the retry: re-read the conversation and apply the change again.
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Conversation (or message) lookup failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Two template definitions registered for the same topic. Fatal at
    /// startup, never raised at analysis time.
    #[error("Duplicate template definition for topic {0}")]
    DuplicateTopicRegistration(String),

    /// The external analyzer failed
    #[error("Analyzer error: {0}")]
    Analyzer(String),

    /// Store error
    #[error("Store error: {0}")]
    Store(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Colloquy operations
pub type Result<T> = std::result::Result<T, Error>;
