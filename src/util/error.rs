//! Error types for the sceneio library.

use thiserror::Error;

/// Main error type for sceneio operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Context already holds a bound document
    #[error("Context is already bound to \"{0}\"")]
    AlreadyBound(String),

    /// Operation requires a different Context/Schema state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Sibling/attribute/variant name collision
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    /// Attribute type vs. requested value type
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Missing required buffer, self-referential save path, out-of-range index
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Path/attribute/variant lookup miss surfaced as an error
    #[error("Not found: {0}")]
    NotFound(String),

    /// The underlying storage engine reported an error
    #[error("Storage engine failure: {0}")]
    Engine(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid-state error from a message.
    pub fn state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create an invalid-argument error from a message.
    pub fn arg(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a storage-engine error from a message.
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }
}

/// Result type alias for sceneio operations.
pub type Result<T> = std::result::Result<T, Error>;
