//! Error types for the Vectra library.
//!
//! All fallible operations return [`Result<T>`], whose error side is the
//! [`VectraError`] enum. Index mutations that fail leave the graph exactly as
//! it was before the call.
//!
//! # Examples
//!
//! ```
//! use vectra::error::{Result, VectraError};
//!
//! fn example_operation() -> Result<()> {
//!     Err(VectraError::invalid_config("m must be >= 2"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Vectra operations.
#[derive(Error, Debug)]
pub enum VectraError {
    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A vector's length does not match the index dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Insert would grow the index past `max_elements`.
    #[error("Capacity exceeded: index holds at most {capacity} elements")]
    CapacityExceeded { capacity: usize },

    /// The id is not present in the index, or is already tombstoned.
    #[error("Unknown id: {0}")]
    UnknownId(u64),

    /// The id is already held by a live node.
    #[error("Duplicate id: {0}")]
    DuplicateId(u64),

    /// Unrecognised distance metric or operator.
    #[error("Invalid metric: {0}")]
    InvalidMetric(String),

    /// Index or process configuration rejected at creation time.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Vector contains NaN or infinite components.
    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    /// Search aborted by a caller-supplied deadline or cancel flag.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Snapshot bytes failed integrity or structural checks.
    #[error("Corrupted snapshot: {0}")]
    Corrupted(String),

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with VectraError.
pub type Result<T> = std::result::Result<T, VectraError>;

impl VectraError {
    /// Create a new dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        VectraError::DimensionMismatch { expected, actual }
    }

    /// Create a new invalid metric error.
    pub fn invalid_metric<S: Into<String>>(msg: S) -> Self {
        VectraError::InvalidMetric(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        VectraError::InvalidConfiguration(msg.into())
    }

    /// Create a new invalid vector error.
    pub fn invalid_vector<S: Into<String>>(msg: S) -> Self {
        VectraError::InvalidVector(msg.into())
    }

    /// Create a new cancelled error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        VectraError::Cancelled(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        VectraError::Storage(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        VectraError::Serialization(msg.into())
    }

    /// Create a new corrupted snapshot error.
    pub fn corrupted<S: Into<String>>(msg: S) -> Self {
        VectraError::Corrupted(msg.into())
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        VectraError::InvalidOperation(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        VectraError::Other(msg.into())
    }

    /// Whether this error came from a caller-requested cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, VectraError::Cancelled(_))
    }
}

impl From<bincode::Error> for VectraError {
    fn from(err: bincode::Error) -> Self {
        VectraError::Serialization(err.to_string())
    }
}
