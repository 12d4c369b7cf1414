//! Error types for the spatial audio engine

use thiserror::Error;

use crate::source::SourceId;

/// Spatial audio error types
///
/// Configuration mistakes (bad order, NaN angles, unknown rolloff names) are
/// corrected in place and only logged; the variants here are the failures a
/// caller has to act on.
#[derive(Error, Debug)]
pub enum SpatialError {
    /// The participant stream cannot be wrapped by a source
    #[error("Unsupported source stream: {0}")]
    UnsupportedStream(String),

    /// Buffer size mismatch
    #[error("Buffer size mismatch: expected {expected}, got {got}")]
    BufferSizeMismatch { expected: usize, got: usize },

    /// Source not found
    #[error("Source not found: {0}")]
    SourceNotFound(SourceId),

    /// Maximum sources exceeded
    #[error("Maximum sources exceeded: {max}")]
    MaxSourcesExceeded { max: usize },

    /// Control queue to the audio thread is full
    #[error("Command queue full ({capacity} slots)")]
    CommandQueueFull { capacity: usize },

    /// Configuration value that cannot be corrected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration document could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for spatial operations
pub type SpatialResult<T> = Result<T, SpatialError>;
