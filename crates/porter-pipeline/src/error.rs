//! Error types for the upload pipeline
//!
//! Each layer has its own error enum (`ApiError`, `StorageError`,
//! `PackError`); this module ties them together for the orchestration code.
//! Fatal variants are translated into protocol events before the process
//! exits, so the supervisor never sees a bare nonzero exit code without an
//! explanatory line.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Umbrella error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Control-plane communication failed
    #[error(transparent)]
    Api(#[from] crate::api::ApiError),

    /// Object-storage request failed
    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),

    /// Packing phase failed
    #[error(transparent)]
    Pack(#[from] crate::pack::PackError),

    /// A file landed outside the upload root during enumeration
    #[error("Invalid upload layout: {0}")]
    Layout(String),

    /// Directory walk failed
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// File system operation failed
    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// Generic anyhow error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a layout error
    pub fn layout(msg: impl Into<String>) -> Self {
        Self::Layout(msg.into())
    }
}
