//! Inference error types

use std::path::PathBuf;

use thiserror::Error;

use super::delegate::Delegate;

/// Errors raised while loading or running a conversion model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    /// The path's extension is not a recognized model format
    #[error("Unknown model format: {}", .0.display())]
    UnknownFormat(PathBuf),

    /// The chosen backend could not load the model. No model is active.
    #[error("Failed to load {} on {delegate}: {reason}", path.display())]
    ModelLoad {
        path: PathBuf,
        delegate: Delegate,
        reason: String,
    },

    /// `run_inference` was called with no active model
    #[error("No model loaded")]
    NotLoaded,

    /// The backend reported a failure for this packet
    #[error("Backend {backend} failed: {reason}")]
    Backend { backend: String, reason: String },

    /// The backend panicked; the panic was contained at the inference boundary
    #[error("Backend {backend} panicked: {message}")]
    Panicked { backend: String, message: String },
}

/// Result type for inference operations
pub type InferenceResult<T> = Result<T, InferenceError>;
