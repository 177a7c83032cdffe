//! Engine error type

use thiserror::Error;

use crate::inference::InferenceError;
use crate::stability::PinningError;
use crate::transport::TransportError;

/// Errors surfaced by engine setup and control calls.
///
/// Per-packet failures never produce an `EngineError`; `process_packet`
/// resolves them to a pass-through `false`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Pinning(#[from] PinningError),

    /// The monitoring thread could not be spawned
    #[error("Failed to start watchdog: {0}")]
    Watchdog(#[from] std::io::Error),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
