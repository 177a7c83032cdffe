//! Stability error types

use thiserror::Error;

/// Quality-of-service failures: real-time scheduling or page locking was refused.
///
/// These are never fatal. The engine keeps running with a weaker latency
/// guarantee and logs a warning.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PinningError {
    /// The scheduler refused the real-time class / priority
    #[error("Real-time priority request failed: {0}")]
    Priority(String),

    /// mlock refused to pin the region
    #[error("Failed to lock {len} bytes in physical memory: {reason}")]
    Lock { len: usize, reason: String },

    /// The platform has no equivalent facility
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

/// Result type for pinning operations
pub type PinningResult<T> = Result<T, PinningError>;
