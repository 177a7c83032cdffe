//! Transport error types

use thiserror::Error;

/// Errors raised by the shared-memory transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Creating or mapping the shared region failed. The engine is unusable.
    #[error("Failed to map shared region of {capacity} bytes: {reason}")]
    Mapping { capacity: usize, reason: String },

    /// Capacity must be non-zero and hold a whole number of samples
    #[error("Invalid region capacity {0} bytes (must be a non-zero multiple of 4)")]
    InvalidCapacity(usize),

    /// A copy or view would exceed the region. Nothing was copied.
    #[error("Request of {requested_bytes} bytes exceeds region capacity of {capacity} bytes")]
    Overflow {
        requested_bytes: usize,
        capacity: usize,
    },
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::Overflow {
            requested_bytes: 80000,
            capacity: 65536,
        };
        let msg = err.to_string();
        assert!(msg.contains("80000"));
        assert!(msg.contains("65536"));
    }
}
