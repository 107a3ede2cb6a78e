//! Error types for the orchestration layer.
//!
//! - `TransportError`: misuse of shared-array handles
//! - `AreaError`: one area's failure, recorded against that area only
//! - `OrchestratorError`: problems with the run as a whole

use gravity_core::types::ValidationError;
use thiserror::Error;

/// Shared-array transport errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The handle was never issued by this pool.
    #[error("Unknown array handle {0}")]
    UnknownHandle(u64),

    /// The array was released before the attach.
    #[error("Array handle {0} has been released")]
    Released(u64),
}

impl TransportError {
    /// Check if this is a use-after-release error.
    pub fn is_released(&self) -> bool {
        matches!(self, Self::Released(_))
    }
}

/// Failure of a single area.
///
/// Never propagated to sibling areas; it is stored in that area's report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AreaError {
    /// The area's inputs were rejected before calibration began.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The worker running the area panicked.
    #[error("Worker panicked while calibrating area {area}: {message}")]
    WorkerPanic {
        /// Area being calibrated
        area: String,
        /// Panic payload, if it was a string
        message: String,
    },

    /// Shared inputs could not be attached.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The run was cancelled before this area started.
    #[error("Area {0} was cancelled before it started")]
    Cancelled(String),
}

impl AreaError {
    /// Create a worker panic error.
    pub fn worker_panic(area: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WorkerPanic {
            area: area.into(),
            message: message.into(),
        }
    }

    /// Check if this is a worker panic.
    pub fn is_worker_panic(&self) -> bool {
        matches!(self, Self::WorkerPanic { .. })
    }

    /// Check if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if the area never ran because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Errors that stop a whole run before any area is dispatched.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Two areas share an ID and segment.
    #[error("Duplicate area {area} (segment {segment})")]
    DuplicateArea {
        /// Repeated area ID
        area: String,
        /// Segment of the repeated area
        segment: String,
    },

    /// The worker pool could not be built.
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_error_from_validation() {
        let err: AreaError = ValidationError::empty_input("productions").into();
        assert!(err.is_validation());
        assert!(format!("{}", err).contains("productions"));
    }

    #[test]
    fn test_worker_panic_display() {
        let err = AreaError::worker_panic("north", "boom");
        assert!(err.is_worker_panic());
        assert_eq!(format!("{}", err), "Worker panicked while calibrating area north: boom");
    }

    #[test]
    fn test_transport_error_display() {
        assert!(TransportError::Released(3).is_released());
        assert_eq!(format!("{}", TransportError::UnknownHandle(9)), "Unknown array handle 9");
    }
}
