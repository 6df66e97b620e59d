//! Standalone error types for nebula-collections
//!
//! Uses thiserror for clean, idiomatic Rust error definitions. Every failure
//! is reported synchronously to the immediate caller; nothing is retried
//! internally.

use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::{error, warn};

// ============================================================================
// Main Error Type
// ============================================================================

/// Errors produced by container, buffer and allocator operations
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectionError {
    // --- Construction Errors ---
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("Memory allocation failed: {size} bytes with {align} byte alignment")]
    AllocationFailed { size: usize, align: usize },

    // --- Access Errors ---
    #[error("{operation} on empty {container}")]
    EmptyContainer {
        container: &'static str,
        operation: &'static str,
    },

    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Capacity exceeded: {requested} elements requested, capacity is {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },

    // --- Lifetime Errors ---
    #[error("{container} used after it was disposed")]
    UseAfterFree { container: &'static str },

    #[error("{container} disposed twice")]
    DoubleFree { container: &'static str },

    #[error("Concurrent access to {container}: {details}")]
    ConcurrentAccess {
        container: &'static str,
        details: &'static str,
    },
}

impl CollectionError {
    /// Check if the caller can recover by resizing and retrying
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "COLL:ARG:INVALID",
            Self::AllocationFailed { .. } => "COLL:ALLOC:FAILED",
            Self::EmptyContainer { .. } => "COLL:ACCESS:EMPTY",
            Self::IndexOutOfRange { .. } => "COLL:ACCESS:RANGE",
            Self::CapacityExceeded { .. } => "COLL:ACCESS:CAPACITY",
            Self::UseAfterFree { .. } => "COLL:LIFETIME:USE_AFTER_FREE",
            Self::DoubleFree { .. } => "COLL:LIFETIME:DOUBLE_FREE",
            Self::ConcurrentAccess { .. } => "COLL:SAFETY:CONCURRENT",
        }
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create invalid argument error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create allocation failed error
    pub fn allocation_failed(size: usize, align: usize) -> Self {
        #[cfg(feature = "logging")]
        error!(size, align, "Container allocation failed");

        Self::AllocationFailed { size, align }
    }

    /// Create empty container error
    pub fn empty(container: &'static str, operation: &'static str) -> Self {
        Self::EmptyContainer {
            container,
            operation,
        }
    }

    /// Create index out of range error
    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { index, len }
    }

    /// Create capacity exceeded error
    pub fn capacity_exceeded(requested: usize, capacity: usize) -> Self {
        Self::CapacityExceeded {
            requested,
            capacity,
        }
    }

    /// Create use-after-free error
    pub fn use_after_free(container: &'static str) -> Self {
        #[cfg(feature = "logging")]
        warn!(container, "Container used after dispose");

        Self::UseAfterFree { container }
    }

    /// Create double free error
    pub fn double_free(container: &'static str) -> Self {
        #[cfg(feature = "logging")]
        warn!(container, "Container disposed twice");

        Self::DoubleFree { container }
    }

    /// Create concurrent access error
    pub fn concurrent_access(container: &'static str, details: &'static str) -> Self {
        #[cfg(feature = "logging")]
        warn!(container, details, "Concurrent access hazard detected");

        Self::ConcurrentAccess { container, details }
    }
}

/// Result type for collection operations
pub type CollectionResult<T> = Result<T, CollectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_capacity_errors_are_retryable() {
        assert!(CollectionError::capacity_exceeded(5, 4).is_retryable());
        assert!(!CollectionError::empty("Heap", "pop").is_retryable());
        assert!(!CollectionError::double_free("Stack").is_retryable());
    }

    #[test]
    fn codes_are_distinct() {
        let errors = [
            CollectionError::invalid_argument("x"),
            CollectionError::allocation_failed(8, 8),
            CollectionError::empty("Heap", "pop"),
            CollectionError::index_out_of_range(3, 2),
            CollectionError::capacity_exceeded(5, 4),
            CollectionError::use_after_free("Heap"),
            CollectionError::double_free("Heap"),
            CollectionError::concurrent_access("Stack", "parallel writers active"),
        ];
        let mut codes: Vec<_> = errors.iter().map(CollectionError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn display_mentions_operation() {
        let err = CollectionError::empty("Stack", "pop");
        assert_eq!(err.to_string(), "pop on empty Stack");
    }
}
