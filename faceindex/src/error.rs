use thiserror::Error;

/// Errors returned by index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("index not initialized: build it or load an existing one first")]
    NotInitialized,

    #[error("corrupt index: {0}")]
    Corrupt(String),

    #[error("persistence: {0}")]
    Persistence(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}
