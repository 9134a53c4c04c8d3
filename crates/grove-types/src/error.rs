use thiserror::Error;

/// Errors produced by type-level operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("nil segment identity where a real segment is required")]
    NilSegment,
}

/// Convenience alias for type-level results.
pub type TypeResult<T> = Result<T, TypeError>;
