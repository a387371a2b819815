//! Memory errors.

use ember_core::{EvaluationError, FactHandle, TypeId};
use ember_registry::RegistryError;
use thiserror::Error;

/// Errors raised by working memory.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// New alpha or key buckets need a stable main partition to backfill from.
    #[error("Cannot backfill memory of type {type_id} while an uncommitted delta exists")]
    UncommittedDelta { type_id: TypeId },

    #[error("No memory for undeclared type {0}")]
    UndeclaredType(TypeId),

    #[error("Cannot update {handle}: expected a {expected}, got a {actual}")]
    TypeMismatch {
        handle: FactHandle,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),
}

/// Result type for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
