//! Network errors.

use ember_core::{EvaluationError, FieldId};
use ember_memory::{MemoryError, RowId};
use thiserror::Error;

/// Errors raised while building or evaluating condition nodes.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Fact variable {var} has no key bucket")]
    MissingBucket { var: usize },

    #[error("Fact variable {var} is not bound")]
    Unbound { var: usize },

    #[error("Fact variable {var} has no row {row}")]
    MissingRow { var: usize, row: RowId },

    #[error("Field {field} is not part of the key of fact variable {var}")]
    FieldNotInKey { var: usize, field: FieldId },

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

/// Result type for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;
