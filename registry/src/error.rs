//! Registry errors.

use ember_core::{AlphaId, TypeId};
use thiserror::Error;

/// Errors raised while declaring or resolving types and fields.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Duplicate type name: {0}")]
    DuplicateTypeName(String),

    #[error("Duplicate field name: {field} on type {type_name}")]
    DuplicateFieldName { type_name: String, field: String },

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Unknown type id: {0}")]
    UnknownTypeId(TypeId),

    #[error("Unknown field: {field} on type {type_name}")]
    UnknownField { type_name: String, field: String },

    #[error("Unknown alpha condition {id} on type {type_name}")]
    UnknownAlpha { type_name: String, id: AlphaId },

    #[error("Cannot resolve path `{path}` on type {type_name}: {reason}")]
    UnresolvedPath {
        type_name: String,
        path: String,
        reason: String,
    },
}

impl RegistryError {
    pub fn unresolved_path(
        type_name: impl Into<String>,
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        RegistryError::UnresolvedPath {
            type_name: type_name.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
