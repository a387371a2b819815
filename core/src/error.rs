//! Evaluation errors shared across the engine.
//!
//! Build-time errors live with the crate that detects them (registry, rule).
//! Errors raised by user callables at evaluation time are wrapped here with
//! enough context to identify the failing condition or action.

use crate::{join_values, BoxError, FactHandle, Value};
use thiserror::Error;

/// A user condition or action failed while the engine was evaluating it.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// A compiled condition returned an error.
    #[error("condition `{source_text}` failed for arguments [{}]: {cause}", join_values(.args))]
    Condition {
        source_text: String,
        args: Vec<Value>,
        #[source]
        cause: BoxError,
    },

    /// A rule's right-hand side returned an error.
    #[error("action of rule `{rule}` failed for facts [{}]: {cause}", join_handles(.facts))]
    Action {
        rule: String,
        facts: Vec<FactHandle>,
        #[source]
        cause: BoxError,
    },
}

impl EvaluationError {
    pub fn condition(source_text: impl Into<String>, args: &[Value], cause: BoxError) -> Self {
        EvaluationError::Condition {
            source_text: source_text.into(),
            args: args.to_vec(),
            cause,
        }
    }

    pub fn action(rule: impl Into<String>, facts: &[FactHandle], cause: BoxError) -> Self {
        EvaluationError::Action {
            rule: rule.into(),
            facts: facts.to_vec(),
            cause,
        }
    }
}

fn join_handles(handles: &[FactHandle]) -> String {
    handles
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for evaluation.
pub type EvaluationResult<T> = Result<T, EvaluationError>;
