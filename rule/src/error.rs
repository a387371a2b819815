//! Rule error types.

use ember_core::EvaluationError;
use ember_memory::MemoryError;
use ember_network::NetworkError;
use ember_registry::RegistryError;
use thiserror::Error;

/// Result type for rule operations.
pub type RuleResult<T> = Result<T, RuleError>;

/// Errors raised while compiling rules or running their actions.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Rule `{rule}` declares fact variable `{var}` twice")]
    DuplicateVariable { rule: String, var: String },

    #[error("Rule `{rule}` references unknown fact variable `{var}`")]
    UnknownVariable { rule: String, var: String },

    #[error("Condition `{condition}` of rule `{rule}` references no fields")]
    EmptyReferences { rule: String, condition: String },

    #[error("Condition `{condition}` of rule `{rule}` has non-positive complexity {complexity}")]
    InvalidComplexity {
        rule: String,
        condition: String,
        complexity: f64,
    },

    #[error("Rule `{name}` is already deployed")]
    DuplicateRule { name: String },

    #[error("Unknown rule `{name}`")]
    UnknownRule { name: String },

    #[error("Rule `{rule}` declares no condition `{condition}`")]
    UnknownCondition { rule: String, condition: String },

    #[error("Fact bound to `{var}` is no longer in memory")]
    FactGone { var: String },

    #[error("Fact bound to `{var}` is not a {expected}")]
    WrongType { var: String, expected: &'static str },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

impl RuleError {
    pub fn duplicate_variable(rule: impl Into<String>, var: impl Into<String>) -> Self {
        Self::DuplicateVariable {
            rule: rule.into(),
            var: var.into(),
        }
    }

    pub fn unknown_variable(rule: impl Into<String>, var: impl Into<String>) -> Self {
        Self::UnknownVariable {
            rule: rule.into(),
            var: var.into(),
        }
    }

    pub fn empty_references(rule: impl Into<String>, condition: impl Into<String>) -> Self {
        Self::EmptyReferences {
            rule: rule.into(),
            condition: condition.into(),
        }
    }

    pub fn duplicate_rule(name: impl Into<String>) -> Self {
        Self::DuplicateRule { name: name.into() }
    }

    pub fn unknown_rule(name: impl Into<String>) -> Self {
        Self::UnknownRule { name: name.into() }
    }

    pub fn unknown_condition(rule: impl Into<String>, condition: impl Into<String>) -> Self {
        Self::UnknownCondition {
            rule: rule.into(),
            condition: condition.into(),
        }
    }

    pub fn fact_gone(var: impl Into<String>) -> Self {
        Self::FactGone { var: var.into() }
    }
}
