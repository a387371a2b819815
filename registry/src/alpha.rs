//! Alpha (single-fact) conditions.

use ember_core::{AlphaId, EvaluationError, EvaluationResult, FieldId, Predicate, Value};

/// A compiled predicate over fields of a single fact.
///
/// Conditions with the same source text over the same fields are declared
/// once per type and share an `AlphaId`.
#[derive(Debug, Clone)]
pub struct AlphaCondition {
    pub id: AlphaId,
    pub source: String,
    pub fields: Vec<FieldId>,
    pub predicate: Predicate,
}

impl AlphaCondition {
    pub fn new(source: impl Into<String>, fields: Vec<FieldId>, predicate: Predicate) -> Self {
        Self {
            id: AlphaId::new(0),
            source: source.into(),
            fields,
            predicate,
        }
    }

    /// Evaluate against a fact's value array (indexed by `FieldId`).
    pub fn evaluate(&self, values: &[Value]) -> EvaluationResult<bool> {
        let args: Vec<Value> = self
            .fields
            .iter()
            .map(|f| values.get(f.index()).cloned().unwrap_or(Value::Null))
            .collect();
        self.predicate
            .test(&args)
            .map_err(|cause| EvaluationError::condition(&self.source, &args, cause))
    }
}
