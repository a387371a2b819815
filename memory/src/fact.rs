//! Runtime facts.

use ember_core::{AlphaId, FactHandle, FactObject, FieldId, Value};

/// A fact as seen by type memory: the object plus the field values and
/// alpha-test outcomes read when it was inserted.
///
/// Field values are indexed by `FieldId`, alpha outcomes by `AlphaId`. Both
/// arrays only grow, and only when a field or alpha condition is declared
/// after the fact was inserted.
#[derive(Debug, Clone)]
pub struct RuntimeFact {
    handle: FactHandle,
    object: FactObject,
    values: Box<[Value]>,
    alpha_tests: Box<[bool]>,
}

impl RuntimeFact {
    pub fn new(handle: FactHandle, object: FactObject, values: Vec<Value>, alpha_tests: Vec<bool>) -> Self {
        Self {
            handle,
            object,
            values: values.into_boxed_slice(),
            alpha_tests: alpha_tests.into_boxed_slice(),
        }
    }

    pub fn handle(&self) -> FactHandle {
        self.handle
    }

    pub fn object(&self) -> &FactObject {
        &self.object
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, field: FieldId) -> Option<&Value> {
        self.values.get(field.index())
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// Outcome of an alpha condition. Conditions unknown to this fact fail.
    pub fn alpha_test(&self, id: AlphaId) -> bool {
        self.alpha_tests.get(id.index()).copied().unwrap_or(false)
    }

    pub fn alpha_count(&self) -> usize {
        self.alpha_tests.len()
    }

    /// Append the value of a newly declared field.
    pub fn append_value(&mut self, value: Value) {
        let mut grown = Vec::with_capacity(self.values.len() + 1);
        grown.extend_from_slice(&self.values);
        grown.push(value);
        self.values = grown.into_boxed_slice();
    }

    /// Append the outcome of a newly declared alpha condition.
    pub fn append_alpha_test(&mut self, passed: bool) {
        let mut grown = Vec::with_capacity(self.alpha_tests.len() + 1);
        grown.extend_from_slice(&self.alpha_tests);
        grown.push(passed);
        self.alpha_tests = grown.into_boxed_slice();
    }
}
