//! Value interning.
//!
//! Join keys are built from `ValueHandle`s rather than values so that key
//! hashing and equality are integer operations. One indexer exists per
//! logical type; it is append-only for the lifetime of the session.

use ember_core::{Value, ValueHandle};
use std::collections::HashMap;

/// Maps field values to compact handles and back.
#[derive(Debug, Clone, Default)]
pub struct ValueIndexer {
    ids: HashMap<Value, ValueHandle>,
    values: Vec<Value>,
}

impl ValueIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `value`, assigning a new one on first sight.
    pub fn intern(&mut self, value: &Value) -> ValueHandle {
        if let Some(handle) = self.ids.get(value) {
            return *handle;
        }
        let handle = ValueHandle::new(self.values.len() as u32);
        self.values.push(value.clone());
        self.ids.insert(value.clone(), handle);
        handle
    }

    /// Handle for `value` if it was interned before.
    pub fn lookup(&self, value: &Value) -> Option<ValueHandle> {
        self.ids.get(value).copied()
    }

    /// The value behind a handle.
    pub fn get(&self, handle: ValueHandle) -> Option<&Value> {
        self.values.get(handle.index())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
