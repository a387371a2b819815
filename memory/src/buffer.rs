//! Action buffer for pending working-memory changes.
//!
//! Inserts, updates and deletes are recorded here and applied to type memory
//! at the start of the next fire cycle. At most one action is kept per fact:
//! later actions on the same handle are folded into the pending one.

use ember_core::{FactHandle, TypeId};
use indexmap::IndexMap;

/// A pending change to one fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Insert,
    /// Applied as a delete followed by an insert under the same handle.
    Update,
    Delete,
}

/// Pending actions, in the order they were first recorded.
#[derive(Debug, Clone, Default)]
pub struct ActionBuffer {
    actions: IndexMap<FactHandle, Action>,
}

impl ActionBuffer {
    /// Create a new empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an insert of a freshly assigned handle.
    pub fn insert(&mut self, handle: FactHandle) {
        self.actions.insert(handle, Action::Insert);
    }

    /// Record an update. An update of a fact inserted since the last flush
    /// stays an insert.
    pub fn update(&mut self, handle: FactHandle) {
        self.actions.entry(handle).or_insert(Action::Update);
    }

    /// Record a delete. A delete of a fact inserted since the last flush
    /// cancels the insert; memory never sees the fact.
    pub fn delete(&mut self, handle: FactHandle) {
        match self.actions.get(&handle) {
            Some(Action::Insert) => {
                self.actions.shift_remove(&handle);
            }
            _ => {
                self.actions.insert(handle, Action::Delete);
            }
        }
    }

    pub fn get(&self, handle: FactHandle) -> Option<Action> {
        self.actions.get(&handle).copied()
    }

    /// Remove and return all pending actions.
    pub fn take(&mut self) -> Vec<(FactHandle, Action)> {
        std::mem::take(&mut self.actions).into_iter().collect()
    }

    /// Pending actions grouped by type, each group in recorded order.
    pub fn take_by_type(&mut self) -> IndexMap<TypeId, Vec<(FactHandle, Action)>> {
        let mut grouped: IndexMap<TypeId, Vec<(FactHandle, Action)>> = IndexMap::new();
        for (handle, action) in self.take() {
            grouped.entry(handle.type_id()).or_default().push((handle, action));
        }
        grouped
    }

    /// Number of pending inserts and updates.
    pub fn delta_operations(&self) -> usize {
        self.actions
            .values()
            .filter(|a| !matches!(a, Action::Delete))
            .count()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }
}
