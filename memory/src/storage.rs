//! Fact storage.
//!
//! Owns the objects of a session. Handles are assigned here on insert and
//! never reused. Every change is mirrored into the action buffer; type
//! memory catches up when the buffer is flushed at the start of a cycle.

use crate::{Action, ActionBuffer, MemoryError, MemoryResult};
use ember_core::{short_name, FactHandle, FactObject, TypeId};
use std::collections::HashMap;
use tracing::{trace, warn};

/// Handle-to-object mapping plus the pending action buffer.
#[derive(Debug, Clone, Default)]
pub struct FactStorage {
    next_id: u64,
    objects: HashMap<FactHandle, FactObject>,
    /// Object identity, per logical type, to handle.
    identities: HashMap<(TypeId, usize), FactHandle>,
    buffer: ActionBuffer,
}

impl FactStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            objects: HashMap::with_capacity(capacity),
            identities: HashMap::with_capacity(capacity),
            ..Default::default()
        }
    }

    // ==================== Lifecycle ====================

    /// Insert an object under a logical type. Inserting an object that is
    /// already stored under that type returns its existing handle and
    /// records nothing.
    pub fn insert(&mut self, type_id: TypeId, object: FactObject) -> (FactHandle, bool) {
        let identity = (type_id, object.identity());
        if let Some(handle) = self.identities.get(&identity) {
            warn!(%handle, object = ?object, "fact already inserted, skipping");
            return (*handle, false);
        }

        let handle = FactHandle::new(self.next_id, type_id);
        self.next_id += 1;
        self.identities.insert(identity, handle);
        self.objects.insert(handle, object);
        self.buffer.insert(handle);
        trace!(%handle, "fact inserted");
        (handle, true)
    }

    /// Replace the object behind a handle. Returns false for unknown
    /// handles. The new object must have the same native type.
    pub fn update(&mut self, handle: FactHandle, object: FactObject) -> MemoryResult<bool> {
        let Some(current) = self.objects.get(&handle) else {
            warn!(%handle, "update of unknown fact ignored");
            return Ok(false);
        };
        if current.native_type() != object.native_type() {
            return Err(MemoryError::TypeMismatch {
                handle,
                expected: short_name(current.type_name()),
                actual: short_name(object.type_name()),
            });
        }

        self.identities
            .remove(&(handle.type_id(), current.identity()));
        self.identities
            .insert((handle.type_id(), object.identity()), handle);
        self.objects.insert(handle, object);
        self.buffer.update(handle);
        trace!(%handle, "fact updated");
        Ok(true)
    }

    /// Remove a fact. Unknown handles are a no-op.
    pub fn delete(&mut self, handle: FactHandle) -> Option<FactObject> {
        let object = self.objects.remove(&handle)?;
        self.identities
            .remove(&(handle.type_id(), object.identity()));
        self.buffer.delete(handle);
        trace!(%handle, "fact deleted");
        Some(object)
    }

    // ==================== Lookups ====================

    pub fn get(&self, handle: FactHandle) -> Option<&FactObject> {
        self.objects.get(&handle)
    }

    pub fn contains(&self, handle: FactHandle) -> bool {
        self.objects.contains_key(&handle)
    }

    /// Every stored fact, ordered by handle.
    pub fn facts(&self) -> Vec<(FactHandle, &FactObject)> {
        let mut facts: Vec<_> = self.objects.iter().map(|(h, o)| (*h, o)).collect();
        facts.sort_by_key(|(h, _)| *h);
        facts
    }

    /// Facts stored under one logical type, ordered by handle.
    pub fn facts_of(&self, type_id: TypeId) -> Vec<(FactHandle, &FactObject)> {
        let mut facts = self.facts();
        facts.retain(|(h, _)| h.type_id() == type_id);
        facts
    }

    /// Handle of an object stored under `type_id`.
    pub fn handle_of(&self, type_id: TypeId, object: &FactObject) -> Option<FactHandle> {
        self.identities.get(&(type_id, object.identity())).copied()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    // ==================== Buffer ====================

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn pending(&self) -> &ActionBuffer {
        &self.buffer
    }

    pub fn pending_action(&self, handle: FactHandle) -> Option<Action> {
        self.buffer.get(handle)
    }

    /// Drain the buffer for flushing into type memory.
    pub fn take_pending(&mut self) -> ActionBuffer {
        std::mem::take(&mut self.buffer)
    }
}
