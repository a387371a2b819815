//! Session memory: one `TypeMemory` per declared type.
//!
//! Applies flushed action buffers in two phases, deletes before inserts, so
//! an update never observes its own previous version in any bucket. A fact
//! whose alpha conditions fail to evaluate is held back and inserted again
//! by the next apply.

use crate::{
    Action, ActionBuffer, AlphaBucket, AlphaMask, FactStorage, FieldsKey, KeyMemoryBucket,
    MemoryError, MemoryResult, RuntimeFact, TypeMemory,
};
use ember_core::{FactHandle, TypeId, Value, ValueHandle};
use ember_registry::TypeRegistry;
use tracing::{debug, trace};

/// Address of a key bucket inside session memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyBucketRef {
    pub type_id: TypeId,
    pub index: usize,
}

/// Address of an alpha bucket inside session memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlphaBucketRef {
    pub type_id: TypeId,
    pub index: usize,
}

/// Per-type memories of a session, indexed by `TypeId`.
#[derive(Debug, Clone, Default)]
pub struct SessionMemory {
    types: Vec<Option<TypeMemory>>,
    capacity: usize,
    /// Facts whose insert failed in the last apply.
    retry: Vec<FactHandle>,
}

impl SessionMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            types: Vec::new(),
            capacity,
            retry: Vec::new(),
        }
    }

    /// Create memories for newly declared types and bring existing ones up
    /// to date with their current definitions.
    pub fn sync_types(&mut self, registry: &TypeRegistry) -> MemoryResult<()> {
        for ty in registry.types() {
            let index = ty.id.index();
            if index >= self.types.len() {
                self.types.resize_with(index + 1, || None);
            }
            match &mut self.types[index] {
                Some(memory) => memory.sync_type(ty.clone())?,
                slot @ None => {
                    trace!(type_name = %ty.name, "created type memory");
                    *slot = Some(TypeMemory::new(ty.clone(), self.capacity));
                }
            }
        }
        Ok(())
    }

    // ==================== Cycle Protocol ====================

    /// Apply a flushed buffer. Objects are read from `storage`, which must
    /// already reflect every recorded action.
    ///
    /// Returns the number of facts that entered memory. If an alpha
    /// condition fails, the remaining actions are still applied and the
    /// first error is returned.
    pub fn apply(&mut self, mut buffer: ActionBuffer, storage: &FactStorage) -> MemoryResult<usize> {
        let mut grouped = buffer.take_by_type();
        for handle in self.retry.drain(..) {
            let actions = grouped.entry(handle.type_id()).or_default();
            if !actions.iter().any(|(h, _)| *h == handle) {
                actions.push((handle, Action::Insert));
            }
        }
        let mut inserted = 0;
        let mut failed = Vec::new();
        let mut first_error = None;

        for (type_id, actions) in &grouped {
            let memory = self.type_memory_mut(*type_id)?;
            for (handle, action) in actions {
                if matches!(action, Action::Delete | Action::Update) {
                    memory.delete_single(*handle);
                }
            }
        }

        for (type_id, actions) in &grouped {
            let memory = self.type_memory_mut(*type_id)?;
            for (handle, action) in actions {
                if matches!(action, Action::Insert | Action::Update) {
                    let Some(object) = storage.get(*handle) else {
                        continue;
                    };
                    match memory.insert_single(*handle, object.clone()) {
                        Ok(true) => inserted += 1,
                        Ok(false) => {}
                        Err(e) => {
                            failed.push(*handle);
                            first_error.get_or_insert(e);
                        }
                    }
                }
            }
        }

        // Also picks up changes queued by an earlier apply that failed.
        for memory in self.types.iter_mut().flatten() {
            memory.commit_delete();
            memory.commit_insert();
        }

        debug!(types = grouped.len(), inserted, failed = failed.len(), "applied pending actions");
        self.retry = failed;
        match first_error {
            Some(e) => Err(e),
            None => Ok(inserted),
        }
    }

    /// Merge every delta into main.
    pub fn commit(&mut self) {
        for memory in self.types.iter_mut().flatten() {
            memory.commit();
        }
    }

    /// True while a delta awaits commit or a failed insert awaits retry.
    pub fn has_uncommitted(&self) -> bool {
        !self.retry.is_empty() || self.types.iter().flatten().any(|m| m.has_uncommitted())
    }

    // ==================== Buckets ====================

    pub fn touch_alpha_bucket(&mut self, type_id: TypeId, mask: &AlphaMask) -> MemoryResult<AlphaBucketRef> {
        let index = self.type_memory_mut(type_id)?.touch_alpha_bucket(mask)?;
        Ok(AlphaBucketRef { type_id, index })
    }

    pub fn touch_key_bucket(
        &mut self,
        type_id: TypeId,
        fields: &FieldsKey,
        mask: &AlphaMask,
    ) -> MemoryResult<KeyBucketRef> {
        let index = self.type_memory_mut(type_id)?.touch_key_bucket(fields, mask)?;
        Ok(KeyBucketRef { type_id, index })
    }

    pub fn alpha_bucket(&self, bucket: AlphaBucketRef) -> Option<&AlphaBucket> {
        self.type_memory(bucket.type_id)?.alpha_bucket(bucket.index)
    }

    pub fn key_bucket(&self, bucket: KeyBucketRef) -> Option<&KeyMemoryBucket> {
        self.type_memory(bucket.type_id)?.key_bucket(bucket.index)
    }

    // ==================== Lookups ====================

    pub fn type_memory(&self, type_id: TypeId) -> Option<&TypeMemory> {
        self.types.get(type_id.index()).and_then(Option::as_ref)
    }

    fn type_memory_mut(&mut self, type_id: TypeId) -> MemoryResult<&mut TypeMemory> {
        self.types
            .get_mut(type_id.index())
            .and_then(Option::as_mut)
            .ok_or(MemoryError::UndeclaredType(type_id))
    }

    /// The interned value behind `handle` in the memory of `type_id`.
    pub fn value(&self, type_id: TypeId, handle: ValueHandle) -> Option<&Value> {
        self.type_memory(type_id)?.value(handle)
    }

    pub fn fact(&self, handle: FactHandle) -> Option<&RuntimeFact> {
        self.type_memory(handle.type_id())?.get(handle)
    }

    pub fn fact_count(&self) -> usize {
        self.types.iter().flatten().map(|m| m.len()).sum()
    }
}
