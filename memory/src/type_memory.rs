//! Per-type memory.
//!
//! A `TypeMemory` holds the runtime facts of one logical type and fans every
//! change out to the alpha buckets and key buckets built over that type.
//! Changes arrive in two steps: `insert_single`/`delete_single` update the
//! fact maps and queue the change, `commit_insert`/`commit_delete` propagate
//! the queue into the buckets. `commit` ends the cycle by merging all deltas
//! into main.

use crate::{
    AlphaBucket, AlphaMask, FieldsKey, KeyMemoryBucket, MemoryError, MemoryResult, RuntimeFact,
    ValueIndexer,
};
use ember_core::{FactHandle, FactObject, TypeId, Value};
use ember_registry::LogicalType;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{trace, warn};

/// Facts and buckets of one logical type.
#[derive(Debug, Clone)]
pub struct TypeMemory {
    ty: Arc<LogicalType>,
    main: IndexMap<FactHandle, RuntimeFact>,
    delta: IndexMap<FactHandle, RuntimeFact>,
    /// Inserted into `delta`, not yet propagated to buckets.
    pending_inserts: Vec<FactHandle>,
    /// Removed from the fact maps, not yet propagated to buckets.
    pending_deletes: Vec<FactHandle>,
    values: ValueIndexer,
    alpha_buckets: Vec<AlphaBucket>,
    alpha_index: HashMap<AlphaMask, usize>,
    key_buckets: Vec<KeyMemoryBucket>,
    key_index: HashMap<(FieldsKey, AlphaMask), usize>,
}

impl TypeMemory {
    pub fn new(ty: Arc<LogicalType>, capacity: usize) -> Self {
        Self {
            ty,
            main: IndexMap::with_capacity(capacity),
            delta: IndexMap::new(),
            pending_inserts: Vec::new(),
            pending_deletes: Vec::new(),
            values: ValueIndexer::new(),
            alpha_buckets: Vec::new(),
            alpha_index: HashMap::new(),
            key_buckets: Vec::new(),
            key_index: HashMap::new(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.ty.id
    }

    pub fn logical_type(&self) -> &Arc<LogicalType> {
        &self.ty
    }

    // ==================== Fact Changes ====================

    /// Read the fact's fields and alpha outcomes and place it in delta.
    /// Returns false if the handle is already present.
    pub fn insert_single(&mut self, handle: FactHandle, object: FactObject) -> MemoryResult<bool> {
        if self.main.contains_key(&handle) || self.delta.contains_key(&handle) {
            warn!(%handle, type_name = %self.ty.name, "fact already in memory, skipping");
            return Ok(false);
        }

        let values = self.ty.read_all(&object);
        let mut tests = Vec::with_capacity(self.ty.alpha_count());
        for condition in self.ty.alpha_conditions() {
            tests.push(condition.evaluate(&values)?);
        }

        self.delta
            .insert(handle, RuntimeFact::new(handle, object, values, tests));
        self.pending_inserts.push(handle);
        Ok(true)
    }

    /// Remove a fact and queue the removal. Unknown handles are a no-op.
    pub fn delete_single(&mut self, handle: FactHandle) -> bool {
        let removed = self
            .main
            .swap_remove(&handle)
            .or_else(|| self.delta.swap_remove(&handle));
        match removed {
            Some(_) => {
                self.pending_inserts.retain(|h| *h != handle);
                self.pending_deletes.push(handle);
                true
            }
            None => false,
        }
    }

    /// Propagate queued inserts into every bucket whose mask the fact passes.
    pub fn commit_insert(&mut self) {
        let Self {
            delta,
            pending_inserts,
            values,
            alpha_buckets,
            key_buckets,
            ..
        } = self;

        for handle in pending_inserts.drain(..) {
            let Some(fact) = delta.get(&handle) else {
                continue;
            };
            for bucket in alpha_buckets.iter_mut() {
                bucket.insert(fact);
            }
            for bucket in key_buckets.iter_mut() {
                if bucket.mask().test(fact) {
                    let key = intern_key(values, bucket.fields(), fact);
                    bucket.insert(handle, key);
                }
            }
        }
    }

    /// Propagate queued deletes into every bucket.
    pub fn commit_delete(&mut self) {
        for handle in self.pending_deletes.drain(..) {
            for bucket in self.alpha_buckets.iter_mut() {
                bucket.delete(handle);
            }
            for bucket in self.key_buckets.iter_mut() {
                bucket.delete(handle);
            }
        }
    }

    /// End of cycle: propagate anything still queued, then merge all
    /// deltas into main.
    pub fn commit(&mut self) {
        self.commit_delete();
        self.commit_insert();
        let delta = std::mem::take(&mut self.delta);
        self.main.extend(delta);
        for bucket in &mut self.alpha_buckets {
            bucket.commit();
        }
        for bucket in &mut self.key_buckets {
            bucket.commit();
        }
    }

    /// True while anything inserted or deleted this cycle is not committed.
    pub fn has_uncommitted(&self) -> bool {
        !self.delta.is_empty() || !self.pending_inserts.is_empty() || !self.pending_deletes.is_empty()
    }

    // ==================== Declarations ====================

    /// Bring this memory in line with a newer definition of its type:
    /// back-fill values of new fields into every fact, then outcomes of new
    /// alpha conditions.
    pub fn sync_type(&mut self, ty: Arc<LogicalType>) -> MemoryResult<()> {
        if Arc::ptr_eq(&self.ty, &ty) {
            return Ok(());
        }
        let old_fields = self.ty.field_count();
        let old_alpha = self.ty.alpha_count();
        self.ty = ty;

        for field in old_fields..self.ty.field_count() {
            self.on_new_active_field(field);
        }
        if self.ty.alpha_count() > old_alpha {
            self.on_new_alpha_conditions(old_alpha)?;
        }
        Ok(())
    }

    fn on_new_active_field(&mut self, field: usize) {
        let Some(field) = self.ty.fields().get(field) else {
            return;
        };
        trace!(type_name = %self.ty.name, field = %field.name, "back-filling field");
        for fact in self.main.values_mut().chain(self.delta.values_mut()) {
            let value = field.read(fact.object());
            fact.append_value(value);
        }
    }

    fn on_new_alpha_conditions(&mut self, first_new: usize) -> MemoryResult<()> {
        if self.has_uncommitted() {
            return Err(MemoryError::UncommittedDelta {
                type_id: self.type_id(),
            });
        }
        let conditions = &self.ty.alpha_conditions()[first_new..];
        for fact in self.main.values_mut() {
            for condition in conditions {
                let passed = condition.evaluate(fact.values())?;
                fact.append_alpha_test(passed);
            }
        }
        Ok(())
    }

    /// Index of the alpha bucket for `mask`, created and back-filled from
    /// main on first request.
    pub fn touch_alpha_bucket(&mut self, mask: &AlphaMask) -> MemoryResult<usize> {
        if let Some(index) = self.alpha_index.get(mask) {
            return Ok(*index);
        }
        if self.has_uncommitted() {
            return Err(MemoryError::UncommittedDelta {
                type_id: self.type_id(),
            });
        }

        let mut bucket = AlphaBucket::new(mask.clone());
        for fact in self.main.values() {
            bucket.insert(fact);
        }
        bucket.commit();

        let index = self.alpha_buckets.len();
        trace!(type_name = %self.ty.name, %mask, size = bucket.len(), "created alpha bucket");
        self.alpha_buckets.push(bucket);
        self.alpha_index.insert(mask.clone(), index);
        Ok(index)
    }

    /// Index of the key bucket for (`fields`, `mask`), created and
    /// back-filled from main on first request.
    pub fn touch_key_bucket(&mut self, fields: &FieldsKey, mask: &AlphaMask) -> MemoryResult<usize> {
        let address = (fields.clone(), mask.clone());
        if let Some(index) = self.key_index.get(&address) {
            return Ok(*index);
        }
        if self.has_uncommitted() {
            return Err(MemoryError::UncommittedDelta {
                type_id: self.type_id(),
            });
        }

        let mut bucket = KeyMemoryBucket::new(self.type_id(), fields.clone(), mask.clone());
        for (handle, fact) in &self.main {
            if mask.test(fact) {
                let key = intern_key(&mut self.values, fields, fact);
                bucket.insert(*handle, key);
            }
        }
        bucket.commit();

        let index = self.key_buckets.len();
        trace!(type_name = %self.ty.name, %fields, %mask, rows = bucket.row_count(), "created key bucket");
        self.key_buckets.push(bucket);
        self.key_index.insert(address, index);
        Ok(index)
    }

    // ==================== Lookups ====================

    pub fn alpha_bucket(&self, index: usize) -> Option<&AlphaBucket> {
        self.alpha_buckets.get(index)
    }

    pub fn key_bucket(&self, index: usize) -> Option<&KeyMemoryBucket> {
        self.key_buckets.get(index)
    }

    /// The value behind an interned handle.
    pub fn value(&self, handle: ember_core::ValueHandle) -> Option<&Value> {
        self.values.get(handle)
    }

    pub fn get(&self, handle: FactHandle) -> Option<&RuntimeFact> {
        self.main.get(&handle).or_else(|| self.delta.get(&handle))
    }

    pub fn contains(&self, handle: FactHandle) -> bool {
        self.main.contains_key(&handle) || self.delta.contains_key(&handle)
    }

    /// Committed facts.
    pub fn main(&self) -> impl Iterator<Item = &RuntimeFact> + '_ {
        self.main.values()
    }

    /// Facts inserted this cycle.
    pub fn delta(&self) -> impl Iterator<Item = &RuntimeFact> + '_ {
        self.delta.values()
    }

    /// All facts, committed first.
    pub fn facts(&self) -> impl Iterator<Item = &RuntimeFact> + '_ {
        self.main.values().chain(self.delta.values())
    }

    pub fn len(&self) -> usize {
        self.main.len() + self.delta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_empty() && self.delta.is_empty()
    }
}

fn intern_key(values: &mut ValueIndexer, fields: &FieldsKey, fact: &RuntimeFact) -> crate::MemoryKey {
    fields
        .fields()
        .iter()
        .map(|f| values.intern(fact.value(*f).unwrap_or(&Value::Null)))
        .collect()
}
