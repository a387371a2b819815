//! Key memory: the beta-side view of one type.
//!
//! A key bucket groups the facts of one type that pass an alpha mask by the
//! interned values of a fixed set of fields. Each distinct key is a
//! `ValueRow`. Condition nodes join rows, not facts, so facts sharing a key
//! are joined once.

use crate::{AlphaMask, KeyState, MemoryKey, RowId, ValueRow};
use ember_core::{FactHandle, FieldId, TypeId};
use indexmap::IndexSet;
use std::collections::HashMap;
use std::fmt;
use tracing::trace;

/// The fields a key bucket indexes, sorted by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FieldsKey(Box<[FieldId]>);

impl FieldsKey {
    pub fn new(mut fields: Vec<FieldId>) -> Self {
        fields.sort();
        fields.dedup();
        Self(fields.into_boxed_slice())
    }

    pub fn fields(&self) -> &[FieldId] {
        &self.0
    }

    /// Position of a field inside keys of this bucket.
    pub fn position(&self, field: FieldId) -> Option<usize> {
        self.0.binary_search(&field).ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FieldsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.0.iter().map(|id| id.to_string()).collect();
        write!(f, "[{}]", names.join(","))
    }
}

/// Value rows of one (type, fields, alpha mask) combination.
#[derive(Debug, Clone)]
pub struct KeyMemoryBucket {
    type_id: TypeId,
    fields: FieldsKey,
    mask: AlphaMask,
    /// Row arena; `None` marks a free slot.
    rows: Vec<Option<ValueRow>>,
    free: Vec<RowId>,
    index: HashMap<MemoryKey, RowId>,
    /// Rows committed in earlier cycles.
    main: IndexSet<RowId>,
    /// Rows whose key first appeared this cycle.
    delta: IndexSet<RowId>,
    /// Committed rows that gained facts this cycle.
    touched: IndexSet<RowId>,
    /// Rows emptied this cycle, freed on commit unless revived.
    emptied: Vec<RowId>,
    fact_rows: HashMap<FactHandle, RowId>,
}

impl KeyMemoryBucket {
    pub fn new(type_id: TypeId, fields: FieldsKey, mask: AlphaMask) -> Self {
        Self {
            type_id,
            fields,
            mask,
            rows: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            main: IndexSet::new(),
            delta: IndexSet::new(),
            touched: IndexSet::new(),
            emptied: Vec::new(),
            fact_rows: HashMap::new(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn fields(&self) -> &FieldsKey {
        &self.fields
    }

    pub fn mask(&self) -> &AlphaMask {
        &self.mask
    }

    // ==================== Mutation ====================

    /// Record a fact under `key`. The fact lands in the row's delta.
    pub fn insert(&mut self, handle: FactHandle, key: MemoryKey) -> RowId {
        debug_assert_eq!(key.len(), self.fields.len());
        let row_id = match self.index.get(&key) {
            Some(row_id) => *row_id,
            None => {
                let row_id = self.allocate(ValueRow::new(key.clone()));
                self.index.insert(key, row_id);
                self.delta.insert(row_id);
                row_id
            }
        };

        if let Some(row) = self.rows[row_id.index()].as_mut() {
            row.add(handle);
            if row.is_known() {
                self.touched.insert(row_id);
            }
        }
        self.fact_rows.insert(handle, row_id);
        row_id
    }

    /// Remove a fact. A row left without facts is marked deleted and kept
    /// until commit. Unknown handles are ignored.
    pub fn delete(&mut self, handle: FactHandle) -> bool {
        let Some(row_id) = self.fact_rows.remove(&handle) else {
            return false;
        };
        if let Some(row) = self.rows[row_id.index()].as_mut() {
            if row.remove(handle) {
                trace!(type_id = %self.type_id, row = %row_id, "row emptied");
                self.emptied.push(row_id);
            }
        }
        true
    }

    /// Merge this cycle's changes: free emptied rows, promote new rows to
    /// main and fold new facts into their rows' main sets.
    ///
    /// Join indexes referencing emptied rows must be pruned before this is
    /// called, since freed slots are reused.
    pub fn commit(&mut self) {
        for row_id in std::mem::take(&mut self.emptied) {
            let still_deleted = self.rows[row_id.index()]
                .as_ref()
                .map(|row| row.is_deleted())
                .unwrap_or(false);
            if !still_deleted {
                continue;
            }
            if let Some(row) = self.rows[row_id.index()].take() {
                self.index.remove(row.memory_key());
            }
            self.main.swap_remove(&row_id);
            self.delta.swap_remove(&row_id);
            self.touched.swap_remove(&row_id);
            self.free.push(row_id);
        }

        for row_id in std::mem::take(&mut self.delta) {
            if let Some(row) = self.rows[row_id.index()].as_mut() {
                row.commit();
                self.main.insert(row_id);
            }
        }
        for row_id in std::mem::take(&mut self.touched) {
            if let Some(row) = self.rows[row_id.index()].as_mut() {
                row.commit();
            }
        }
    }

    fn allocate(&mut self, row: ValueRow) -> RowId {
        match self.free.pop() {
            Some(row_id) => {
                self.rows[row_id.index()] = Some(row);
                row_id
            }
            None => {
                let row_id = RowId::new(self.rows.len() as u32);
                self.rows.push(Some(row));
                row_id
            }
        }
    }

    // ==================== Lookups ====================

    pub fn row(&self, row_id: RowId) -> Option<&ValueRow> {
        self.rows.get(row_id.index()).and_then(|r| r.as_ref())
    }

    /// Rows that are gone, or marked deleted this cycle.
    pub fn is_deleted(&self, row_id: RowId) -> bool {
        self.row(row_id).map(|r| r.is_deleted()).unwrap_or(true)
    }

    pub fn key_state(&self, row_id: RowId) -> Option<KeyState> {
        self.row(row_id).map(|r| r.state())
    }

    /// Live rows committed in earlier cycles.
    pub fn main_rows(&self) -> impl Iterator<Item = &RowId> + '_ {
        self.main.iter().filter(move |id| !self.is_deleted(**id))
    }

    /// Live rows whose key first appeared this cycle.
    pub fn delta_rows(&self) -> impl Iterator<Item = &RowId> + '_ {
        self.delta.iter().filter(move |id| !self.is_deleted(**id))
    }

    /// Live committed rows that gained facts this cycle.
    pub fn touched_rows(&self) -> impl Iterator<Item = &RowId> + '_ {
        self.touched.iter().filter(move |id| !self.is_deleted(**id))
    }

    pub fn has_main(&self) -> bool {
        self.main_rows().next().is_some()
    }

    pub fn has_delta(&self) -> bool {
        self.delta_rows().next().is_some()
    }

    pub fn has_touched(&self) -> bool {
        self.touched_rows().next().is_some()
    }

    /// Row holding a fact.
    pub fn row_of(&self, handle: FactHandle) -> Option<RowId> {
        self.fact_rows.get(&handle).copied()
    }

    /// Number of rows, live or awaiting commit.
    pub fn row_count(&self) -> usize {
        self.index.len()
    }

    pub fn fact_count(&self) -> usize {
        self.fact_rows.len()
    }
}
