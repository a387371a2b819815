//! Value rows: facts sharing one join key.

use ember_core::{FactHandle, ValueHandle};
use indexmap::IndexSet;
use std::fmt;

/// Interned field values forming a join key.
pub type MemoryKey = Box<[ValueHandle]>;

/// Slot of a value row inside its key bucket. Slots of deleted rows are
/// reused after commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(pub u32);

impl RowId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row{}", self.0)
    }
}

/// How a row relates to the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// The key first appeared this cycle; all its facts are new.
    NewKeyNewFacts,
    /// The key was committed earlier and gained facts this cycle.
    KnownKeyNewFacts,
    /// Nothing about this key changed this cycle, apart from deletions.
    KnownKeyKnownFacts,
}

/// A join key and the facts currently sharing it.
#[derive(Debug, Clone)]
pub struct ValueRow {
    key: MemoryKey,
    main_facts: IndexSet<FactHandle>,
    delta_facts: IndexSet<FactHandle>,
    known: bool,
    deleted: bool,
}

impl ValueRow {
    pub(crate) fn new(key: MemoryKey) -> Self {
        Self {
            key,
            main_facts: IndexSet::new(),
            delta_facts: IndexSet::new(),
            known: false,
            deleted: false,
        }
    }

    pub fn key(&self) -> &[ValueHandle] {
        &self.key
    }

    pub(crate) fn memory_key(&self) -> &MemoryKey {
        &self.key
    }

    pub fn state(&self) -> KeyState {
        if !self.known {
            KeyState::NewKeyNewFacts
        } else if !self.delta_facts.is_empty() {
            KeyState::KnownKeyNewFacts
        } else {
            KeyState::KnownKeyKnownFacts
        }
    }

    /// Facts committed in earlier cycles.
    pub fn main_facts(&self) -> &IndexSet<FactHandle> {
        &self.main_facts
    }

    /// Facts added this cycle.
    pub fn delta_facts(&self) -> &IndexSet<FactHandle> {
        &self.delta_facts
    }

    /// All facts, committed first.
    pub fn facts(&self) -> impl Iterator<Item = FactHandle> + '_ {
        self.main_facts.iter().chain(self.delta_facts.iter()).copied()
    }

    pub fn fact_count(&self) -> usize {
        self.main_facts.len() + self.delta_facts.len()
    }

    pub fn has_delta(&self) -> bool {
        !self.delta_facts.is_empty()
    }

    /// True once the last fact was removed. The row stays in its bucket
    /// until the next commit.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub(crate) fn is_known(&self) -> bool {
        self.known
    }

    pub(crate) fn add(&mut self, handle: FactHandle) {
        self.deleted = false;
        self.delta_facts.insert(handle);
    }

    /// Remove a fact. Returns true if this emptied the row.
    pub(crate) fn remove(&mut self, handle: FactHandle) -> bool {
        if !self.main_facts.swap_remove(&handle) {
            self.delta_facts.swap_remove(&handle);
        }
        if self.fact_count() == 0 && !self.deleted {
            self.deleted = true;
            return true;
        }
        false
    }

    pub(crate) fn commit(&mut self) {
        self.known = true;
        let delta = std::mem::take(&mut self.delta_facts);
        self.main_facts.extend(delta);
    }
}
