//! Alpha memory.
//!
//! An alpha bucket holds the facts of one type that pass a given set of alpha
//! conditions. Buckets are addressed by that set (the mask) and created the
//! first time a rule needs the combination.

use crate::RuntimeFact;
use ember_core::{AlphaId, FactHandle};
use indexmap::IndexSet;
use std::fmt;

/// A set of alpha conditions a fact must pass. The empty mask accepts every
/// fact of the type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AlphaMask(Box<[AlphaId]>);

impl AlphaMask {
    pub fn new(mut ids: Vec<AlphaId>) -> Self {
        ids.sort();
        ids.dedup();
        Self(ids.into_boxed_slice())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &[AlphaId] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if the fact passed every condition of the mask.
    pub fn test(&self, fact: &RuntimeFact) -> bool {
        self.0.iter().all(|id| fact.alpha_test(*id))
    }
}

impl fmt::Display for AlphaMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", id)?;
        }
        write!(f, "}}")
    }
}

/// Facts passing one alpha mask, split into committed and pending partitions.
#[derive(Debug, Clone)]
pub struct AlphaBucket {
    mask: AlphaMask,
    main: IndexSet<FactHandle>,
    delta: IndexSet<FactHandle>,
}

impl AlphaBucket {
    pub fn new(mask: AlphaMask) -> Self {
        Self {
            mask,
            main: IndexSet::new(),
            delta: IndexSet::new(),
        }
    }

    pub fn mask(&self) -> &AlphaMask {
        &self.mask
    }

    /// Add to delta if the fact passes the mask. Returns whether it was added.
    pub fn insert(&mut self, fact: &RuntimeFact) -> bool {
        if self.mask.test(fact) {
            self.delta.insert(fact.handle())
        } else {
            false
        }
    }

    /// Remove from both partitions.
    pub fn delete(&mut self, handle: FactHandle) -> bool {
        let in_main = self.main.swap_remove(&handle);
        let in_delta = self.delta.swap_remove(&handle);
        in_main || in_delta
    }

    /// Merge delta into main.
    pub fn commit(&mut self) {
        let delta = std::mem::take(&mut self.delta);
        self.main.extend(delta);
    }

    pub fn main(&self) -> &IndexSet<FactHandle> {
        &self.main
    }

    pub fn delta(&self) -> &IndexSet<FactHandle> {
        &self.delta
    }

    pub fn contains(&self, handle: FactHandle) -> bool {
        self.main.contains(&handle) || self.delta.contains(&handle)
    }

    pub fn len(&self) -> usize {
        self.main.len() + self.delta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_empty() && self.delta.is_empty()
    }

    pub fn has_delta(&self) -> bool {
        !self.delta.is_empty()
    }
}
