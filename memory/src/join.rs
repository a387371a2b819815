//! The hierarchical join index.
//!
//! A condition node stores the row tuples it produced in a trie with one
//! level per group of fact variables. Each level maps a key (one `RowId` per
//! variable in the group) to the next level; the last level is a plain set
//! of keys. Grouping a level by the variables a downstream condition reads
//! lets that condition evaluate each distinct key once, however many
//! combinations of the remaining variables sit below it.

use crate::RowId;
use indexmap::{map, set, IndexMap, IndexSet};
use std::sync::Arc;

/// Row ids forming the key at one level.
pub type JoinKey = Box<[RowId]>;

/// One level of the join index.
#[derive(Debug, Clone)]
pub enum JoinIndex {
    /// Intermediate level: each key owns a nested index for the next level.
    Map {
        level: usize,
        shape: Arc<[usize]>,
        entries: IndexMap<JoinKey, JoinIndex>,
    },
    /// Terminal level.
    Leaf {
        level: usize,
        arr_size: usize,
        entries: IndexSet<JoinKey>,
    },
}

impl JoinIndex {
    /// An empty index whose level `i` holds keys of `shape[i]` rows.
    pub fn new(shape: &[usize]) -> Self {
        Self::at_level(0, shape.into())
    }

    fn at_level(level: usize, shape: Arc<[usize]>) -> Self {
        debug_assert!(level < shape.len());
        if level + 1 == shape.len() {
            JoinIndex::Leaf {
                level,
                arr_size: shape[level],
                entries: IndexSet::new(),
            }
        } else {
            JoinIndex::Map {
                level,
                shape,
                entries: IndexMap::new(),
            }
        }
    }

    /// An empty index of the same shape, starting at the same level.
    pub fn empty_like(&self) -> Self {
        match self {
            JoinIndex::Map { level, shape, .. } => Self::at_level(*level, shape.clone()),
            JoinIndex::Leaf {
                level, arr_size, ..
            } => JoinIndex::Leaf {
                level: *level,
                arr_size: *arr_size,
                entries: IndexSet::new(),
            },
        }
    }

    pub fn level(&self) -> usize {
        match self {
            JoinIndex::Map { level, .. } | JoinIndex::Leaf { level, .. } => *level,
        }
    }

    /// Number of rows in each key at this level.
    pub fn arr_size(&self) -> usize {
        match self {
            JoinIndex::Map { level, shape, .. } => shape[*level],
            JoinIndex::Leaf { arr_size, .. } => *arr_size,
        }
    }

    /// Number of keys at this level.
    pub fn len(&self) -> usize {
        match self {
            JoinIndex::Map { entries, .. } => entries.len(),
            JoinIndex::Leaf { entries, .. } => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of complete tuples stored below this level.
    pub fn tuple_count(&self) -> usize {
        match self {
            JoinIndex::Map { entries, .. } => entries.values().map(|c| c.tuple_count()).sum(),
            JoinIndex::Leaf { entries, .. } => entries.len(),
        }
    }

    pub fn clear(&mut self) {
        match self {
            JoinIndex::Map { entries, .. } => entries.clear(),
            JoinIndex::Leaf { entries, .. } => entries.clear(),
        }
    }

    /// Take the contents, leaving an empty index of the same shape.
    pub fn take(&mut self) -> JoinIndex {
        let empty = self.empty_like();
        std::mem::replace(self, empty)
    }

    // ==================== Operations ====================

    /// Store a tuple. `keys[i]` is the key for level `i`.
    ///
    /// An existing key at an intermediate level is reused and the remaining
    /// levels are saved below it.
    pub fn save(&mut self, keys: &[&[RowId]]) {
        match self {
            JoinIndex::Map {
                level,
                shape,
                entries,
            } => {
                let key = keys[*level];
                debug_assert_eq!(key.len(), shape[*level]);
                if let Some(child) = entries.get_mut(key) {
                    child.save(keys);
                } else {
                    let mut child = Self::at_level(*level + 1, shape.clone());
                    child.save(keys);
                    entries.insert(key.into(), child);
                }
            }
            JoinIndex::Leaf {
                level,
                arr_size,
                entries,
            } => {
                let key = keys[*level];
                debug_assert_eq!(key.len(), *arr_size);
                if !entries.contains(key) {
                    entries.insert(key.into());
                }
            }
        }
    }

    /// Merge another index of the same shape into this one. Keys new to this
    /// index are moved over together with their subtrees.
    pub fn append(&mut self, other: JoinIndex) {
        match (self, other) {
            (JoinIndex::Map { entries, .. }, JoinIndex::Map { entries: other, .. }) => {
                for (key, child) in other {
                    match entries.get_mut(&key) {
                        Some(existing) => existing.append(child),
                        None => {
                            entries.insert(key, child);
                        }
                    }
                }
            }
            (JoinIndex::Leaf { entries, .. }, JoinIndex::Leaf { entries: other, .. }) => {
                entries.extend(other);
            }
            _ => debug_assert!(false, "join index shapes differ"),
        }
    }

    /// Remove every entry whose key matches `predicate(level, key)`, then
    /// every intermediate entry left without children. Returns true if this
    /// level ended up empty.
    pub fn delete<P>(&mut self, predicate: &P) -> bool
    where
        P: Fn(usize, &[RowId]) -> bool,
    {
        match self {
            JoinIndex::Map { level, entries, .. } => {
                let level = *level;
                entries.retain(|key, child| !predicate(level, &key[..]) && !child.delete(predicate));
                entries.is_empty()
            }
            JoinIndex::Leaf { level, entries, .. } => {
                let level = *level;
                entries.retain(|key| !predicate(level, &key[..]));
                entries.is_empty()
            }
        }
    }

    /// Iterate over (key, child) pairs at this level. Clone the iterator to
    /// restart it.
    pub fn entries(&self) -> JoinEntries<'_> {
        match self {
            JoinIndex::Map { entries, .. } => JoinEntries::Map(entries.iter()),
            JoinIndex::Leaf { entries, .. } => JoinEntries::Leaf(entries.iter()),
        }
    }

    /// Every complete tuple, one key per level.
    pub fn tuples(&self) -> Vec<Vec<&[RowId]>> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        self.collect_tuples(&mut prefix, &mut out);
        out
    }

    fn collect_tuples<'a>(&'a self, prefix: &mut Vec<&'a [RowId]>, out: &mut Vec<Vec<&'a [RowId]>>) {
        for (key, child) in self.entries() {
            prefix.push(key);
            match child {
                Some(child) => child.collect_tuples(prefix, out),
                None => out.push(prefix.clone()),
            }
            prefix.pop();
        }
    }
}

/// Iterator over the entries of one join-index level.
#[derive(Clone)]
pub enum JoinEntries<'a> {
    Map(map::Iter<'a, JoinKey, JoinIndex>),
    Leaf(set::Iter<'a, JoinKey>),
}

impl<'a> Iterator for JoinEntries<'a> {
    type Item = (&'a [RowId], Option<&'a JoinIndex>);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            JoinEntries::Map(it) => it.next().map(|(k, child)| (&k[..], Some(child))),
            JoinEntries::Leaf(it) => it.next().map(|k| (&k[..], None)),
        }
    }
}
