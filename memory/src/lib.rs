//! Ember Memory
//!
//! Working memory of a session:
//! - Value interning (field values to compact per-type handles)
//! - Fact storage (stable handles, insert/update/delete lifecycle, action buffer)
//! - Runtime facts (field values and alpha-test bits per fact)
//! - Alpha buckets (facts grouped by alpha-condition mask, main/delta)
//! - Key memory (facts grouped by join key into value rows, main/delta)
//! - The hierarchical join index used by condition nodes
//! - Per-type memory and the session-wide commit protocol

mod alpha;
mod buffer;
mod error;
mod fact;
mod interner;
mod join;
mod keys;
mod memory;
mod row;
mod storage;
mod type_memory;
mod working;

pub use alpha::{AlphaBucket, AlphaMask};
pub use buffer::{Action, ActionBuffer};
pub use error::{MemoryError, MemoryResult};
pub use fact::RuntimeFact;
pub use interner::ValueIndexer;
pub use join::{JoinEntries, JoinIndex, JoinKey};
pub use keys::{FieldsKey, KeyMemoryBucket};
pub use memory::{AlphaBucketRef, KeyBucketRef, SessionMemory};
pub use row::{KeyState, MemoryKey, RowId, ValueRow};
pub use storage::FactStorage;
pub use type_memory::TypeMemory;
pub use working::WorkingMemory;
