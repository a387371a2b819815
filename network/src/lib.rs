//! Ember Network
//!
//! The beta network of a rule:
//! - Descriptors for fact variables, field references and beta conditions
//! - LHS compilation: grouping conditions by variable set and choosing a
//!   balanced tree of condition nodes
//! - Runtime condition nodes joining key-bucket rows incrementally
//! - Evaluation listeners observing every condition test

mod allocate;
mod descriptor;
mod error;
mod listener;
mod node;

pub use allocate::{allocate_conditions, find_best_allocation, MAX_PERMUTATIONS};
pub use descriptor::{
    BetaCondition, ConditionDescriptor, EvaluatorGroup, FactGroupDescriptor, FactVar, FieldRef,
    Grouping, LhsDescriptor, NodeDescriptor, SourceDescriptor,
};
pub use error::{NetworkError, NetworkResult};
pub use listener::{EvaluationEvent, EvaluationListener};
pub use node::{ConditionNode, NetworkContext};
