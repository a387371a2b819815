//! Ember Rule
//!
//! Rules and activations.
//!
//! Responsibilities:
//! - Build rules from fact variables, conditions and an action
//! - Compile conditions into alpha conditions and a beta network
//! - Enumerate new activations at network sinks each cycle
//! - Order the agenda by salience and consult the activation policy
//! - Give actions a context scoped to the firing activation

mod activation;
mod builder;
mod context;
mod descriptor;
mod error;
mod runtime;

pub use activation::{Activation, ActivationManager, AgendaItem, DefaultActivationManager};
pub use builder::RuleBuilder;
pub use context::RhsContext;
pub use descriptor::{RhsAction, RuleDescriptor};
pub use error::{RuleError, RuleResult};
pub use runtime::SessionRule;

/// Complexity assigned to conditions declared without one.
pub const DEFAULT_COMPLEXITY: f64 = 1.0;
