//! Ember Integration Tests
//!
//! Shared fixtures for the scenarios under `tests/`:
//! - Domain types and a knowledge template declaring them
//! - Recorders for fired rules and condition calls
//! - Activation managers used to steer the agenda

mod fixtures;
mod recorder;

pub use fixtures::*;
pub use recorder::*;

pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::recorder::*;
    pub use ember_core::{AgendaMode, Configuration, EvaluationError, FactHandle, FactObject, Predicate, Value};
    pub use ember_registry::ValueType;
    pub use ember_rule::{ActivationManager, AgendaItem, RuleBuilder, RuleError};
    pub use ember_session::{
        Dispatch, Event, EventKind, FireStats, Knowledge, SessionError, StatefulSession,
    };
}
