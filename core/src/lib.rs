//! Ember Core Types
//!
//! This crate provides the foundational types used throughout the Ember engine:
//! - Identity types (FactHandle, TypeId, FieldId, AlphaId, ValueHandle, RuleId)
//! - Value types (the Value enum read from fact fields)
//! - Fact objects (type-erased, identity-compared application objects)
//! - Compiled callables (predicates consumed by alpha and beta conditions)
//! - Evaluation errors and engine configuration

mod callable;
mod config;
mod error;
mod id;
mod object;
mod value;

pub use callable::*;
pub use config::*;
pub use error::*;
pub use id::*;
pub use object::*;
pub use value::*;
