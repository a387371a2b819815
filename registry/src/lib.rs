//! Ember Registry
//!
//! Logical types, their field accessors, and the alpha conditions declared
//! against them. A registry is cloned when a session is spawned from a
//! knowledge template: type definitions are shared behind `Arc` and copied
//! only when a session declares something new (copy-on-branch), so sibling
//! sessions never observe each other's additions.

mod alpha;
mod builder;
mod error;
mod registry;
mod types;

pub use alpha::AlphaCondition;
pub use builder::TypeBuilder;
pub use error::{RegistryError, RegistryResult};
pub use registry::TypeRegistry;
pub use types::*;
