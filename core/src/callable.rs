//! Compiled callables consumed by the engine.
//!
//! Conditions arrive already compiled: a callable taking the resolved field
//! values, in the order the condition declared its field references, and
//! returning a boolean. How the callable was produced (closure, generated
//! code, an interpreter) is outside the engine.

use crate::Value;
use std::fmt;
use std::sync::Arc;

/// Error type returned by user callables.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type PredicateFn = dyn Fn(&[Value]) -> Result<bool, BoxError> + Send + Sync;

/// A compiled boolean condition over field values.
#[derive(Clone)]
pub struct Predicate(Arc<PredicateFn>);

impl Predicate {
    /// Wrap an infallible closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(move |args: &[Value]| Ok(f(args))))
    }

    /// Wrap a closure that may fail.
    pub fn fallible<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Evaluate against resolved arguments.
    pub fn test(&self, args: &[Value]) -> Result<bool, BoxError> {
        (self.0)(args)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}
