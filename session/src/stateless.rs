//! Stateless sessions: insert, fire once, read the result, discard.

use crate::{EventBus, FireStats, SessionResult, StatefulSession};
use ember_core::{FactHandle, FactObject};
use ember_rule::ActivationManager;
use std::any::Any;

/// A session consumed by `fire`. Its memory is dropped afterwards.
#[derive(Debug)]
pub struct StatelessSession {
    inner: StatefulSession,
}

impl StatelessSession {
    pub(crate) fn new(inner: StatefulSession) -> Self {
        Self { inner }
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) -> SessionResult<Option<FactHandle>> {
        self.inner.insert(value)
    }

    pub fn insert_as<T: Any + Send + Sync>(&mut self, type_name: &str, value: T) -> SessionResult<Option<FactHandle>> {
        self.inner.insert_as(type_name, value)
    }

    pub fn insert_all<T, I>(&mut self, values: I) -> SessionResult<Vec<FactHandle>>
    where
        T: Any + Send + Sync,
        I: IntoIterator<Item = T>,
    {
        self.inner.insert_all(values)
    }

    pub fn set_activation_manager(&mut self, manager: impl ActivationManager + 'static) {
        self.inner.set_activation_manager(manager);
    }

    pub fn events(&self) -> &EventBus {
        self.inner.events()
    }

    /// Fire to fixpoint and discard memory.
    pub fn fire(self) -> SessionResult<FireStats> {
        self.fire_with(|_, _| {})
    }

    /// Fire to fixpoint, then hand every remaining fact to `visitor` in
    /// handle order before memory is discarded.
    pub fn fire_with<F>(mut self, mut visitor: F) -> SessionResult<FireStats>
    where
        F: FnMut(FactHandle, &FactObject),
    {
        let result = self.inner.fire();
        if result.is_ok() {
            for (handle, object) in self.inner.facts() {
                visitor(handle, object);
            }
        }
        self.inner.close();
        result
    }
}
