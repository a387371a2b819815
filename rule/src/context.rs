//! The context handed to rule actions.

use crate::{RuleDescriptor, RuleError, RuleResult};
use ember_core::{short_name, FactHandle, FactObject};
use ember_memory::WorkingMemory;
use std::any::Any;

/// Access to the firing activation's facts and to working memory.
///
/// Changes made here are buffered and take effect in the next cycle.
pub struct RhsContext<'a, 'w> {
    rule: &'a RuleDescriptor,
    handles: &'a [FactHandle],
    memory: &'a mut WorkingMemory<'w>,
}

impl<'a, 'w> RhsContext<'a, 'w> {
    pub fn new(rule: &'a RuleDescriptor, handles: &'a [FactHandle], memory: &'a mut WorkingMemory<'w>) -> Self {
        Self {
            rule,
            handles,
            memory,
        }
    }

    pub fn rule_name(&self) -> &str {
        &self.rule.name
    }

    /// Handles of the activation, in fact-variable order.
    pub fn handles(&self) -> &[FactHandle] {
        self.handles
    }

    // ==================== Bound Facts ====================

    /// Handle bound to `var`.
    pub fn handle(&self, var: &str) -> RuleResult<FactHandle> {
        self.rule
            .var_index(var)
            .and_then(|i| self.handles.get(i).copied())
            .ok_or_else(|| RuleError::unknown_variable(&self.rule.name, var))
    }

    /// Object bound to `var`.
    pub fn object(&self, var: &str) -> RuleResult<&FactObject> {
        let handle = self.handle(var)?;
        self.memory.get(handle).ok_or_else(|| RuleError::fact_gone(var))
    }

    /// Object bound to `var`, downcast to `T`.
    pub fn get<T: Any>(&self, var: &str) -> RuleResult<&T> {
        self.object(var)?
            .downcast_ref::<T>()
            .ok_or_else(|| RuleError::WrongType {
                var: var.to_string(),
                expected: short_name(std::any::type_name::<T>()),
            })
    }

    // ==================== Working Memory ====================

    /// Insert a new fact under the logical type of its native type.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) -> RuleResult<Option<FactHandle>> {
        self.insert_object(FactObject::new(value))
    }

    pub fn insert_object(&mut self, object: FactObject) -> RuleResult<Option<FactHandle>> {
        Ok(self.memory.insert(object)?)
    }

    /// Insert a new fact under a named logical type.
    pub fn insert_as<T: Any + Send + Sync>(&mut self, type_name: &str, value: T) -> RuleResult<Option<FactHandle>> {
        Ok(self.memory.insert_as(type_name, FactObject::new(value))?)
    }

    /// Replace the fact bound to `var`.
    pub fn update<T: Any + Send + Sync>(&mut self, var: &str, value: T) -> RuleResult<bool> {
        let handle = self.handle(var)?;
        self.update_handle(handle, FactObject::new(value))
    }

    pub fn update_handle(&mut self, handle: FactHandle, object: FactObject) -> RuleResult<bool> {
        Ok(self.memory.update(handle, object)?)
    }

    /// Delete the fact bound to `var`.
    pub fn delete(&mut self, var: &str) -> RuleResult<bool> {
        let handle = self.handle(var)?;
        Ok(self.delete_handle(handle))
    }

    pub fn delete_handle(&mut self, handle: FactHandle) -> bool {
        self.memory.delete(handle)
    }
}
