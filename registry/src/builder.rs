//! Fluent declaration of a logical type and its fields.

use crate::{FieldAccessor, RegistryResult, TypeRegistry, ValueType};
use ember_core::{FactObject, TypeId, Value};
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// Builder for a type definition bound to native type `T`.
pub struct TypeBuilder<'a, T> {
    registry: &'a mut TypeRegistry,
    name: String,
    fields: Vec<(String, ValueType, FieldAccessor)>,
    _native: PhantomData<fn(&T)>,
}

impl<'a, T: Any> TypeBuilder<'a, T> {
    pub(crate) fn new(registry: &'a mut TypeRegistry, name: String) -> Self {
        Self {
            registry,
            name,
            fields: Vec::new(),
            _native: PhantomData,
        }
    }

    /// Add a field read through a typed accessor.
    pub fn field<V, F>(mut self, name: impl Into<String>, value_type: ValueType, f: F) -> Self
    where
        V: Into<Value>,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.fields
            .push((name.into(), value_type, FieldAccessor::typed(f)));
        self
    }

    /// Add a field referencing another object of native type `U`. Dotted
    /// paths can be resolved through it once `U` is declared.
    pub fn reference<U, F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        U: Any + Send + Sync,
        F: Fn(&T) -> Arc<U> + Send + Sync + 'static,
    {
        let accessor = FieldAccessor::typed(move |t: &T| FactObject::from_arc(f(t)));
        self.fields.push((
            name.into(),
            ValueType::Object(Some(std::any::TypeId::of::<U>())),
            accessor,
        ));
        self
    }

    /// Finish building this type.
    pub fn done(self) -> RegistryResult<TypeId> {
        let id = self.registry.declare::<T>(self.name)?;
        for (name, value_type, accessor) in self.fields {
            self.registry.declare_field(id, name, value_type, accessor)?;
        }
        Ok(id)
    }
}
