//! The TypeRegistry - logical types, fields and alpha conditions.

use crate::{
    AlphaCondition, FieldAccessor, LogicalType, RegistryError, RegistryResult, TypeBuilder,
    ValueType,
};
use ember_core::{short_name, AlphaId, FieldId, Predicate, TypeId};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Registry of logical types.
///
/// Cloning is cheap: type definitions are shared and copied on the first
/// modification made through the clone.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    /// Type definitions, indexed by `TypeId`.
    types: Vec<Arc<LogicalType>>,
    /// Type ID lookup by name.
    type_names: HashMap<String, TypeId>,
    /// First logical type declared for each native type.
    natives: HashMap<std::any::TypeId, TypeId>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Declaration ====================

    /// Declare a logical type bound to the native type `T`. The type starts
    /// with the identity field only.
    pub fn declare<T: Any>(&mut self, name: impl Into<String>) -> RegistryResult<TypeId> {
        self.declare_native(name, std::any::TypeId::of::<T>(), std::any::type_name::<T>())
    }

    /// Declare a logical type from a runtime native type.
    pub fn declare_native(
        &mut self,
        name: impl Into<String>,
        native: std::any::TypeId,
        native_name: &'static str,
    ) -> RegistryResult<TypeId> {
        let name = name.into();
        if self.type_names.contains_key(&name) {
            return Err(RegistryError::DuplicateTypeName(name));
        }

        let id = TypeId::new(self.types.len() as u32);
        debug!(type_name = %name, native = short_name(native_name), %id, "declared type");
        self.types
            .push(Arc::new(LogicalType::new(id, name.clone(), native, native_name)));
        self.type_names.insert(name, id);
        self.natives.entry(native).or_insert(id);
        Ok(id)
    }

    /// Start a fluent type declaration.
    pub fn builder<T: Any>(&mut self, name: impl Into<String>) -> TypeBuilder<'_, T> {
        TypeBuilder::new(self, name.into())
    }

    /// Declare a named field on an existing type.
    pub fn declare_field(
        &mut self,
        type_id: TypeId,
        name: impl Into<String>,
        value_type: ValueType,
        accessor: FieldAccessor,
    ) -> RegistryResult<FieldId> {
        let name = name.into();
        let ty = self.type_mut(type_id)?;
        if ty.has_field(&name) {
            return Err(RegistryError::DuplicateFieldName {
                type_name: ty.name.clone(),
                field: name,
            });
        }
        let id = ty.push_field(name.clone(), value_type, accessor);
        trace!(type_name = %ty.name, field = %name, %id, "declared field");
        Ok(id)
    }

    /// Register an alpha condition, reusing an identical one if present.
    pub fn register_alpha(
        &mut self,
        type_id: TypeId,
        source: impl Into<String>,
        fields: Vec<FieldId>,
        predicate: Predicate,
    ) -> RegistryResult<AlphaId> {
        let source = source.into();
        let ty = self.type_mut(type_id)?;
        if let Some(id) = ty.find_alpha(&source, &fields) {
            return Ok(id);
        }
        for field in &fields {
            if ty.field(*field).is_none() {
                return Err(RegistryError::UnknownField {
                    type_name: ty.name.clone(),
                    field: field.to_string(),
                });
            }
        }
        let id = ty.push_alpha(AlphaCondition::new(source.clone(), fields, predicate));
        trace!(type_name = %ty.name, %source, %id, "declared alpha condition");
        Ok(id)
    }

    /// Swap the predicate of an alpha condition. Facts already tested keep
    /// their outcome; the new predicate applies from the next insert on.
    pub fn replace_alpha(&mut self, type_id: TypeId, id: AlphaId, predicate: Predicate) -> RegistryResult<()> {
        let ty = self.type_mut(type_id)?;
        let type_name = ty.name.clone();
        let condition = ty
            .alpha_mut(id)
            .ok_or_else(|| RegistryError::UnknownAlpha { type_name, id })?;
        condition.predicate = predicate;
        debug!(type_name = %ty.name, %id, "replaced alpha condition");
        Ok(())
    }

    // ==================== Type Lookups ====================

    /// Get a type definition by ID.
    pub fn get_type(&self, id: TypeId) -> Option<&Arc<LogicalType>> {
        self.types.get(id.index())
    }

    /// Get a type definition by name.
    pub fn get_type_by_name(&self, name: &str) -> Option<&Arc<LogicalType>> {
        self.type_names.get(name).and_then(|id| self.get_type(*id))
    }

    /// Resolve a type name to its ID.
    pub fn type_id(&self, name: &str) -> RegistryResult<TypeId> {
        self.type_names
            .get(name)
            .copied()
            .ok_or_else(|| RegistryError::UnknownType(name.to_string()))
    }

    /// First logical type declared for a native type.
    pub fn resolve_native(&self, native: std::any::TypeId) -> Option<TypeId> {
        self.natives.get(&native).copied()
    }

    /// Iterate over all types in declaration order.
    pub fn types(&self) -> impl Iterator<Item = &Arc<LogicalType>> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn type_ref(&self, id: TypeId) -> RegistryResult<&LogicalType> {
        self.get_type(id)
            .map(|t| t.as_ref())
            .ok_or(RegistryError::UnknownTypeId(id))
    }

    fn type_mut(&mut self, id: TypeId) -> RegistryResult<&mut LogicalType> {
        self.types
            .get_mut(id.index())
            .map(Arc::make_mut)
            .ok_or(RegistryError::UnknownTypeId(id))
    }

    // ==================== Field Resolution ====================

    /// Resolve a field name or dotted path (`customer.address.city`).
    ///
    /// A dotted path is resolved on first use: its head must be a declared
    /// object reference with a known native type, and the remainder is
    /// resolved on the logical type registered for that native type. The
    /// composed accessor is then declared under the full path, so later
    /// lookups return the same `FieldId`.
    pub fn resolve_field(&mut self, type_id: TypeId, path: &str) -> RegistryResult<FieldId> {
        let ty = self.type_ref(type_id)?;
        if let Some(field) = ty.field_by_name(path) {
            return Ok(field.id);
        }

        let Some((head, rest)) = path.split_once('.') else {
            return Err(RegistryError::UnknownField {
                type_name: ty.name.clone(),
                field: path.to_string(),
            });
        };

        let type_name = ty.name.clone();
        let head_field = ty
            .field_by_name(head)
            .cloned()
            .ok_or_else(|| {
                RegistryError::unresolved_path(&type_name, path, format!("no field `{}`", head))
            })?;

        let target_native = match head_field.value_type {
            ValueType::Object(Some(native)) => native,
            _ => {
                return Err(RegistryError::unresolved_path(
                    &type_name,
                    path,
                    format!("field `{}` is not a typed object reference", head),
                ))
            }
        };
        let target = self.resolve_native(target_native).ok_or_else(|| {
            RegistryError::unresolved_path(
                &type_name,
                path,
                format!("no logical type registered for the object behind `{}`", head),
            )
        })?;

        let tail_id = self.resolve_field(target, rest)?;
        let tail = self
            .type_ref(target)?
            .field(tail_id)
            .cloned()
            .ok_or(RegistryError::UnknownTypeId(target))?;

        debug!(type_name = %type_name, %path, "resolved dotted field path");
        let accessor = head_field.accessor.then(tail.accessor);
        self.declare_field(type_id, path, tail.value_type, accessor)
    }
}
