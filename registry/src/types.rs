//! Logical type and field definitions.

use crate::AlphaCondition;
use ember_core::{AlphaId, FactObject, FieldId, TypeId, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Name of the identity field declared on every logical type.
pub const IDENTITY_FIELD: &str = "this";

/// Declared value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Any,
    Bool,
    Int,
    Float,
    String,
    List,
    /// Reference to another object. When the native type is known, dotted
    /// paths can be resolved through this field.
    Object(Option<std::any::TypeId>),
}

type AccessorFn = dyn Fn(&FactObject) -> Value + Send + Sync;

/// Reads one field value out of a fact object.
#[derive(Clone)]
pub struct FieldAccessor(Arc<AccessorFn>);

impl FieldAccessor {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&FactObject) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Accessor over a concrete native type. Objects of any other type read
    /// as `Value::Null`.
    pub fn typed<T, V, F>(f: F) -> Self
    where
        T: 'static,
        V: Into<Value>,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        Self::new(move |obj: &FactObject| match obj.downcast_ref::<T>() {
            Some(value) => f(value).into(),
            None => Value::Null,
        })
    }

    /// The object itself.
    pub fn identity() -> Self {
        Self::new(|obj: &FactObject| Value::Object(obj.clone()))
    }

    /// `self` followed by `next` on the referenced object.
    pub fn then(&self, next: FieldAccessor) -> Self {
        let head = self.clone();
        Self::new(move |obj: &FactObject| match head.read(obj) {
            Value::Object(inner) => next.read(&inner),
            _ => Value::Null,
        })
    }

    pub fn read(&self, obj: &FactObject) -> Value {
        (self.0)(obj)
    }
}

impl fmt::Debug for FieldAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldAccessor(..)")
    }
}

/// A named accessor, identified by (name, declaring type).
#[derive(Debug, Clone)]
pub struct TypeField {
    pub id: FieldId,
    pub name: String,
    pub declaring_type: TypeId,
    pub value_type: ValueType,
    pub accessor: FieldAccessor,
}

impl TypeField {
    pub fn read(&self, obj: &FactObject) -> Value {
        self.accessor.read(obj)
    }
}

/// A named classification of facts bound to one native type.
#[derive(Debug, Clone)]
pub struct LogicalType {
    pub id: TypeId,
    pub name: String,
    pub native: std::any::TypeId,
    pub native_name: &'static str,
    fields: Vec<TypeField>,
    field_names: HashMap<String, FieldId>,
    alpha: Vec<AlphaCondition>,
    alpha_index: HashMap<(String, Vec<FieldId>), AlphaId>,
}

impl LogicalType {
    pub(crate) fn new(
        id: TypeId,
        name: String,
        native: std::any::TypeId,
        native_name: &'static str,
    ) -> Self {
        let mut ty = Self {
            id,
            name,
            native,
            native_name,
            fields: Vec::new(),
            field_names: HashMap::new(),
            alpha: Vec::new(),
            alpha_index: HashMap::new(),
        };
        ty.push_field(IDENTITY_FIELD.to_string(), ValueType::Object(Some(native)), FieldAccessor::identity());
        ty
    }

    // ==================== Fields ====================

    pub(crate) fn push_field(
        &mut self,
        name: String,
        value_type: ValueType,
        accessor: FieldAccessor,
    ) -> FieldId {
        let id = FieldId::new(self.fields.len() as u32);
        self.field_names.insert(name.clone(), id);
        self.fields.push(TypeField {
            id,
            name,
            declaring_type: self.id,
            value_type,
            accessor,
        });
        id
    }

    /// All declared fields, in `FieldId` order.
    pub fn fields(&self) -> &[TypeField] {
        &self.fields
    }

    pub fn field(&self, id: FieldId) -> Option<&TypeField> {
        self.fields.get(id.index())
    }

    pub fn field_by_name(&self, name: &str) -> Option<&TypeField> {
        self.field_names.get(name).and_then(|id| self.field(*id))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_names.contains_key(name)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    // ==================== Alpha Conditions ====================

    pub(crate) fn find_alpha(&self, source: &str, fields: &[FieldId]) -> Option<AlphaId> {
        self.alpha_index
            .get(&(source.to_string(), fields.to_vec()))
            .copied()
    }

    pub(crate) fn push_alpha(&mut self, mut condition: AlphaCondition) -> AlphaId {
        let id = AlphaId::new(self.alpha.len() as u32);
        condition.id = id;
        self.alpha_index
            .insert((condition.source.clone(), condition.fields.clone()), id);
        self.alpha.push(condition);
        id
    }

    pub(crate) fn alpha_mut(&mut self, id: AlphaId) -> Option<&mut AlphaCondition> {
        self.alpha.get_mut(id.index())
    }

    /// All alpha conditions declared on this type, in `AlphaId` order.
    pub fn alpha_conditions(&self) -> &[AlphaCondition] {
        &self.alpha
    }

    pub fn alpha_count(&self) -> usize {
        self.alpha.len()
    }

    /// Read every declared field, in `FieldId` order.
    pub fn read_all(&self, obj: &FactObject) -> Vec<Value> {
        self.fields.iter().map(|f| f.read(obj)).collect()
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}
