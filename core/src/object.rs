//! Type-erased application objects.
//!
//! Facts are arbitrary application values. The engine keeps them behind an
//! `Arc<dyn Any>` so that sessions, buffers and RHS contexts can share them
//! cheaply. Two `FactObject`s are equal only if they point at the same
//! allocation: identity, not structural equality.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A shared, identity-compared application object.
#[derive(Clone)]
pub struct FactObject {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl FactObject {
    /// Wrap a value in a new allocation.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap an existing allocation. Inserting the same `Arc` twice is
    /// recognized as the same object.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            inner: value,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// The object as `&dyn Any`.
    pub fn as_any(&self) -> &(dyn Any + Send + Sync) {
        &*self.inner
    }

    /// Downcast to a concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// The native type of the wrapped value.
    pub fn native_type(&self) -> std::any::TypeId {
        (*self.inner).type_id()
    }

    /// Rust type name of the wrapped value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Address of the allocation, used as the identity key.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &FactObject) -> bool {
        self.identity() == other.identity()
    }
}

impl PartialEq for FactObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for FactObject {}

impl Hash for FactObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for FactObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", short_name(self.type_name), self.identity())
    }
}

/// Last path segment of a Rust type name (`my::mod::Order` -> `Order`).
pub fn short_name(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}
