//! Working memory facade.
//!
//! The one entry point for fact changes, shared by the session API and by
//! rule actions. Resolves the logical type of inserted objects and records
//! every change in fact storage; nothing reaches type memory until the next
//! fire cycle.

use crate::{FactStorage, MemoryResult};
use ember_core::{short_name, Configuration, FactHandle, FactObject};
use ember_registry::{RegistryError, TypeRegistry};
use tracing::{debug, warn};

/// Borrowed view over a session's registry and fact storage.
pub struct WorkingMemory<'a> {
    registry: &'a mut TypeRegistry,
    storage: &'a mut FactStorage,
    config: &'a Configuration,
}

impl<'a> WorkingMemory<'a> {
    pub fn new(
        registry: &'a mut TypeRegistry,
        storage: &'a mut FactStorage,
        config: &'a Configuration,
    ) -> Self {
        Self {
            registry,
            storage,
            config,
        }
    }

    /// Insert an object under the logical type declared for its native
    /// type. Objects of unknown types are skipped unless types are
    /// declared on demand.
    pub fn insert(&mut self, object: FactObject) -> MemoryResult<Option<FactHandle>> {
        let type_id = match self.registry.resolve_native(object.native_type()) {
            Some(id) => id,
            None if self.config.auto_declare_types => {
                let native_name = object.type_name();
                let id = match self.registry.declare_native(
                    short_name(native_name),
                    object.native_type(),
                    native_name,
                ) {
                    Ok(id) => id,
                    Err(RegistryError::DuplicateTypeName(_)) => {
                        self.registry
                            .declare_native(native_name, object.native_type(), native_name)?
                    }
                    Err(e) => return Err(e.into()),
                };
                debug!(type_name = short_name(native_name), "declared type on insert");
                id
            }
            None => {
                if self.config.warn_unknown_types {
                    warn!(native = short_name(object.type_name()), "no logical type for object, skipping insert");
                }
                return Ok(None);
            }
        };
        Ok(Some(self.storage.insert(type_id, object).0))
    }

    /// Insert an object under a named logical type.
    pub fn insert_as(&mut self, type_name: &str, object: FactObject) -> MemoryResult<Option<FactHandle>> {
        let Ok(type_id) = self.registry.type_id(type_name) else {
            if self.config.warn_unknown_types {
                warn!(type_name, "unknown logical type, skipping insert");
            }
            return Ok(None);
        };
        Ok(Some(self.storage.insert(type_id, object).0))
    }

    /// Replace the object behind a handle.
    pub fn update(&mut self, handle: FactHandle, object: FactObject) -> MemoryResult<bool> {
        self.storage.update(handle, object)
    }

    /// Remove a fact.
    pub fn delete(&mut self, handle: FactHandle) -> bool {
        let deleted = self.storage.delete(handle).is_some();
        if !deleted {
            warn!(%handle, "delete of unknown fact ignored");
        }
        deleted
    }

    pub fn get(&self, handle: FactHandle) -> Option<&FactObject> {
        self.storage.get(handle)
    }

    pub fn registry(&self) -> &TypeRegistry {
        self.registry
    }
}
