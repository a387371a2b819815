//! Compiled rules.

use crate::{RhsContext, RuleError, RuleResult};
use ember_core::{BoxError, Predicate, RuleId};
use ember_network::{FactVar, LhsDescriptor};
use ember_registry::TypeRegistry;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type RhsFn = dyn Fn(&mut RhsContext<'_, '_>) -> Result<(), BoxError> + Send + Sync;

/// A rule's right-hand side.
#[derive(Clone)]
pub struct RhsAction(Arc<RhsFn>);

impl RhsAction {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut RhsContext<'_, '_>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// An action that does nothing.
    pub fn noop() -> Self {
        Self::new(|_| Ok(()))
    }

    pub fn run(&self, ctx: &mut RhsContext<'_, '_>) -> Result<(), BoxError> {
        (self.0)(ctx)
    }
}

impl fmt::Debug for RhsAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RhsAction")
    }
}

/// An immutable, deployable rule.
#[derive(Debug, Clone)]
pub struct RuleDescriptor {
    pub id: RuleId,
    pub name: String,
    pub salience: i32,
    pub lhs: LhsDescriptor,
    pub action: RhsAction,
}

impl RuleDescriptor {
    pub fn vars(&self) -> &[FactVar] {
        &self.lhs.vars
    }

    /// Index of a fact variable by name.
    pub fn var_index(&self, name: &str) -> Option<usize> {
        self.lhs.var(name).map(|v| v.index)
    }

    /// Swap the predicate of the condition declared as `source`.
    ///
    /// Single-fact conditions live in the registry and are shared by every
    /// rule declaring the same condition on the same type; replacing one
    /// replaces it for all of them. Facts already tested keep their outcome.
    pub fn replace_condition(
        &mut self,
        registry: &mut TypeRegistry,
        source: &str,
        predicate: Predicate,
    ) -> RuleResult<()> {
        let mut replaced = self.lhs.replace_predicate(source, &predicate);
        for var in &self.lhs.vars {
            for id in var.mask.ids() {
                let declared = registry
                    .get_type(var.type_id)
                    .and_then(|ty| ty.alpha_conditions().get(id.index()))
                    .map_or(false, |c| c.source == source);
                if declared {
                    registry.replace_alpha(var.type_id, *id, predicate.clone())?;
                    replaced = true;
                }
            }
        }
        if !replaced {
            return Err(RuleError::unknown_condition(&self.name, source));
        }
        debug!(rule = %self.name, condition = source, "replaced condition");
        Ok(())
    }
}

impl fmt::Display for RuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, salience {})", self.name, self.id, self.salience)
    }
}
