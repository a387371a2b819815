//! Fluent rule declaration.
//!
//! ```ignore
//! let rule = RuleBuilder::new("flag large orders")
//!     .salience(10)
//!     .fact("$o", "Order")
//!     .condition("$o.amount > 100", &["$o.amount"], |v| v[0].gt(&Value::Int(100)))
//!     .execute(|ctx| {
//!         let order = ctx.get::<Order>("$o")?;
//!         order.flag();
//!         Ok(())
//!     });
//! ```

use crate::{RhsAction, RhsContext, RuleDescriptor, RuleError, RuleResult, DEFAULT_COMPLEXITY};
use ember_core::{AlphaId, BoxError, FieldId, Predicate, RuleId, Value};
use ember_memory::{AlphaMask, FieldsKey};
use ember_network::{BetaCondition, FactVar, FieldRef, LhsDescriptor};
use ember_registry::{TypeRegistry, IDENTITY_FIELD};
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone)]
struct ConditionDecl {
    source: String,
    refs: Vec<String>,
    complexity: f64,
    predicate: Predicate,
}

/// Builder for a rule. Nothing is resolved until the rule is compiled
/// against a type registry.
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    name: String,
    salience: i32,
    facts: Vec<(String, String)>,
    conditions: Vec<ConditionDecl>,
    action: RhsAction,
}

impl RuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            salience: 0,
            facts: Vec::new(),
            conditions: Vec::new(),
            action: RhsAction::noop(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Higher salience fires first.
    pub fn salience(mut self, salience: i32) -> Self {
        self.salience = salience;
        self
    }

    /// Declare a fact variable bound to a logical type: `.fact("$o", "Order")`.
    pub fn fact(mut self, var: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.facts.push((var.into(), type_name.into()));
        self
    }

    /// Add a condition. `refs` name the predicate's arguments in order, as
    /// `$var.field`, `$var.path.to.field` or `$var` for the fact itself.
    pub fn condition<F>(self, source: impl Into<String>, refs: &[&str], f: F) -> Self
    where
        F: Fn(&[Value]) -> bool + Send + Sync + 'static,
    {
        self.condition_with(source, refs, DEFAULT_COMPLEXITY, Predicate::new(f))
    }

    /// Add a condition with an explicit complexity weight and a prebuilt
    /// predicate.
    pub fn condition_with(
        mut self,
        source: impl Into<String>,
        refs: &[&str],
        complexity: f64,
        predicate: Predicate,
    ) -> Self {
        self.conditions.push(ConditionDecl {
            source: source.into(),
            refs: refs.iter().map(|r| r.to_string()).collect(),
            complexity,
            predicate,
        });
        self
    }

    /// Set the action run for every activation.
    pub fn execute<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RhsContext<'_, '_>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.action = RhsAction::new(f);
        self
    }

    // ==================== Compilation ====================

    /// Resolve types and fields, register alpha conditions and compile the
    /// beta network. The registry is left untouched if compilation fails.
    pub fn compile(self, registry: &mut TypeRegistry, id: RuleId) -> RuleResult<RuleDescriptor> {
        let mut scratch = registry.clone();
        let descriptor = self.compile_into(&mut scratch, id)?;
        *registry = scratch;
        Ok(descriptor)
    }

    fn compile_into(self, registry: &mut TypeRegistry, id: RuleId) -> RuleResult<RuleDescriptor> {
        let mut vars: Vec<FactVar> = Vec::with_capacity(self.facts.len());
        for (index, (name, type_name)) in self.facts.iter().enumerate() {
            if vars.iter().any(|v| &v.name == name) {
                return Err(RuleError::duplicate_variable(&self.name, name));
            }
            vars.push(FactVar {
                index,
                name: name.clone(),
                type_id: registry.type_id(type_name)?,
                mask: AlphaMask::empty(),
                fields: FieldsKey::default(),
            });
        }

        let mut alpha: Vec<Vec<AlphaId>> = vec![Vec::new(); vars.len()];
        let mut key_fields: Vec<BTreeSet<FieldId>> = vec![BTreeSet::new(); vars.len()];
        let mut beta = Vec::new();

        for decl in self.conditions {
            if decl.refs.is_empty() {
                return Err(RuleError::empty_references(&self.name, &decl.source));
            }
            if decl.complexity <= 0.0 || decl.complexity.is_nan() {
                return Err(RuleError::InvalidComplexity {
                    rule: self.name.clone(),
                    condition: decl.source,
                    complexity: decl.complexity,
                });
            }

            let mut refs = Vec::with_capacity(decl.refs.len());
            for raw in &decl.refs {
                refs.push(resolve_ref(&self.name, &vars, registry, raw)?);
            }

            let referenced: BTreeSet<usize> = refs.iter().map(|r| r.var).collect();
            let single = match referenced.len() {
                1 => referenced.iter().next().copied(),
                _ => None,
            };
            if let Some(var) = single {
                let fields = refs.iter().map(|r| r.field).collect();
                let id = registry.register_alpha(vars[var].type_id, decl.source, fields, decl.predicate)?;
                alpha[var].push(id);
            } else {
                for r in &refs {
                    key_fields[r.var].insert(r.field);
                }
                beta.push(BetaCondition {
                    source: decl.source,
                    refs,
                    complexity: decl.complexity,
                    predicate: decl.predicate,
                });
            }
        }

        for (var, (ids, fields)) in vars.iter_mut().zip(alpha.into_iter().zip(key_fields)) {
            var.mask = AlphaMask::new(ids);
            var.fields = FieldsKey::new(fields.into_iter().collect());
        }

        let lhs = LhsDescriptor::compile(vars, beta);
        debug!(rule = %self.name, %id, groups = lhs.groups.len(), "compiled rule");
        Ok(RuleDescriptor {
            id,
            name: self.name,
            salience: self.salience,
            lhs,
            action: self.action,
        })
    }
}

/// Resolve `$var`, `$var.field` or `$var.a.b` to a field of a variable.
fn resolve_ref(
    rule: &str,
    vars: &[FactVar],
    registry: &mut TypeRegistry,
    raw: &str,
) -> RuleResult<FieldRef> {
    let (name, path) = match raw.split_once('.') {
        Some((name, path)) => (name, path),
        None => (raw, IDENTITY_FIELD),
    };
    let var = vars
        .iter()
        .find(|v| v.name == name)
        .ok_or_else(|| RuleError::unknown_variable(rule, name))?;
    let field = registry.resolve_field(var.type_id, path)?;
    Ok(FieldRef::new(var.index, field))
}
