//! Knowledge templates.
//!
//! A knowledge template holds type declarations and compiled rules. Sessions
//! are spawned from it by snapshot: the registry is cloned (type definitions
//! stay shared behind `Arc`), compiled rules are shared by reference, and
//! nothing a session declares or deploys flows back.

use crate::{EventBus, SessionResult, StatefulSession, StatelessSession};
use ember_core::{AgendaMode, Configuration, Predicate, RuleId, TypeId};
use ember_registry::TypeRegistry;
use ember_rule::{RuleBuilder, RuleDescriptor, RuleError};
use parking_lot::RwLock;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Types and rules shared by the sessions spawned from it.
#[derive(Debug)]
pub struct Knowledge {
    config: Configuration,
    registry: RwLock<TypeRegistry>,
    rules: RwLock<Vec<Arc<RuleDescriptor>>>,
    events: EventBus,
    next_session: AtomicU64,
}

impl Knowledge {
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            registry: RwLock::new(TypeRegistry::new()),
            rules: RwLock::new(Vec::new()),
            events: EventBus::new(),
            next_session: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Subscriptions made here are inherited by sessions spawned later.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ==================== Types ====================

    /// Declare a logical type with only the identity field.
    pub fn declare<T: Any>(&self, name: impl Into<String>) -> SessionResult<TypeId> {
        Ok(self.registry.write().declare::<T>(name)?)
    }

    /// Run declarations against the registry:
    ///
    /// ```ignore
    /// knowledge.declare_with(|r| {
    ///     r.builder::<Order>("Order")
    ///         .field("amount", ValueType::Int, |o: &Order| o.amount)
    ///         .done()
    /// })?;
    /// ```
    pub fn declare_with<R, E, F>(&self, f: F) -> SessionResult<R>
    where
        F: FnOnce(&mut TypeRegistry) -> Result<R, E>,
        E: Into<crate::SessionError>,
    {
        f(&mut *self.registry.write()).map_err(Into::into)
    }

    /// Snapshot of the current registry.
    pub fn registry(&self) -> TypeRegistry {
        self.registry.read().clone()
    }

    // ==================== Rules ====================

    /// Compile a rule. Sessions spawned afterwards carry it; existing
    /// sessions do not.
    pub fn add_rule(&self, builder: RuleBuilder) -> SessionResult<RuleId> {
        let mut rules = self.rules.write();
        if rules.iter().any(|r| r.name == builder.name()) {
            return Err(RuleError::duplicate_rule(builder.name()).into());
        }
        let id = RuleId::new(rules.len() as u32);
        let descriptor = builder.compile(&mut *self.registry.write(), id)?;
        debug!(rule = %descriptor, "rule added");
        rules.push(Arc::new(descriptor));
        Ok(id)
    }

    /// Swap the predicate of the condition `rule` declared as `source`.
    /// Sessions spawned afterwards use it; existing sessions keep theirs.
    pub fn replace_condition(&self, rule: &str, source: &str, predicate: Predicate) -> SessionResult<()> {
        let mut rules = self.rules.write();
        let descriptor = rules
            .iter_mut()
            .find(|r| r.name == rule)
            .ok_or_else(|| RuleError::unknown_rule(rule))?;
        Arc::make_mut(descriptor).replace_condition(&mut *self.registry.write(), source, predicate)?;
        Ok(())
    }

    pub fn rules(&self) -> Vec<Arc<RuleDescriptor>> {
        self.rules.read().clone()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    // ==================== Sessions ====================

    pub fn new_session(&self) -> SessionResult<StatefulSession> {
        self.spawn(self.config.clone())
    }

    /// A session running `mode` instead of the configured agenda mode.
    pub fn new_session_with_mode(&self, mode: AgendaMode) -> SessionResult<StatefulSession> {
        self.spawn(self.config.clone().with_agenda_mode(mode))
    }

    fn spawn(&self, config: Configuration) -> SessionResult<StatefulSession> {
        // Rules first: `add_rule` takes the rule lock before the registry lock.
        let rules = self.rules.read().clone();
        let registry = self.registry.read().clone();
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        StatefulSession::new(id, config, registry, rules, self.events.branch())
    }

    pub fn new_stateless_session(&self) -> SessionResult<StatelessSession> {
        Ok(StatelessSession::new(self.new_session()?))
    }
}

impl Default for Knowledge {
    fn default() -> Self {
        Self::new(Configuration::default())
    }
}
