//! Stateful sessions and the fire loop.

use crate::event::EvaluationBridge;
use crate::{Event, EventBus, EventKind, SessionError, SessionResult};
use ember_core::{AgendaMode, Configuration, EvaluationError, FactHandle, FactObject, Predicate, RuleId};
use ember_memory::{FactStorage, SessionMemory, WorkingMemory};
use ember_network::EvaluationListener;
use ember_registry::TypeRegistry;
use ember_rule::{
    ActivationManager, AgendaItem, DefaultActivationManager, RhsContext, RuleBuilder, RuleDescriptor,
    RuleError, SessionRule,
};
use std::any::Any;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

/// Session ID type.
pub type SessionId = u64;

/// Outcome of one `fire()` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FireStats {
    /// Cycles run.
    pub cycles: u64,
    /// Activations whose action ran.
    pub activations_fired: usize,
    /// Activations dropped by the activation manager, because their facts
    /// were deleted earlier in the cycle, or because an earlier rule changed
    /// facts in default agenda mode.
    pub activations_skipped: usize,
    /// False if the fire criterion stopped the loop first.
    pub fixpoint_reached: bool,
}

/// A session whose working memory persists across `fire()` calls.
pub struct StatefulSession {
    id: SessionId,
    config: Configuration,
    /// Session-local snapshot; declarations here never reach the template.
    registry: TypeRegistry,
    storage: FactStorage,
    memory: SessionMemory,
    rules: Vec<SessionRule>,
    activations: Box<dyn ActivationManager>,
    events: EventBus,
    /// Cycles run over the session's lifetime.
    sequence: u64,
    closed: bool,
}

impl StatefulSession {
    pub(crate) fn new(
        id: SessionId,
        config: Configuration,
        registry: TypeRegistry,
        rules: Vec<Arc<RuleDescriptor>>,
        events: EventBus,
    ) -> SessionResult<Self> {
        let mut memory = SessionMemory::new(config.expected_facts_per_type);
        memory.sync_types(&registry)?;

        let mut session = Self {
            id,
            storage: FactStorage::with_capacity(config.expected_facts_per_type),
            config,
            registry,
            memory,
            rules: Vec::with_capacity(rules.len()),
            activations: Box::new(DefaultActivationManager),
            events,
            sequence: 0,
            closed: false,
        };
        for descriptor in rules {
            session.deploy(descriptor)?;
        }
        session.events.publish(Event::SessionCreated { session: id });
        debug!(session = id, rules = session.rules.len(), "session created");
        Ok(session)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Session-local type declarations.
    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Switch the agenda mode for the following cycles.
    pub fn set_agenda_mode(&mut self, mode: AgendaMode) {
        debug!(session = self.id, ?mode, "agenda mode set");
        self.config.agenda_mode = mode;
    }

    /// Replace the activation policy.
    pub fn set_activation_manager(&mut self, manager: impl ActivationManager + 'static) {
        self.activations = Box::new(manager);
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.closed {
            return Err(SessionError::session_closed(self.id));
        }
        Ok(())
    }

    fn working_memory(&mut self) -> WorkingMemory<'_> {
        WorkingMemory::new(&mut self.registry, &mut self.storage, &self.config)
    }

    // ==================== Working Memory ====================

    /// Insert a fact under the logical type declared for `T`. Returns
    /// `None` if no type is declared for it.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) -> SessionResult<Option<FactHandle>> {
        self.insert_object(FactObject::new(value))
    }

    pub fn insert_object(&mut self, object: FactObject) -> SessionResult<Option<FactHandle>> {
        self.ensure_open()?;
        Ok(self.working_memory().insert(object)?)
    }

    /// Insert a fact under a named logical type.
    pub fn insert_as<T: Any + Send + Sync>(&mut self, type_name: &str, value: T) -> SessionResult<Option<FactHandle>> {
        self.ensure_open()?;
        Ok(self.working_memory().insert_as(type_name, FactObject::new(value))?)
    }

    /// Insert every value, skipping those without a logical type.
    pub fn insert_all<T, I>(&mut self, values: I) -> SessionResult<Vec<FactHandle>>
    where
        T: Any + Send + Sync,
        I: IntoIterator<Item = T>,
    {
        let mut handles = Vec::new();
        for value in values {
            if let Some(handle) = self.insert(value)? {
                handles.push(handle);
            }
        }
        Ok(handles)
    }

    /// Replace the object behind a handle. Returns false for unknown handles.
    pub fn update<T: Any + Send + Sync>(&mut self, handle: FactHandle, value: T) -> SessionResult<bool> {
        self.update_object(handle, FactObject::new(value))
    }

    pub fn update_object(&mut self, handle: FactHandle, object: FactObject) -> SessionResult<bool> {
        self.ensure_open()?;
        Ok(self.working_memory().update(handle, object)?)
    }

    /// Retract a fact. Returns false for unknown handles.
    pub fn delete(&mut self, handle: FactHandle) -> SessionResult<bool> {
        self.ensure_open()?;
        Ok(self.working_memory().delete(handle))
    }

    pub fn delete_all(&mut self, handles: impl IntoIterator<Item = FactHandle>) -> SessionResult<usize> {
        let mut deleted = 0;
        for handle in handles {
            if self.delete(handle)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    // ==================== Queries ====================

    pub fn get_fact(&self, handle: FactHandle) -> Option<&FactObject> {
        self.storage.get(handle)
    }

    pub fn get_fact_as<T: Any>(&self, handle: FactHandle) -> Option<&T> {
        self.get_fact(handle).and_then(|o| o.downcast_ref::<T>())
    }

    /// Facts of one logical type, ordered by handle.
    pub fn facts_of(&self, type_name: &str) -> SessionResult<Vec<(FactHandle, &FactObject)>> {
        let type_id = self.registry.type_id(type_name)?;
        Ok(self.storage.facts_of(type_id))
    }

    /// Every fact, ordered by handle.
    pub fn facts(&self) -> Vec<(FactHandle, &FactObject)> {
        self.storage.facts()
    }

    pub fn fact_count(&self) -> usize {
        self.storage.len()
    }

    pub fn rules(&self) -> impl Iterator<Item = &Arc<RuleDescriptor>> + '_ {
        self.rules.iter().map(|r| r.descriptor())
    }

    // ==================== Rules ====================

    /// Compile and deploy a rule into this session only. Facts already in
    /// memory are matched on the next `fire()`.
    pub fn add_rule(&mut self, builder: RuleBuilder) -> SessionResult<RuleId> {
        self.ensure_open()?;
        if self.rules.iter().any(|r| r.name() == builder.name()) {
            return Err(RuleError::duplicate_rule(builder.name()).into());
        }
        let id = RuleId::new(self.rules.len() as u32);
        let descriptor = builder.compile(&mut self.registry, id)?;
        self.deploy(Arc::new(descriptor))?;
        Ok(id)
    }

    /// Swap the predicate of the condition `rule` declared as `source`.
    /// Matches already computed stay; new combinations are tested with
    /// `predicate`. Knowledge and sibling sessions are not affected.
    pub fn replace_condition(&mut self, rule: &str, source: &str, predicate: Predicate) -> SessionResult<()> {
        self.ensure_open()?;
        let target = self
            .rules
            .iter_mut()
            .find(|r| r.name() == rule)
            .ok_or_else(|| RuleError::unknown_rule(rule))?;
        target.replace_condition(&mut self.registry, source, predicate)?;
        Ok(())
    }

    fn deploy(&mut self, descriptor: Arc<RuleDescriptor>) -> SessionResult<()> {
        self.memory.sync_types(&self.registry)?;
        let name = descriptor.name.clone();
        let mut rule = SessionRule::new(descriptor, &mut self.memory)?;
        let bridge = bridge(&self.events, self.id);
        rule.initialize(&self.memory, bridge.as_ref().map(|b| b as &dyn EvaluationListener))?;
        self.rules.push(rule);

        debug!(session = self.id, rule = %name, "rule deployed");
        self.events.publish(Event::RuleDeployed {
            session: self.id,
            rule: name,
        });
        Ok(())
    }

    // ==================== Fire Loop ====================

    /// Run cycles until no fact changes are pending and no rule fires.
    pub fn fire(&mut self) -> SessionResult<FireStats> {
        self.fire_until(|_| true)
    }

    /// Run cycles while `criteria` holds. It is checked before every cycle;
    /// cycles already run stay committed when it stops the loop.
    pub fn fire_until<F>(&mut self, mut criteria: F) -> SessionResult<FireStats>
    where
        F: FnMut(&FireStats) -> bool,
    {
        self.ensure_open()?;
        let mut stats = FireStats::default();
        loop {
            if !self.has_work() {
                stats.fixpoint_reached = true;
                break;
            }
            if !criteria(&stats) {
                break;
            }
            if let Some(limit) = self.config.max_cycles {
                if stats.cycles >= limit {
                    return Err(SessionError::cycle_limit_exceeded(limit));
                }
            }
            self.cycle(&mut stats)?;
            stats.cycles += 1;
        }

        debug!(session = self.id, ?stats, "fire finished");
        self.events.publish(Event::SessionFired {
            session: self.id,
            stats,
        });
        Ok(stats)
    }

    /// Run `fire()` on a worker thread. The session comes back with the
    /// result.
    pub fn fire_async(mut self) -> JoinHandle<(Self, SessionResult<FireStats>)> {
        thread::spawn(move || {
            let result = self.fire();
            (self, result)
        })
    }

    fn has_work(&self) -> bool {
        self.storage.has_pending()
            || self.memory.has_uncommitted()
            || self.rules.iter().any(SessionRule::is_pending_full)
    }

    /// One cycle. If a condition fails the cycle is not committed: memory
    /// keeps its delta and the next `fire()` evaluates it again. Once the
    /// agenda runs the cycle is committed even if an action fails.
    fn cycle(&mut self, stats: &mut FireStats) -> SessionResult<()> {
        self.sequence += 1;
        let (inserted, agenda) = match self.evaluate() {
            Ok(evaluated) => evaluated,
            Err(e) => {
                for rule in &mut self.rules {
                    rule.discard_delta();
                }
                debug!(session = self.id, sequence = self.sequence, error = %e, "cycle evaluation failed");
                return Err(e);
            }
        };
        let fired = self.run_agenda(&agenda, stats);
        let committed = self.commit();
        let fired = fired?;
        committed?;

        self.events.publish(Event::CycleCompleted {
            session: self.id,
            sequence: self.sequence,
            inserted,
            fired,
        });
        Ok(())
    }

    /// Flush pending actions, compute deltas and build the agenda. Returns
    /// the facts that entered memory and the sorted agenda.
    fn evaluate(&mut self) -> SessionResult<(usize, Vec<AgendaItem>)> {
        self.memory.sync_types(&self.registry)?;
        let pending = self.storage.take_pending();
        let delta = pending.len();
        let inserted = self.memory.apply(pending, &self.storage)?;

        let bridge = bridge(&self.events, self.id);
        let listener = bridge.as_ref().map(|b| b as &dyn EvaluationListener);
        for rule in &mut self.rules {
            rule.compute_delta(&self.memory, listener)?;
        }

        let mut agenda = Vec::new();
        for rule in &self.rules {
            let activations = rule.activations(&self.memory)?;
            if activations.is_empty() {
                continue;
            }
            let descriptor = rule.descriptor();
            agenda.push(AgendaItem {
                rule: descriptor.id,
                name: descriptor.name.as_str().into(),
                salience: descriptor.salience,
                activations,
            });
        }
        AgendaItem::sort(&mut agenda);
        debug!(
            session = self.id,
            sequence = self.sequence,
            delta,
            inserted,
            agenda = agenda.len(),
            "cycle"
        );
        Ok((inserted, agenda))
    }

    /// Run the agenda in order. In default mode the walk stops after the
    /// first rule that inserts or updates facts; the next cycle rebuilds
    /// the agenda from the changed memory.
    fn run_agenda(&mut self, agenda: &[AgendaItem], stats: &mut FireStats) -> SessionResult<usize> {
        self.activations.on_agenda(self.sequence, agenda);
        let mut fired_total = 0;
        for (position, item) in agenda.iter().enumerate() {
            if !self.activations.test(item) {
                stats.activations_skipped += item.activations.len();
                continue;
            }
            let fired = self.run_item(item, stats)?;
            self.activations.on_activation(item, fired);
            fired_total += fired;

            if self.config.agenda_mode == AgendaMode::Default
                && self.storage.pending().delta_operations() > 0
            {
                let dropped: usize = agenda[position + 1..].iter().map(|i| i.activations.len()).sum();
                stats.activations_skipped += dropped;
                trace!(rule = %item.name, dropped, "agenda interrupted by fact changes");
                break;
            }
        }
        stats.activations_fired += fired_total;
        Ok(fired_total)
    }

    fn run_item(&mut self, item: &AgendaItem, stats: &mut FireStats) -> SessionResult<usize> {
        let Some(descriptor) = self
            .rules
            .iter()
            .find(|r| r.descriptor().id == item.rule)
            .map(|r| r.descriptor().clone())
        else {
            return Ok(0);
        };

        let mut fired = 0;
        for activation in &item.activations {
            let handles = activation.handles();
            if self.config.agenda_mode == AgendaMode::Default
                && handles.iter().any(|h| !self.storage.contains(*h))
            {
                trace!(rule = %descriptor.name, %activation, "activation lost its facts");
                stats.activations_skipped += 1;
                continue;
            }

            let mut memory = WorkingMemory::new(&mut self.registry, &mut self.storage, &self.config);
            let mut ctx = RhsContext::new(&descriptor, handles, &mut memory);
            descriptor
                .action
                .run(&mut ctx)
                .map_err(|cause| EvaluationError::action(&descriptor.name, handles, cause))?;
            trace!(rule = %descriptor.name, %activation, "fired");
            fired += 1;
        }
        Ok(fired)
    }

    /// Prune and merge node deltas, then memory. Nodes go first: memory
    /// commit frees deleted rows.
    fn commit(&mut self) -> SessionResult<()> {
        let mut result = Ok(());
        for rule in &mut self.rules {
            if let Err(e) = rule.commit(&self.memory) {
                result = Err(e);
            }
        }
        self.memory.commit();
        result.map_err(SessionError::from)
    }

    // ==================== Lifecycle ====================

    /// Close the session. Further operations fail with `SessionClosed`.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        debug!(session = self.id, "session closed");
        self.events.publish(Event::SessionClosed { session: self.id });
    }
}

/// Evaluation events are only produced while someone listens.
fn bridge(events: &EventBus, session: SessionId) -> Option<EvaluationBridge<'_>> {
    events
        .has_subscribers(EventKind::Evaluation)
        .then_some(EvaluationBridge { bus: events, session })
}

impl std::fmt::Debug for StatefulSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatefulSession")
            .field("id", &self.id)
            .field("facts", &self.storage.len())
            .field("rules", &self.rules.len())
            .field("sequence", &self.sequence)
            .field("closed", &self.closed)
            .finish()
    }
}
