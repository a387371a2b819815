//! Recorders observing what the engine did.

use ember_core::{Predicate, Value};
use ember_rule::{ActivationManager, AgendaItem};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Ordered log shared between actions and the test body.
#[derive(Debug, Clone, Default)]
pub struct FireLog(Arc<Mutex<Vec<String>>>);

impl FireLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// Counts predicate calls.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// `args[0] == args[1]`, counted.
    pub fn equals(&self) -> Predicate {
        let calls = self.0.clone();
        Predicate::new(move |args: &[Value]| {
            calls.fetch_add(1, Ordering::SeqCst);
            args[0] == args[1]
        })
    }
}

/// Refuses agenda items of the named rules and records every agenda.
#[derive(Debug, Clone, Default)]
pub struct BlockingManager {
    blocked: Vec<String>,
    pub agendas: Arc<Mutex<Vec<(u64, Vec<String>)>>>,
    pub fired: Arc<Mutex<Vec<(String, usize)>>>,
}

impl BlockingManager {
    pub fn blocking(rules: &[&str]) -> Self {
        Self {
            blocked: rules.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }
}

impl ActivationManager for BlockingManager {
    fn on_agenda(&mut self, sequence: u64, agenda: &[AgendaItem]) {
        let names = agenda.iter().map(|i| i.name.to_string()).collect();
        self.agendas.lock().push((sequence, names));
    }

    fn test(&mut self, item: &AgendaItem) -> bool {
        !self.blocked.iter().any(|b| b.as_str() == &*item.name)
    }

    fn on_activation(&mut self, item: &AgendaItem, fired: usize) {
        self.fired.lock().push((item.name.to_string(), fired));
    }
}
