//! Activations, the agenda and the activation policy.

use ember_core::{FactHandle, RuleId};
use std::fmt;
use std::sync::Arc;

/// Facts matching a rule's LHS, one per fact variable in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Activation(Box<[FactHandle]>);

impl Activation {
    pub fn new(handles: Vec<FactHandle>) -> Self {
        Self(handles.into_boxed_slice())
    }

    pub fn handles(&self) -> &[FactHandle] {
        &self.0
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handles: Vec<String> = self.0.iter().map(|h| h.to_string()).collect();
        write!(f, "({})", handles.join(", "))
    }
}

/// A rule with new activations in the current cycle.
#[derive(Debug, Clone)]
pub struct AgendaItem {
    pub rule: RuleId,
    pub name: Arc<str>,
    pub salience: i32,
    pub activations: Vec<Activation>,
}

impl AgendaItem {
    /// Agenda order: salience descending, then declaration order.
    pub fn sort(agenda: &mut [AgendaItem]) {
        agenda.sort_by(|a, b| b.salience.cmp(&a.salience).then(a.rule.cmp(&b.rule)));
    }
}

/// Policy deciding which agenda items fire.
///
/// `on_agenda` is called once per cycle with the sorted agenda, then
/// `test` once per item in agenda order. Items passing the test fire, and
/// `on_activation` reports how many activations ran.
pub trait ActivationManager: Send {
    fn on_agenda(&mut self, _sequence: u64, _agenda: &[AgendaItem]) {}

    fn test(&mut self, _item: &AgendaItem) -> bool {
        true
    }

    fn on_activation(&mut self, _item: &AgendaItem, _fired: usize) {}
}

/// Fires everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultActivationManager;

impl ActivationManager for DefaultActivationManager {}
