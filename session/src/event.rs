//! Session event channel.
//!
//! Subscribers register per event kind and choose how they are called:
//! synchronously on the firing thread, in registration order, or on a
//! dedicated worker thread fed through a channel. A session's bus is
//! branched from its knowledge template, so subscriptions made on the
//! template reach every session spawned afterwards.

use crate::FireStats;
use ember_core::Value;
use ember_network::{EvaluationEvent, EvaluationListener};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use tracing::{trace, warn};

/// Kinds of session events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SessionCreated,
    CycleCompleted,
    SessionFired,
    RuleDeployed,
    SessionClosed,
    Evaluation,
}

/// A session event.
#[derive(Debug, Clone)]
pub enum Event {
    SessionCreated {
        session: u64,
    },
    CycleCompleted {
        session: u64,
        sequence: u64,
        inserted: usize,
        fired: usize,
    },
    SessionFired {
        session: u64,
        stats: FireStats,
    },
    RuleDeployed {
        session: u64,
        rule: String,
    },
    SessionClosed {
        session: u64,
    },
    /// One condition test in a condition node.
    Evaluation {
        session: u64,
        rule: String,
        node: usize,
        condition: String,
        args: Vec<Value>,
        result: bool,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::SessionCreated { .. } => EventKind::SessionCreated,
            Event::CycleCompleted { .. } => EventKind::CycleCompleted,
            Event::SessionFired { .. } => EventKind::SessionFired,
            Event::RuleDeployed { .. } => EventKind::RuleDeployed,
            Event::SessionClosed { .. } => EventKind::SessionClosed,
            Event::Evaluation { .. } => EventKind::Evaluation,
        }
    }

    pub fn session(&self) -> u64 {
        match self {
            Event::SessionCreated { session }
            | Event::CycleCompleted { session, .. }
            | Event::SessionFired { session, .. }
            | Event::RuleDeployed { session, .. }
            | Event::SessionClosed { session }
            | Event::Evaluation { session, .. } => *session,
        }
    }
}

/// How a subscriber is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// On the publishing thread, before `publish` returns.
    Sync,
    /// On a worker thread owned by the subscription.
    Async,
}

/// Identifies a subscription for `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Clone)]
enum Target {
    Sync(Handler),
    Async(Sender<Event>),
}

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    target: Target,
}

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(0);

/// Event kind to ordered subscriber list.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<IndexMap<EventKind, Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one kind of event.
    pub fn subscribe<F>(&self, kind: EventKind, dispatch: Dispatch, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed));
        let target = match dispatch {
            Dispatch::Sync => Target::Sync(Arc::new(handler)),
            Dispatch::Async => {
                let (tx, rx) = mpsc::channel::<Event>();
                thread::spawn(move || {
                    for event in rx {
                        handler(&event);
                    }
                });
                Target::Async(tx)
            }
        };
        self.subscribers
            .write()
            .entry(kind)
            .or_default()
            .push(Subscriber { id, target });
        trace!(?kind, ?dispatch, "subscribed");
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let mut removed = false;
        for list in subscribers.values_mut() {
            let before = list.len();
            list.retain(|s| s.id != id);
            removed |= list.len() != before;
        }
        removed
    }

    pub fn has_subscribers(&self, kind: EventKind) -> bool {
        self.subscribers
            .read()
            .get(&kind)
            .map(|list| !list.is_empty())
            .unwrap_or(false)
    }

    /// Deliver an event to the subscribers of its kind.
    pub fn publish(&self, event: Event) {
        let targets: Vec<Target> = match self.subscribers.read().get(&event.kind()) {
            Some(list) => list.iter().map(|s| s.target.clone()).collect(),
            None => return,
        };
        for target in targets {
            match target {
                Target::Sync(handler) => handler(&event),
                Target::Async(tx) => {
                    if tx.send(event.clone()).is_err() {
                        warn!(kind = ?event.kind(), "async subscriber is gone");
                    }
                }
            }
        }
    }

    /// A bus with the same subscriptions. Later subscriptions on either bus
    /// are not shared.
    pub fn branch(&self) -> Self {
        Self {
            subscribers: RwLock::new(self.subscribers.read().clone()),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subscribers = self.subscribers.read();
        let counts: Vec<(EventKind, usize)> = subscribers.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventBus").field("subscribers", &counts).finish()
    }
}

/// Forwards condition tests of one session to its bus.
pub(crate) struct EvaluationBridge<'a> {
    pub bus: &'a EventBus,
    pub session: u64,
}

impl EvaluationListener for EvaluationBridge<'_> {
    fn on_evaluation(&self, event: &EvaluationEvent<'_>) {
        self.bus.publish(Event::Evaluation {
            session: self.session,
            rule: event.rule.to_string(),
            node: event.node,
            condition: event.condition.to_string(),
            args: event.args.to_vec(),
            result: event.result,
        });
    }
}
