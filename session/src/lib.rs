//! Ember Session
//!
//! Sessions over a knowledge template.
//!
//! Responsibilities:
//! - Knowledge templates: shared type declarations and compiled rules
//! - Stateful sessions: working memory that persists across `fire()` calls
//! - Stateless sessions: insert, fire once, discard
//! - The fire loop: flush, propagate, activate, execute, commit, to fixpoint
//! - Hot deployment of rules into a live session
//! - The session event channel

mod error;
mod event;
mod knowledge;
mod session;
mod stateless;

pub use error::{SessionError, SessionResult};
pub use event::{Dispatch, Event, EventBus, EventKind, SubscriptionId};
pub use knowledge::Knowledge;
pub use session::{FireStats, SessionId, StatefulSession};
pub use stateless::StatelessSession;
