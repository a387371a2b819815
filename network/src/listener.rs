//! Evaluation listeners.

use ember_core::Value;

/// One condition test inside a condition node.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationEvent<'a> {
    pub rule: &'a str,
    pub node: usize,
    pub condition: &'a str,
    pub args: &'a [Value],
    pub result: bool,
}

/// Observer of condition evaluations. Listeners see every test a node
/// performs and cannot influence the outcome.
pub trait EvaluationListener: Send + Sync {
    fn on_evaluation(&self, event: &EvaluationEvent<'_>);
}
