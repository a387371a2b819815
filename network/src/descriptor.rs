//! Compiled LHS descriptors.
//!
//! A rule's left-hand side is a list of fact variables plus beta conditions
//! over them. Variables connected by beta conditions form a beta fact group
//! evaluated by a tree of condition nodes; unconnected variables form plain
//! groups served straight from alpha buckets.

use crate::find_best_allocation;
use ember_core::{FieldId, Predicate, TypeId};
use ember_memory::{AlphaMask, FieldsKey};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// A fact variable declared on a rule's LHS (`$o: Order`).
#[derive(Debug, Clone)]
pub struct FactVar {
    /// Position in the rule's declaration order.
    pub index: usize,
    pub name: String,
    pub type_id: TypeId,
    /// Alpha conditions every bound fact passes.
    pub mask: AlphaMask,
    /// Fields read by beta conditions; the key of the variable's key bucket.
    pub fields: FieldsKey,
}

/// A field of a fact variable, as read by a beta condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub var: usize,
    pub field: FieldId,
}

impl FieldRef {
    pub fn new(var: usize, field: FieldId) -> Self {
        Self { var, field }
    }
}

/// A condition spanning two or more fact variables.
#[derive(Debug, Clone)]
pub struct BetaCondition {
    pub source: String,
    /// Arguments passed to the predicate, in order.
    pub refs: Vec<FieldRef>,
    /// Relative cost, used to order evaluation. Always positive.
    pub complexity: f64,
    pub predicate: Predicate,
}

impl BetaCondition {
    /// Fact variables this condition reads, sorted.
    pub fn vars(&self) -> Vec<usize> {
        self.refs
            .iter()
            .map(|r| r.var)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Beta conditions over one set of fact variables, evaluated together,
/// cheapest first.
#[derive(Debug, Clone)]
pub struct EvaluatorGroup {
    pub vars: Vec<usize>,
    pub conditions: Vec<Arc<BetaCondition>>,
    pub complexity: f64,
}

impl EvaluatorGroup {
    pub fn new(vars: Vec<usize>, mut conditions: Vec<Arc<BetaCondition>>) -> Self {
        conditions.sort_by(|a, b| a.complexity.total_cmp(&b.complexity));
        let complexity = conditions.iter().map(|c| c.complexity).sum();
        Self {
            vars,
            conditions,
            complexity,
        }
    }

    /// Group conditions that read the same variables, in first-seen order.
    pub fn group(conditions: Vec<BetaCondition>) -> Vec<EvaluatorGroup> {
        let mut grouped: IndexMap<Vec<usize>, Vec<Arc<BetaCondition>>> = IndexMap::new();
        for condition in conditions {
            grouped
                .entry(condition.vars())
                .or_default()
                .push(Arc::new(condition));
        }
        grouped
            .into_iter()
            .map(|(vars, conditions)| EvaluatorGroup::new(vars, conditions))
            .collect()
    }

    pub fn intersects(&self, vars: &[usize]) -> bool {
        vars.iter().any(|v| self.vars.contains(v))
    }

    /// Swap the predicate of every condition declared as `source`.
    pub fn replace_predicate(&mut self, source: &str, predicate: &Predicate) -> bool {
        let mut replaced = false;
        for condition in self.conditions.iter_mut().filter(|c| c.source == source) {
            *condition = Arc::new(BetaCondition {
                predicate: predicate.clone(),
                ..(**condition).clone()
            });
            replaced = true;
        }
        replaced
    }
}

impl fmt::Display for EvaluatorGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources: Vec<&str> = self.conditions.iter().map(|c| c.source.as_str()).collect();
        write!(f, "[{}]", sources.join(" && "))
    }
}

/// How a node's output tuples are keyed: one level, or a primary level
/// read by the consuming condition and a secondary level carried along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    levels: Vec<Vec<usize>>,
}

impl Grouping {
    pub fn single(vars: Vec<usize>) -> Self {
        Self { levels: vec![vars] }
    }

    pub fn split(primary: Vec<usize>, secondary: Vec<usize>) -> Self {
        if secondary.is_empty() {
            Self::single(primary)
        } else {
            Self {
                levels: vec![primary, secondary],
            }
        }
    }

    pub fn levels(&self) -> &[Vec<usize>] {
        &self.levels
    }

    pub fn primary(&self) -> &[usize] {
        &self.levels[0]
    }

    pub fn secondary(&self) -> &[usize] {
        self.levels.get(1).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when the consumer reads every variable at the first level.
    pub fn is_plain(&self) -> bool {
        self.levels.len() == 1
    }

    /// Join-index shape for this grouping.
    pub fn shape(&self) -> Vec<usize> {
        self.levels.iter().map(Vec::len).collect()
    }
}

/// A node of the beta tree before it is instantiated in a session.
#[derive(Debug, Clone)]
pub enum NodeDescriptor {
    /// Rows of one fact variable's key bucket.
    Entry { var: usize },
    Condition(ConditionDescriptor),
}

impl NodeDescriptor {
    pub fn vars(&self) -> &[usize] {
        match self {
            NodeDescriptor::Entry { var } => std::slice::from_ref(var),
            NodeDescriptor::Condition(c) => &c.vars,
        }
    }

    pub fn is_condition(&self) -> bool {
        matches!(self, NodeDescriptor::Condition(_))
    }

    /// Average number of condition levels between this node and its
    /// entry nodes.
    pub fn distance_to_entry(&self) -> f64 {
        match self {
            NodeDescriptor::Entry { .. } => 0.0,
            NodeDescriptor::Condition(c) => {
                let total: f64 = c
                    .sources
                    .iter()
                    .map(|s| 1.0 + s.node.distance_to_entry())
                    .sum();
                total / c.sources.len() as f64
            }
        }
    }
}

/// A source of a condition node, with the grouping the node reads it by.
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub node: NodeDescriptor,
    pub grouping: Grouping,
}

/// A condition node: one evaluator group joining its sources.
#[derive(Debug, Clone)]
pub struct ConditionDescriptor {
    pub id: usize,
    pub group: EvaluatorGroup,
    pub sources: Vec<SourceDescriptor>,
    /// Every variable below this node, sorted.
    pub vars: Vec<usize>,
}

impl ConditionDescriptor {
    /// Join `sources` under `group`. Each source's primary level holds the
    /// variables the group reads from it.
    pub fn new(id: usize, group: EvaluatorGroup, mut sources: Vec<NodeDescriptor>) -> Self {
        sources.sort_by_key(|s| s.vars().first().copied());
        let mut vars = BTreeSet::new();
        let sources = sources
            .into_iter()
            .map(|node| {
                vars.extend(node.vars().iter().copied());
                let (primary, secondary): (Vec<usize>, Vec<usize>) =
                    node.vars().iter().copied().partition(|v| group.vars.contains(v));
                SourceDescriptor {
                    grouping: Grouping::split(primary, secondary),
                    node,
                }
            })
            .collect();
        Self {
            id,
            group,
            sources,
            vars: vars.into_iter().collect(),
        }
    }

    /// Cost of this node's shape: balanced trees close to the entry nodes
    /// score lowest.
    pub fn complexity(&self) -> f64 {
        let distances: Vec<f64> = self
            .sources
            .iter()
            .map(|s| s.node.distance_to_entry())
            .collect();
        let avg = distances.iter().sum::<f64>() / distances.len() as f64;
        let deviation: f64 = distances.iter().map(|d| (d - avg).powi(2)).sum();
        avg * (1.0 + deviation)
    }

    /// Swap the predicate of `source` anywhere in this tree.
    pub fn replace_predicate(&mut self, source: &str, predicate: &Predicate) -> bool {
        let mut replaced = self.group.replace_predicate(source, predicate);
        for s in &mut self.sources {
            if let NodeDescriptor::Condition(child) = &mut s.node {
                replaced |= child.replace_predicate(source, predicate);
            }
        }
        replaced
    }

    /// Number of condition nodes in this tree.
    pub fn node_count(&self) -> usize {
        1 + self
            .sources
            .iter()
            .map(|s| match &s.node {
                NodeDescriptor::Condition(c) => c.node_count(),
                NodeDescriptor::Entry { .. } => 0,
            })
            .sum::<usize>()
    }
}

/// A group of fact variables whose tuples are produced independently.
#[derive(Debug, Clone)]
pub enum FactGroupDescriptor {
    /// A variable with no beta conditions, read from its alpha bucket.
    Plain { var: usize },
    /// Variables joined by a tree of condition nodes.
    Beta { root: ConditionDescriptor },
}

impl FactGroupDescriptor {
    pub fn vars(&self) -> &[usize] {
        match self {
            FactGroupDescriptor::Plain { var } => std::slice::from_ref(var),
            FactGroupDescriptor::Beta { root } => &root.vars,
        }
    }
}

/// A compiled left-hand side.
#[derive(Debug, Clone)]
pub struct LhsDescriptor {
    pub vars: Vec<FactVar>,
    pub groups: Vec<FactGroupDescriptor>,
}

impl LhsDescriptor {
    /// Compile variables and beta conditions into fact groups.
    pub fn compile(vars: Vec<FactVar>, conditions: Vec<BetaCondition>) -> Self {
        let roots = find_best_allocation(EvaluatorGroup::group(conditions));

        let mut groups: Vec<FactGroupDescriptor> = Vec::new();
        let beta_vars: BTreeSet<usize> = roots.iter().flat_map(|r| r.vars.iter().copied()).collect();
        for var in &vars {
            if !beta_vars.contains(&var.index) {
                groups.push(FactGroupDescriptor::Plain { var: var.index });
            }
        }
        groups.extend(roots.into_iter().map(|root| FactGroupDescriptor::Beta { root }));
        groups.sort_by_key(|g| g.vars().first().copied());

        Self { vars, groups }
    }

    pub fn var(&self, name: &str) -> Option<&FactVar> {
        self.vars.iter().find(|v| v.name == name)
    }

    /// Swap the predicate of a beta condition. Returns false if no beta
    /// condition was declared as `source`.
    pub fn replace_predicate(&mut self, source: &str, predicate: &Predicate) -> bool {
        let mut replaced = false;
        for group in &mut self.groups {
            if let FactGroupDescriptor::Beta { root } = group {
                replaced |= root.replace_predicate(source, predicate);
            }
        }
        replaced
    }

    /// Variables with a key bucket: every variable of a beta group.
    pub fn beta_vars(&self) -> impl Iterator<Item = &FactVar> + '_ {
        self.groups
            .iter()
            .filter(|g| matches!(g, FactGroupDescriptor::Beta { .. }))
            .flat_map(|g| g.vars().iter())
            .filter_map(|v| self.vars.get(*v))
    }
}
