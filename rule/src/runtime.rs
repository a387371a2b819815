//! A rule deployed into a session.
//!
//! Each fact group of the LHS yields partial matches independently: plain
//! groups read their alpha bucket, beta groups the tuples at the end of
//! their condition tree. Activations are the product of the groups'
//! partial matches, keeping only those with at least one new fact.

use crate::{Activation, RuleDescriptor, RuleResult};
use ember_core::{FactHandle, Predicate};
use ember_memory::{AlphaBucketRef, KeyBucketRef, SessionMemory};
use ember_network::{
    ConditionNode, EvaluationListener, FactGroupDescriptor, Grouping, NetworkContext, NetworkError,
};
use ember_registry::TypeRegistry;
use indexmap::IndexSet;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
enum RuntimeGroup {
    Plain { var: usize, bucket: AlphaBucketRef },
    Beta { vars: Vec<usize>, end: ConditionNode },
}

/// Partial matches of one group, each aligned with `vars`.
#[derive(Debug, Default)]
struct GroupMatches {
    vars: Vec<usize>,
    /// Matches holding at least one fact added this cycle.
    new: Vec<Vec<FactHandle>>,
    /// Matches made only of committed facts.
    old: Vec<Vec<FactHandle>>,
}

/// Session-side state of a rule: its memory buckets and condition nodes.
#[derive(Debug, Clone)]
pub struct SessionRule {
    descriptor: Arc<RuleDescriptor>,
    groups: Vec<RuntimeGroup>,
    buckets: Vec<Option<KeyBucketRef>>,
    /// Set when the rule joined a session holding facts; the next cycle
    /// reports every match, not just new ones.
    pending_full: bool,
}

impl SessionRule {
    /// Register the rule's buckets in `memory` and instantiate its nodes.
    pub fn new(descriptor: Arc<RuleDescriptor>, memory: &mut SessionMemory) -> RuleResult<Self> {
        let vars = descriptor.vars();
        let mut buckets = vec![None; vars.len()];
        for var in descriptor.lhs.beta_vars() {
            buckets[var.index] = Some(memory.touch_key_bucket(var.type_id, &var.fields, &var.mask)?);
        }

        let mut groups = Vec::with_capacity(descriptor.lhs.groups.len());
        for group in &descriptor.lhs.groups {
            let runtime = match group {
                FactGroupDescriptor::Plain { var } => {
                    let fact_var = vars.get(*var).ok_or(NetworkError::Unbound { var: *var })?;
                    RuntimeGroup::Plain {
                        var: *var,
                        bucket: memory.touch_alpha_bucket(fact_var.type_id, &fact_var.mask)?,
                    }
                }
                FactGroupDescriptor::Beta { root } => RuntimeGroup::Beta {
                    vars: root.vars.clone(),
                    end: ConditionNode::new(root, Grouping::single(root.vars.clone()), vars)?,
                },
            };
            groups.push(runtime);
        }

        debug!(rule = %descriptor, groups = groups.len(), "instantiated rule");
        Ok(Self {
            descriptor,
            groups,
            buckets,
            pending_full: false,
        })
    }

    pub fn descriptor(&self) -> &Arc<RuleDescriptor> {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// True until the first commit after `initialize`.
    pub fn is_pending_full(&self) -> bool {
        self.pending_full
    }

    // ==================== Cycle ====================

    /// Join committed memory into the nodes. The next call to
    /// `activations` reports every current match.
    pub fn initialize(
        &mut self,
        memory: &SessionMemory,
        listener: Option<&dyn EvaluationListener>,
    ) -> RuleResult<()> {
        let ctx = context(&self.descriptor, &self.buckets, memory, listener);
        for group in &mut self.groups {
            if let RuntimeGroup::Beta { end, .. } = group {
                end.initialize(&ctx)?;
            }
        }
        self.pending_full = true;
        Ok(())
    }

    /// Evaluate this cycle's new combinations in every condition node.
    pub fn compute_delta(
        &mut self,
        memory: &SessionMemory,
        listener: Option<&dyn EvaluationListener>,
    ) -> RuleResult<()> {
        let ctx = context(&self.descriptor, &self.buckets, memory, listener);
        for group in &mut self.groups {
            if let RuntimeGroup::Beta { end, .. } = group {
                end.compute_delta(&ctx)?;
            }
        }
        Ok(())
    }

    /// Prune tuples of deleted rows and merge deltas. Runs before memory
    /// commits.
    pub fn commit(&mut self, memory: &SessionMemory) -> RuleResult<()> {
        let ctx = context(&self.descriptor, &self.buckets, memory, None);
        for group in &mut self.groups {
            if let RuntimeGroup::Beta { end, .. } = group {
                end.commit(&ctx)?;
            }
        }
        self.pending_full = false;
        Ok(())
    }

    /// Drop node tuples computed this cycle. Used when a cycle fails
    /// before its agenda runs: memory keeps its delta and the next cycle
    /// evaluates it again.
    pub fn discard_delta(&mut self) {
        for group in &mut self.groups {
            if let RuntimeGroup::Beta { end, .. } = group {
                end.discard_delta();
            }
        }
    }

    /// Swap the predicate of the condition declared as `source`. Matches
    /// already computed are kept.
    pub fn replace_condition(
        &mut self,
        registry: &mut TypeRegistry,
        source: &str,
        predicate: Predicate,
    ) -> RuleResult<()> {
        Arc::make_mut(&mut self.descriptor).replace_condition(registry, source, predicate.clone())?;
        for group in &mut self.groups {
            if let RuntimeGroup::Beta { end, .. } = group {
                end.replace_predicate(source, &predicate);
            }
        }
        Ok(())
    }

    // ==================== Activations ====================

    /// Activations produced this cycle.
    ///
    /// Committed matches are only read for groups combined with another
    /// group's new matches, or after `initialize`; a cycle that changed
    /// nothing under this rule costs one pass over its deltas.
    pub fn activations(&self, memory: &SessionMemory) -> RuleResult<Vec<Activation>> {
        let ctx = context(&self.descriptor, &self.buckets, memory, None);
        let mut matches = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            let group_matches = match group {
                RuntimeGroup::Plain { var, bucket } => plain_new(memory, *var, *bucket),
                RuntimeGroup::Beta { vars, end } => beta_new(&ctx, vars, end)?,
            };
            matches.push(group_matches);
        }

        let with_new: Vec<bool> = matches.iter().map(|m| !m.new.is_empty()).collect();
        if !self.pending_full && !with_new.contains(&true) {
            return Ok(Vec::new());
        }
        for (i, group) in self.groups.iter().enumerate() {
            let needed = self.pending_full || with_new.iter().enumerate().any(|(j, new)| j != i && *new);
            if !needed {
                continue;
            }
            matches[i].old = match group {
                RuntimeGroup::Plain { bucket, .. } => plain_old(memory, *bucket),
                RuntimeGroup::Beta { vars, end } => beta_old(&ctx, vars, end)?,
            };
        }

        let mut out = Vec::new();
        let combinations = 1usize << matches.len();
        let first = if self.pending_full { 0 } else { 1 };
        let mut handles = vec![None; self.descriptor.vars().len()];
        for mask in first..combinations {
            let parts: Vec<(&[usize], &[Vec<FactHandle>])> = matches
                .iter()
                .enumerate()
                .map(|(i, m)| {
                    let side = if mask & (1 << i) != 0 { &m.new } else { &m.old };
                    (m.vars.as_slice(), side.as_slice())
                })
                .collect();
            if parts.iter().any(|(_, side)| side.is_empty()) {
                continue;
            }
            product(&parts, 0, &mut handles, &mut out);
        }

        if !out.is_empty() {
            trace!(rule = %self.descriptor.name, activations = out.len(), "rule activated");
        }
        Ok(out)
    }
}

fn plain_new(memory: &SessionMemory, var: usize, bucket: AlphaBucketRef) -> GroupMatches {
    let new = memory
        .alpha_bucket(bucket)
        .map(|b| b.delta().iter().map(|h| vec![*h]).collect())
        .unwrap_or_default();
    GroupMatches {
        vars: vec![var],
        new,
        old: Vec::new(),
    }
}

fn plain_old(memory: &SessionMemory, bucket: AlphaBucketRef) -> Vec<Vec<FactHandle>> {
    memory
        .alpha_bucket(bucket)
        .map(|b| b.main().iter().map(|h| vec![*h]).collect())
        .unwrap_or_default()
}

/// New matches of a beta group. Tuples produced this cycle contribute every
/// fact combination of their rows. Committed tuples contribute the
/// combinations holding facts that joined their rows this cycle; they are
/// only scanned when one of the group's buckets has such rows.
fn beta_new(ctx: &NetworkContext<'_>, vars: &[usize], end: &ConditionNode) -> RuleResult<GroupMatches> {
    let mut matches = GroupMatches {
        vars: vars.to_vec(),
        ..GroupMatches::default()
    };

    for tuple in end.delta().tuples() {
        let Some(rows) = tuple.first() else { continue };
        let mut facts = Vec::with_capacity(vars.len());
        for (var, row) in vars.iter().zip(rows.iter()) {
            let row = ctx.bucket(*var)?.row(*row).ok_or(NetworkError::MissingRow { var: *var, row: *row })?;
            facts.push(row.facts().collect::<Vec<_>>());
        }
        expand_facts(&facts, &mut matches.new);
    }

    let mut touched = false;
    for var in vars {
        touched |= ctx.bucket(*var)?.has_touched();
    }
    if touched {
        for_live_tuples(ctx, vars, end, |main, delta| {
            if delta.iter().any(|d| !d.is_empty()) {
                expand_partitions(main, delta, false, &mut matches.new);
            }
        })?;
    }
    Ok(matches)
}

/// Committed combinations of committed tuples.
fn beta_old(ctx: &NetworkContext<'_>, vars: &[usize], end: &ConditionNode) -> RuleResult<Vec<Vec<FactHandle>>> {
    let mut old = Vec::new();
    for_live_tuples(ctx, vars, end, |main, delta| expand_partitions(main, delta, true, &mut old))?;
    Ok(old)
}

/// Visit the committed end-node tuples whose rows are all live, with the
/// main and delta facts of each row.
fn for_live_tuples<F>(ctx: &NetworkContext<'_>, vars: &[usize], end: &ConditionNode, mut f: F) -> RuleResult<()>
where
    F: FnMut(&[&IndexSet<FactHandle>], &[&IndexSet<FactHandle>]),
{
    let mut main = Vec::with_capacity(vars.len());
    let mut delta = Vec::with_capacity(vars.len());
    for tuple in end.main().tuples() {
        let Some(rows) = tuple.first() else { continue };
        main.clear();
        delta.clear();
        for (var, row_id) in vars.iter().zip(rows.iter()) {
            match ctx.bucket(*var)?.row(*row_id) {
                Some(row) if !row.is_deleted() => {
                    main.push(row.main_facts());
                    delta.push(row.delta_facts());
                }
                _ => break,
            }
        }
        if main.len() == vars.len() {
            f(&main, &delta);
        }
    }
    Ok(())
}

fn context<'a>(
    descriptor: &'a RuleDescriptor,
    buckets: &'a [Option<KeyBucketRef>],
    memory: &'a SessionMemory,
    listener: Option<&'a dyn EvaluationListener>,
) -> NetworkContext<'a> {
    NetworkContext {
        memory,
        vars: descriptor.vars(),
        buckets,
        rule: &descriptor.name,
        listener,
    }
}

/// Every combination picking one fact per variable.
fn expand_facts(facts: &[Vec<FactHandle>], out: &mut Vec<Vec<FactHandle>>) {
    fn walk(facts: &[Vec<FactHandle>], i: usize, current: &mut Vec<FactHandle>, out: &mut Vec<Vec<FactHandle>>) {
        if i == facts.len() {
            out.push(current.clone());
            return;
        }
        for handle in &facts[i] {
            current.push(*handle);
            walk(facts, i + 1, current, out);
            current.pop();
        }
    }
    walk(facts, 0, &mut Vec::with_capacity(facts.len()), out);
}

/// Combinations over main/delta fact partitions of committed rows. With
/// `committed` only the all-main combination, otherwise every other one.
fn expand_partitions(
    main: &[&IndexSet<FactHandle>],
    delta: &[&IndexSet<FactHandle>],
    committed: bool,
    out: &mut Vec<Vec<FactHandle>>,
) {
    let combinations = 1usize << main.len();
    let masks = if committed { 0..1 } else { 1..combinations };
    for mask in masks {
        let facts: Vec<Vec<FactHandle>> = (0..main.len())
            .map(|i| {
                let side = if mask & (1 << i) != 0 { delta[i] } else { main[i] };
                side.iter().copied().collect()
            })
            .collect();
        if facts.iter().any(Vec::is_empty) {
            continue;
        }
        expand_facts(&facts, out);
    }
}

/// Cartesian product of group matches into complete activations.
fn product(
    parts: &[(&[usize], &[Vec<FactHandle>])],
    i: usize,
    handles: &mut Vec<Option<FactHandle>>,
    out: &mut Vec<Activation>,
) {
    if i == parts.len() {
        out.push(Activation::new(handles.iter().flatten().copied().collect()));
        return;
    }
    let (vars, side) = parts[i];
    for partial in side {
        for (var, handle) in vars.iter().zip(partial) {
            handles[*var] = Some(*handle);
        }
        product(parts, i + 1, handles, out);
    }
}
