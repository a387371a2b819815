//! Join ordering.
//!
//! Evaluator groups are folded into condition nodes one at a time: each
//! group absorbs every unallocated node sharing a variable with it. The
//! order of groups therefore decides the tree. Groups are taken by
//! increasing variable count; within one count, permutations are tried and
//! the tree with the lowest total shape cost wins.

use crate::{ConditionDescriptor, EvaluatorGroup, NodeDescriptor};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Upper bound on the number of group orders tried. Beyond it, groups are
/// taken cheapest first.
pub const MAX_PERMUTATIONS: usize = 5040;

/// Build condition trees by folding groups in the given order. Returns the
/// root of each independent tree.
pub fn allocate_conditions(sequence: &[EvaluatorGroup]) -> Vec<ConditionDescriptor> {
    let beta_vars: BTreeSet<usize> = sequence.iter().flat_map(|g| g.vars.iter().copied()).collect();
    let mut unallocated: Vec<NodeDescriptor> = beta_vars
        .into_iter()
        .map(|var| NodeDescriptor::Entry { var })
        .collect();

    for (id, group) in sequence.iter().enumerate() {
        let (matching, rest): (Vec<_>, Vec<_>) = unallocated
            .into_iter()
            .partition(|node| group.intersects(node.vars()));
        debug_assert!(!matching.is_empty());
        unallocated = rest;
        unallocated.push(NodeDescriptor::Condition(ConditionDescriptor::new(
            id,
            group.clone(),
            matching,
        )));
    }

    let mut roots: Vec<ConditionDescriptor> = unallocated
        .into_iter()
        .filter_map(|node| match node {
            NodeDescriptor::Condition(c) => Some(c),
            NodeDescriptor::Entry { .. } => None,
        })
        .collect();
    roots.sort_by_key(|r| r.vars.first().copied());
    roots
}

/// Choose the cheapest group order and allocate it.
pub fn find_best_allocation(groups: Vec<EvaluatorGroup>) -> Vec<ConditionDescriptor> {
    if groups.is_empty() {
        return Vec::new();
    }

    let mut by_count: BTreeMap<usize, Vec<EvaluatorGroup>> = BTreeMap::new();
    for group in groups {
        by_count.entry(group.vars.len()).or_default().push(group);
    }
    for level in by_count.values_mut() {
        level.sort_by(|a, b| a.complexity.total_cmp(&b.complexity));
    }

    let total = by_count
        .values()
        .map(|level| factorial(level.len()))
        .try_fold(1usize, |acc, n| acc.checked_mul(n?));
    let levels: Vec<Vec<EvaluatorGroup>> = by_count.into_values().collect();

    let orders = match total {
        Some(n) if n <= MAX_PERMUTATIONS => level_orders(&levels),
        _ => vec![levels.iter().flatten().cloned().collect()],
    };

    let mut best: Option<(f64, Vec<ConditionDescriptor>)> = None;
    for order in &orders {
        let roots = allocate_conditions(order);
        let cost: f64 = roots.iter().map(total_complexity).sum();
        if best.as_ref().map_or(true, |(min, _)| cost < *min) {
            best = Some((cost, roots));
        }
    }
    trace!(candidates = orders.len(), "allocated condition nodes");
    best.map(|(_, roots)| roots).unwrap_or_default()
}

fn total_complexity(node: &ConditionDescriptor) -> f64 {
    node.complexity()
        + node
            .sources
            .iter()
            .map(|s| match &s.node {
                NodeDescriptor::Condition(c) => total_complexity(c),
                NodeDescriptor::Entry { .. } => 0.0,
            })
            .sum::<f64>()
}

fn factorial(n: usize) -> Option<usize> {
    (1..=n).try_fold(1usize, |acc, k| acc.checked_mul(k))
}

/// Every flattened order: the cartesian product of each level's
/// permutations, levels kept in ascending variable count.
fn level_orders(levels: &[Vec<EvaluatorGroup>]) -> Vec<Vec<EvaluatorGroup>> {
    let mut orders: Vec<Vec<EvaluatorGroup>> = vec![Vec::new()];
    for level in levels {
        let perms = permutations(level.len());
        let mut next = Vec::with_capacity(orders.len() * perms.len());
        for prefix in &orders {
            for perm in &perms {
                let mut order = prefix.clone();
                order.extend(perm.iter().map(|i| level[*i].clone()));
                next.push(order);
            }
        }
        orders = next;
    }
    orders
}

/// All orderings of `0..n`, starting with the identity.
fn permutations(n: usize) -> Vec<Vec<usize>> {
    fn extend(current: &mut Vec<usize>, used: &mut [bool], out: &mut Vec<Vec<usize>>) {
        if current.len() == used.len() {
            out.push(current.clone());
            return;
        }
        for i in 0..used.len() {
            if !used[i] {
                used[i] = true;
                current.push(i);
                extend(current, used, out);
                current.pop();
                used[i] = false;
            }
        }
    }

    let mut out = Vec::new();
    extend(&mut Vec::with_capacity(n), &mut vec![false; n], &mut out);
    out
}
