//! Runtime condition nodes.
//!
//! A condition node joins the rows of its sources and keeps the tuples that
//! pass its evaluator group in a join index with main and delta partitions.
//! Each cycle it evaluates only combinations of source partitions that
//! include at least one delta: the all-main combination was settled in an
//! earlier cycle.

use crate::{
    ConditionDescriptor, EvaluationEvent, EvaluationListener, EvaluatorGroup, FactVar, Grouping,
    NetworkError, NetworkResult, NodeDescriptor,
};
use ember_core::{EvaluationError, Predicate, Value};
use ember_memory::{JoinEntries, JoinIndex, KeyBucketRef, KeyMemoryBucket, RowId, SessionMemory};
use std::slice;
use tracing::trace;

/// Everything a node reads while evaluating.
#[derive(Clone, Copy)]
pub struct NetworkContext<'a> {
    pub memory: &'a SessionMemory,
    pub vars: &'a [FactVar],
    /// Key bucket of each fact variable, indexed by variable.
    pub buckets: &'a [Option<KeyBucketRef>],
    pub rule: &'a str,
    pub listener: Option<&'a dyn EvaluationListener>,
}

impl<'a> NetworkContext<'a> {
    pub fn bucket(&self, var: usize) -> NetworkResult<&'a KeyMemoryBucket> {
        self.buckets
            .get(var)
            .copied()
            .flatten()
            .and_then(|b| self.memory.key_bucket(b))
            .ok_or(NetworkError::MissingBucket { var })
    }

    /// True if every row of `key` is still live.
    fn is_live(&self, vars: &[usize], key: &[RowId]) -> NetworkResult<bool> {
        for (var, row) in vars.iter().zip(key) {
            if self.bucket(*var)?.is_deleted(*row) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn value(&self, var: usize, row: RowId, position: usize) -> NetworkResult<Value> {
        let type_id = self
            .vars
            .get(var)
            .map(|v| v.type_id)
            .ok_or(NetworkError::Unbound { var })?;
        self.bucket(var)?
            .row(row)
            .and_then(|r| r.key().get(position))
            .and_then(|handle| self.memory.value(type_id, *handle))
            .cloned()
            .ok_or(NetworkError::MissingRow { var, row })
    }
}

/// Position of one predicate argument inside a variable's row key.
#[derive(Debug, Clone, Copy)]
struct ArgSlot {
    var: usize,
    position: usize,
}

#[derive(Debug, Clone)]
enum SourceInput {
    Entry { var: usize },
    Node(Box<ConditionNode>),
}

#[derive(Debug, Clone)]
struct NodeSource {
    input: SourceInput,
    grouping: Grouping,
}

/// Rows or tuples one source contributes to a combination.
enum SourceView<'v> {
    Rows(Vec<RowId>),
    Index(&'v JoinIndex),
}

impl<'v> SourceView<'v> {
    fn is_empty(&self) -> bool {
        match self {
            SourceView::Rows(rows) => rows.is_empty(),
            SourceView::Index(index) => index.is_empty(),
        }
    }

    fn entries(&self) -> ViewEntries<'_> {
        match self {
            SourceView::Rows(rows) => ViewEntries::Rows(rows.iter()),
            SourceView::Index(index) => ViewEntries::Index(index.entries()),
        }
    }
}

enum ViewEntries<'v> {
    Rows(slice::Iter<'v, RowId>),
    Index(JoinEntries<'v>),
}

impl<'v> Iterator for ViewEntries<'v> {
    type Item = (&'v [RowId], Option<&'v JoinIndex>);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            ViewEntries::Rows(it) => it.next().map(|row| (slice::from_ref(row), None)),
            ViewEntries::Index(it) => it.next(),
        }
    }
}

/// A condition node instantiated in a session.
#[derive(Debug, Clone)]
pub struct ConditionNode {
    id: usize,
    group: EvaluatorGroup,
    slots: Vec<Vec<ArgSlot>>,
    sources: Vec<NodeSource>,
    output: Grouping,
    main: JoinIndex,
    delta: JoinIndex,
}

impl ConditionNode {
    /// Instantiate a descriptor whose tuples are stored by `output`.
    pub fn new(descriptor: &ConditionDescriptor, output: Grouping, vars: &[FactVar]) -> NetworkResult<Self> {
        let mut slots = Vec::with_capacity(descriptor.group.conditions.len());
        for condition in &descriptor.group.conditions {
            let mut args = Vec::with_capacity(condition.refs.len());
            for field_ref in &condition.refs {
                let position = vars
                    .get(field_ref.var)
                    .and_then(|v| v.fields.position(field_ref.field))
                    .ok_or(NetworkError::FieldNotInKey {
                        var: field_ref.var,
                        field: field_ref.field,
                    })?;
                args.push(ArgSlot {
                    var: field_ref.var,
                    position,
                });
            }
            slots.push(args);
        }

        let mut sources = Vec::with_capacity(descriptor.sources.len());
        for source in &descriptor.sources {
            let input = match &source.node {
                NodeDescriptor::Entry { var } => SourceInput::Entry { var: *var },
                NodeDescriptor::Condition(child) => SourceInput::Node(Box::new(ConditionNode::new(
                    child,
                    source.grouping.clone(),
                    vars,
                )?)),
            };
            sources.push(NodeSource {
                input,
                grouping: source.grouping.clone(),
            });
        }

        let shape = output.shape();
        Ok(Self {
            id: descriptor.id,
            group: descriptor.group.clone(),
            slots,
            sources,
            output,
            main: JoinIndex::new(&shape),
            delta: JoinIndex::new(&shape),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn output(&self) -> &Grouping {
        &self.output
    }

    /// Tuples committed in earlier cycles.
    pub fn main(&self) -> &JoinIndex {
        &self.main
    }

    /// Tuples produced this cycle.
    pub fn delta(&self) -> &JoinIndex {
        &self.delta
    }

    // ==================== Cycle ====================

    /// Compute this cycle's new tuples, sources first.
    pub fn compute_delta(&mut self, ctx: &NetworkContext<'_>) -> NetworkResult<()> {
        for source in &mut self.sources {
            if let SourceInput::Node(child) = &mut source.input {
                child.compute_delta(ctx)?;
            }
        }

        let mut produced = self.delta.empty_like();
        let combinations = 1usize << self.sources.len();
        let mut evaluated = 0;
        for mask in 1..combinations {
            let views = self.views(ctx, mask)?;
            if views.iter().any(SourceView::is_empty) {
                continue;
            }
            evaluated += 1;
            self.join(ctx, &views, &mut produced)?;
        }

        trace!(
            rule = ctx.rule,
            node = self.id,
            group = %self.group,
            combinations = evaluated,
            produced = produced.tuple_count(),
            "computed node delta"
        );
        self.delta.append(produced);
        Ok(())
    }

    /// Fill main from committed memory. Used when a rule is deployed into a
    /// session that already holds facts.
    pub fn initialize(&mut self, ctx: &NetworkContext<'_>) -> NetworkResult<()> {
        for source in &mut self.sources {
            if let SourceInput::Node(child) = &mut source.input {
                child.initialize(ctx)?;
            }
        }

        let views = self.views(ctx, 0)?;
        let mut produced = self.main.empty_like();
        if !views.iter().any(SourceView::is_empty) {
            self.join(ctx, &views, &mut produced)?;
        }
        self.main.append(produced);
        Ok(())
    }

    /// Drop tuples holding deleted rows and merge delta into main.
    ///
    /// Must run before the key buckets commit, which frees deleted rows.
    pub fn commit(&mut self, ctx: &NetworkContext<'_>) -> NetworkResult<()> {
        for source in &mut self.sources {
            if let SourceInput::Node(child) = &mut source.input {
                child.commit(ctx)?;
            }
        }

        self.validate_buckets(ctx)?;
        let levels = self.output.levels();
        self.main
            .delete(&|level: usize, key: &[RowId]| !ctx.is_live(&levels[level], key).unwrap_or(false));
        let delta = self.delta.take();
        self.main.append(delta);
        Ok(())
    }

    /// Drop the tuples computed this cycle, here and in every source node.
    pub fn discard_delta(&mut self) {
        for source in &mut self.sources {
            if let SourceInput::Node(child) = &mut source.input {
                child.discard_delta();
            }
        }
        self.delta.clear();
    }

    /// Swap the predicate of `source` in this node and its source nodes.
    /// Tuples already stored are kept.
    pub fn replace_predicate(&mut self, source: &str, predicate: &Predicate) -> bool {
        let mut replaced = self.group.replace_predicate(source, predicate);
        for input in &mut self.sources {
            if let SourceInput::Node(child) = &mut input.input {
                replaced |= child.replace_predicate(source, predicate);
            }
        }
        replaced
    }

    fn validate_buckets(&self, ctx: &NetworkContext<'_>) -> NetworkResult<()> {
        for level in self.output.levels() {
            for var in level {
                ctx.bucket(*var)?;
            }
        }
        Ok(())
    }

    // ==================== Join ====================

    /// Source views for one combination: bit `i` of `mask` selects the
    /// delta partition of source `i`.
    fn views(&self, ctx: &NetworkContext<'_>, mask: usize) -> NetworkResult<Vec<SourceView<'_>>> {
        let mut views = Vec::with_capacity(self.sources.len());
        for (i, source) in self.sources.iter().enumerate() {
            let use_delta = mask & (1 << i) != 0;
            let view = match &source.input {
                SourceInput::Entry { var } => {
                    let bucket = ctx.bucket(*var)?;
                    let rows: Vec<RowId> = if use_delta {
                        bucket.delta_rows().copied().collect()
                    } else {
                        bucket.main_rows().copied().collect()
                    };
                    SourceView::Rows(rows)
                }
                SourceInput::Node(child) => {
                    SourceView::Index(if use_delta { &child.delta } else { &child.main })
                }
            };
            views.push(view);
        }
        Ok(views)
    }

    fn join<'v>(
        &self,
        ctx: &NetworkContext<'_>,
        views: &'v [SourceView<'v>],
        out: &mut JoinIndex,
    ) -> NetworkResult<()> {
        let mut rows: Vec<Option<RowId>> = vec![None; ctx.vars.len()];
        let mut secondary: Vec<Option<&'v JoinIndex>> = vec![None; views.len()];
        self.join_source(ctx, views, 0, &mut rows, &mut secondary, out)
    }

    /// Nested loop over the primary level of each source.
    fn join_source<'v>(
        &self,
        ctx: &NetworkContext<'_>,
        views: &'v [SourceView<'v>],
        i: usize,
        rows: &mut Vec<Option<RowId>>,
        secondary: &mut Vec<Option<&'v JoinIndex>>,
        out: &mut JoinIndex,
    ) -> NetworkResult<()> {
        if i == views.len() {
            if self.test(ctx, rows)? {
                self.expand_secondary(ctx, 0, rows, secondary, out)?;
            }
            return Ok(());
        }

        let primary = self.sources[i].grouping.primary();
        for (key, child) in views[i].entries() {
            if !ctx.is_live(primary, key)? {
                continue;
            }
            for (var, row) in primary.iter().zip(key) {
                rows[*var] = Some(*row);
            }
            secondary[i] = child;
            self.join_source(ctx, views, i + 1, rows, secondary, out)?;
        }
        Ok(())
    }

    /// After the group passed, enumerate the secondary rows of non-plain
    /// sources and store each complete tuple.
    fn expand_secondary(
        &self,
        ctx: &NetworkContext<'_>,
        i: usize,
        rows: &mut Vec<Option<RowId>>,
        secondary: &[Option<&JoinIndex>],
        out: &mut JoinIndex,
    ) -> NetworkResult<()> {
        if i == self.sources.len() {
            self.save(rows, out);
            return Ok(());
        }

        let vars = self.sources[i].grouping.secondary();
        match secondary[i] {
            Some(child) if !vars.is_empty() => {
                for (key, _) in child.entries() {
                    if !ctx.is_live(vars, key)? {
                        continue;
                    }
                    for (var, row) in vars.iter().zip(key) {
                        rows[*var] = Some(*row);
                    }
                    self.expand_secondary(ctx, i + 1, rows, secondary, out)?;
                }
                Ok(())
            }
            _ => self.expand_secondary(ctx, i + 1, rows, secondary, out),
        }
    }

    fn save(&self, rows: &[Option<RowId>], out: &mut JoinIndex) {
        let keys: Vec<Vec<RowId>> = self
            .output
            .levels()
            .iter()
            .map(|level| level.iter().filter_map(|v| rows[*v]).collect())
            .collect();
        let refs: Vec<&[RowId]> = keys.iter().map(Vec::as_slice).collect();
        out.save(&refs);
    }

    /// Evaluate the group, cheapest condition first.
    fn test(&self, ctx: &NetworkContext<'_>, rows: &[Option<RowId>]) -> NetworkResult<bool> {
        for (condition, slots) in self.group.conditions.iter().zip(&self.slots) {
            let mut args = Vec::with_capacity(slots.len());
            for slot in slots {
                let row = rows[slot.var].ok_or(NetworkError::Unbound { var: slot.var })?;
                args.push(ctx.value(slot.var, row, slot.position)?);
            }

            let result = condition
                .predicate
                .test(&args)
                .map_err(|cause| EvaluationError::condition(&condition.source, &args, cause))?;

            if let Some(listener) = ctx.listener {
                listener.on_evaluation(&EvaluationEvent {
                    rule: ctx.rule,
                    node: self.id,
                    condition: &condition.source,
                    args: &args,
                    result,
                });
            }
            if !result {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
