//! FLWOR clauses.
//!
//! A FLWOR expression is a chain of clauses: each clause's `return_expr`
//! is the next clause (whose `previous` points back) or the final return
//! expression. The first clause drives evaluation. It opens the buffers
//! the ordering, grouping and counting clauses need, runs the chain, and
//! then calls `post_eval` forward along the chain so `order by` and
//! `group by` can emit their buffered tuples.
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::analyze::{Analysis, Analyzer};
use crate::cardinality::Cardinality;
use crate::collation::Collation;
use crate::context::{AnalyzeContext, ContextFlags, ContextId};
use crate::dependency::Dependency;
use crate::error::{Error, ErrorCode};
use crate::eval::Evaluator;
use crate::eval::state::{CachedBinding, FrameMark, InvalidateOnUpdate};
use crate::expr::{ExprId, ExprKind, ExprNode};
use crate::types::{ItemType, SequenceType};
use crate::value::{AtomicValue, ExpandedName, Item, NodeProxy, NodeSet, Sequence};
use crate::visitor::{VariableReferenceCollector, accept};

#[derive(Debug, Clone)]
pub struct ForClause {
    pub var: ExpandedName,
    pub position_var: Option<ExpandedName>,
    pub allowing_empty: bool,
    pub seq_type: Option<SequenceType>,
    pub input: ExprId,
    pub return_expr: ExprId,
    pub previous: Option<ExprId>,
    /// Input is independent of focus and local variables and may be kept
    /// across evaluations while its documents are unchanged.
    pub cacheable: bool,
}

#[derive(Debug, Clone)]
pub struct LetClause {
    pub var: ExpandedName,
    pub seq_type: Option<SequenceType>,
    pub input: ExprId,
    pub return_expr: ExprId,
    pub previous: Option<ExprId>,
    pub cacheable: bool,
}

/// Shape of a where condition that can filter the preceding for clause's
/// whole input at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastTrackShape {
    /// `$x/...`: hits are mapped back to bindings through correlation links.
    Path,
    /// `$x[...]`: the hits are the surviving bindings themselves.
    Filter,
}

#[derive(Debug, Clone)]
pub struct WhereClause {
    pub condition: ExprId,
    pub return_expr: ExprId,
    pub previous: Option<ExprId>,
    pub fast_track: Option<FastTrackShape>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyOrder {
    #[default]
    Least,
    Greatest,
}

#[derive(Debug, Clone)]
pub struct OrderSpec {
    pub key: ExprId,
    pub descending: bool,
    pub empty: EmptyOrder,
    pub collation: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrderByClause {
    pub specs: Vec<OrderSpec>,
    pub return_expr: ExprId,
    pub previous: Option<ExprId>,
    /// FLWOR variables captured per tuple and rebound after sorting.
    pub rebind: Vec<ExpandedName>,
}

#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub var: ExpandedName,
    /// `group by $k := expr`; without a key the in-scope `$k` is used.
    pub key: Option<ExprId>,
    pub collation: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GroupByClause {
    pub specs: Vec<GroupSpec>,
    pub return_expr: ExprId,
    pub previous: Option<ExprId>,
    /// Non-grouping variables, rebound to the concatenation of their values
    /// over each group.
    pub rebind: Vec<ExpandedName>,
}

#[derive(Debug, Clone)]
pub struct CountClause {
    pub var: ExpandedName,
    pub return_expr: ExprId,
    pub previous: Option<ExprId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Tumbling,
    Sliding,
}

#[derive(Debug, Clone, Default)]
pub struct WindowVars {
    pub current: Option<ExpandedName>,
    pub position: Option<ExpandedName>,
    pub previous: Option<ExpandedName>,
    pub next: Option<ExpandedName>,
}

impl WindowVars {
    fn names(&self) -> impl Iterator<Item = &ExpandedName> {
        [&self.current, &self.position, &self.previous, &self.next]
            .into_iter()
            .flatten()
    }
}

#[derive(Debug, Clone)]
pub struct WindowCondition {
    pub vars: WindowVars,
    pub when: ExprId,
}

#[derive(Debug, Clone)]
pub struct WindowClause {
    pub kind: WindowKind,
    pub var: ExpandedName,
    pub input: ExprId,
    pub start: WindowCondition,
    pub end: Option<WindowCondition>,
    /// Drop windows whose end condition never became true.
    pub only_end: bool,
    pub return_expr: ExprId,
    pub previous: Option<ExprId>,
}

#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Empty,
    NaN,
    Num(f64),
    Str(String),
    Bool(bool),
}

impl SortKey {
    fn new(value: Option<AtomicValue>, collation: &dyn Collation) -> Self {
        match value {
            None => SortKey::Empty,
            Some(AtomicValue::Boolean(b)) => SortKey::Bool(b),
            Some(
                AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s),
            ) => SortKey::Str(collation.key(&s)),
            Some(n) => match n.as_f64() {
                Some(v) if !v.is_nan() => SortKey::Num(v),
                _ => SortKey::NaN,
            },
        }
    }

    fn class(&self) -> Option<&'static str> {
        match self {
            SortKey::Empty => None,
            SortKey::NaN | SortKey::Num(_) => Some("numeric"),
            SortKey::Str(_) => Some("string"),
            SortKey::Bool(_) => Some("boolean"),
        }
    }

    /// Empty and NaN keys sort before all other values; with
    /// `empty greatest` the empty key moves behind them.
    fn compare(&self, other: &SortKey, empty: EmptyOrder) -> Ordering {
        let rank = |k: &SortKey| match (k, empty) {
            (SortKey::Empty, EmptyOrder::Least) => 0,
            (SortKey::Empty, EmptyOrder::Greatest) => 3,
            (SortKey::NaN, _) => 1,
            _ => 2,
        };
        match (self, other) {
            (SortKey::Num(a), SortKey::Num(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (SortKey::Str(a), SortKey::Str(b)) => a.cmp(b),
            (SortKey::Bool(a), SortKey::Bool(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

/// One buffered tuple of an order by clause.
#[derive(Debug, Clone)]
pub(crate) struct OrderTuple {
    keys: Vec<SortKey>,
    bindings: Vec<Sequence>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    Empty,
    Bool(bool),
    Num(u64),
    Str(String),
}

impl GroupKey {
    fn new(value: Option<&AtomicValue>, collation: &dyn Collation) -> Self {
        match value {
            None => GroupKey::Empty,
            Some(AtomicValue::Boolean(b)) => GroupKey::Bool(*b),
            Some(
                AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s),
            ) => GroupKey::Str(collation.key(s)),
            Some(n) => {
                let v = n.as_f64().unwrap_or(f64::NAN);
                let v = if v == 0.0 {
                    0.0
                } else if v.is_nan() {
                    f64::NAN
                } else {
                    v
                };
                GroupKey::Num(v.to_bits())
            }
        }
    }
}

/// One buffered tuple of a group by clause.
#[derive(Debug, Clone)]
pub(crate) struct GroupTuple {
    keys: Vec<GroupKey>,
    key_values: Vec<Option<AtomicValue>>,
    bindings: Vec<Sequence>,
}

fn binding_error(var: &ExpandedName, e: Error) -> Error {
    Error::dynamic(ErrorCode::XPTY0004, format!("wrong type for binding ${var}")).with_source(e)
}

impl Analyzer<'_> {
    pub(crate) fn analyze_for(
        &mut self,
        id: ExprId,
        c: &mut ForClause,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        if c.allowing_empty {
            self.require_v3("allowing empty")?;
        }
        self.enter_flwor(c.previous);
        let input = self.child(id, c.input, ctx)?;
        c.cacheable = !input.deps.intersects(Dependency::FOCUS | Dependency::LOCAL_VARS);
        let mark = self.scope_len();
        self.push_var(&c.var);
        if let Some(pos) = &c.position_var {
            self.push_var(pos);
        }
        let body = self.child(id, c.return_expr, ctx);
        self.truncate_scope(mark);
        self.leave_flwor(c.previous);
        let body = body?;
        if let Some(shape) = self.where_fast_track_shape(id, c) {
            if let ExprKind::Where(w) = self.kind_mut(c.return_expr) {
                w.fast_track = Some(shape);
            }
        }
        let mut card = input.cardinality.repeat(body.cardinality);
        if c.allowing_empty {
            card = card.join(body.cardinality);
        }
        Ok(Analysis::new(input.deps | body.deps, card, body.static_type))
    }

    /// Decides whether the where clause directly following this for clause
    /// may filter the whole input set at once.
    fn where_fast_track_shape(&self, for_id: ExprId, c: &ForClause) -> Option<FastTrackShape> {
        if !self.static_ctx.where_fast_track || c.position_var.is_some() || c.allowing_empty {
            return None;
        }
        let ExprKind::Where(w) = self.kind(c.return_expr) else {
            return None;
        };
        if w.previous != Some(for_id) {
            return None;
        }
        let cond = self.summary(w.condition);
        if cond.deps.intersects(Dependency::CONTEXT_ITEM | Dependency::CONTEXT_POSITION) {
            return None;
        }
        let is_var = |id: ExprId| {
            matches!(self.kind(id), ExprKind::VariableRef(v) if v.name == c.var)
        };
        let shape = match self.kind(w.condition) {
            ExprKind::Path(p)
                if cond.static_type.is_node() && p.steps.first().is_some_and(|&s| is_var(s)) =>
            {
                FastTrackShape::Path
            }
            ExprKind::Filter(f)
                if is_var(f.base) && self.summary(c.input).static_type.is_node() =>
            {
                let plain = f.predicates.iter().all(|&pred| match self.kind(pred) {
                    ExprKind::Predicate(p) => {
                        let inner = self.summary(p.expr);
                        !inner.deps.contains(Dependency::CONTEXT_POSITION)
                            && (inner.static_type.is_node()
                                || inner.static_type == ItemType::Boolean)
                    }
                    _ => false,
                });
                if !plain {
                    return None;
                }
                FastTrackShape::Filter
            }
            _ => return None,
        };
        let mut refs = VariableReferenceCollector::new();
        accept(&mut refs, self.arena(), w.condition);
        (refs.count(&c.var) == 1).then_some(shape)
    }

    pub(crate) fn analyze_let(
        &mut self,
        id: ExprId,
        c: &mut LetClause,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        self.enter_flwor(c.previous);
        let input = self.child(id, c.input, ctx)?;
        c.cacheable = !input.deps.intersects(Dependency::FOCUS | Dependency::LOCAL_VARS);
        let mark = self.scope_len();
        self.push_var(&c.var);
        let body = self.child(id, c.return_expr, ctx);
        self.truncate_scope(mark);
        self.leave_flwor(c.previous);
        let body = body?;
        Ok(Analysis::new(
            input.deps | body.deps,
            body.cardinality,
            body.static_type,
        ))
    }

    pub(crate) fn analyze_where(
        &mut self,
        id: ExprId,
        c: &mut WhereClause,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        self.enter_flwor(c.previous);
        let cond = self.child_with(
            c.condition,
            ctx.for_child(id)
                .with_flags(ContextFlags::IN_PREDICATE | ContextFlags::IN_WHERE_CLAUSE)
                .with_context_id(ContextId::Scope(id)),
        );
        let body = cond.and_then(|cond| Ok((cond, self.child(id, c.return_expr, ctx)?)));
        self.leave_flwor(c.previous);
        let (cond, body) = body?;
        c.fast_track = None;
        Ok(Analysis::new(
            cond.deps | body.deps,
            body.cardinality.or_empty(),
            body.static_type,
        ))
    }

    pub(crate) fn analyze_order_by(
        &mut self,
        id: ExprId,
        c: &mut OrderByClause,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        self.enter_flwor(c.previous);
        let result = self.analyze_order_by_inner(id, c, ctx);
        self.leave_flwor(c.previous);
        result
    }

    fn analyze_order_by_inner(
        &mut self,
        id: ExprId,
        c: &mut OrderByClause,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        let mut deps = Dependency::NONE;
        for spec in &c.specs {
            deps |= self.child(id, spec.key, ctx)?.deps;
        }
        c.rebind = self.flwor_variables();
        let body = self.child(id, c.return_expr, ctx)?;
        Ok(Analysis::new(
            deps | body.deps,
            Cardinality::ZeroOrMore,
            body.static_type,
        ))
    }

    pub(crate) fn analyze_group_by(
        &mut self,
        id: ExprId,
        c: &mut GroupByClause,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        self.require_v3("group by")?;
        self.enter_flwor(c.previous);
        let mark = self.scope_len();
        let result = self.analyze_group_by_inner(id, c, ctx);
        self.truncate_scope(mark);
        self.leave_flwor(c.previous);
        result
    }

    fn analyze_group_by_inner(
        &mut self,
        id: ExprId,
        c: &mut GroupByClause,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        let mut deps = Dependency::NONE;
        for spec in &c.specs {
            match spec.key {
                Some(key) => deps |= self.child(id, key, ctx)?.deps,
                None if self.is_local(&spec.var) => {}
                None => {
                    return Err(Error::static_error(
                        ErrorCode::XQST0094,
                        format!("grouping variable ${} is not in scope", spec.var),
                    ));
                }
            }
        }
        c.rebind = self
            .flwor_variables()
            .into_iter()
            .filter(|v| !c.specs.iter().any(|s| &s.var == v))
            .collect();
        for spec in &c.specs {
            self.push_var(&spec.var);
        }
        let body = self.child(id, c.return_expr, ctx)?;
        Ok(Analysis::new(
            deps | body.deps,
            Cardinality::ZeroOrMore,
            body.static_type,
        ))
    }

    pub(crate) fn analyze_count(
        &mut self,
        id: ExprId,
        c: &mut CountClause,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        self.require_v3("count")?;
        self.enter_flwor(c.previous);
        let mark = self.scope_len();
        self.push_var(&c.var);
        let body = self.child(id, c.return_expr, ctx);
        self.truncate_scope(mark);
        self.leave_flwor(c.previous);
        let body = body?;
        Ok(Analysis::new(body.deps, body.cardinality, body.static_type))
    }

    pub(crate) fn analyze_window(
        &mut self,
        id: ExprId,
        c: &mut WindowClause,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        self.require_v3("window")?;
        if c.kind == WindowKind::Sliding && c.end.is_none() {
            return Err(Error::static_error(
                ErrorCode::XPST0003,
                "a sliding window requires an end condition",
            ));
        }
        self.enter_flwor(c.previous);
        let mark = self.scope_len();
        let result = self.analyze_window_inner(id, c, ctx);
        self.truncate_scope(mark);
        self.leave_flwor(c.previous);
        result
    }

    fn analyze_window_inner(
        &mut self,
        id: ExprId,
        c: &mut WindowClause,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        let input = self.child(id, c.input, ctx)?;
        let start_vars: Vec<ExpandedName> = c.start.vars.names().cloned().collect();
        for v in &start_vars {
            self.push_var(v);
        }
        let mut deps = input.deps | self.child(id, c.start.when, ctx)?.deps;
        if let Some(end) = &c.end {
            let end_vars: Vec<ExpandedName> = end.vars.names().cloned().collect();
            for v in &end_vars {
                self.push_var(v);
            }
            deps |= self.child(id, end.when, ctx)?.deps;
        }
        self.push_var(&c.var);
        let body = self.child(id, c.return_expr, ctx)?;
        Ok(Analysis::new(
            deps | body.deps,
            Cardinality::ZeroOrMore,
            body.static_type,
        ))
    }
}

impl Evaluator<'_> {
    /// Evaluates a clause. The first clause of a chain additionally opens
    /// the chain's buffers and runs the post-evaluation pass.
    pub(crate) fn eval_clause(
        &mut self,
        node: &ExprNode,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        if node.kind.previous_clause().is_some() {
            return self.eval_clause_body(node, ctx, item);
        }
        let marks = self.open_frames(node.id);
        let result = self
            .eval_clause_body(node, ctx, item)
            .and_then(|r| self.post_eval(node.id, r, ctx, item));
        self.state.close_frames(&marks);
        result
    }

    /// The clause following `id` in its chain, if any.
    fn next_clause(&self, id: ExprId) -> Option<ExprId> {
        let query = self.query;
        let next = query.node(id)?.kind.return_expr()?;
        let next_kind = &query.node(next)?.kind;
        (next_kind.is_clause() && next_kind.previous_clause() == Some(id)).then_some(next)
    }

    fn open_frames(&mut self, first: ExprId) -> Vec<FrameMark> {
        let query = self.query;
        let mut marks = Vec::new();
        let mut current = Some(first);
        while let Some(id) = current {
            match query.node(id).map(|n| &n.kind) {
                Some(ExprKind::OrderBy(_)) => marks.push(self.state.open_order_frame(id)),
                Some(ExprKind::GroupBy(_)) => marks.push(self.state.open_group_frame(id)),
                Some(ExprKind::Count(_)) => marks.push(self.state.open_counter_frame(id)),
                _ => {}
            }
            current = self.next_clause(id);
        }
        marks
    }

    fn post_eval(
        &mut self,
        id: ExprId,
        seq: Sequence,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let query = self.query;
        let seq = match query.node(id).map(|n| &n.kind) {
            Some(ExprKind::OrderBy(c)) => self.order_by_post(id, c, ctx, item)?,
            Some(ExprKind::GroupBy(c)) => self.group_by_post(id, c, ctx, item)?,
            _ => seq,
        };
        match self.next_clause(id) {
            Some(next) => self.post_eval(next, seq, ctx, item),
            None => Ok(seq),
        }
    }

    fn eval_clause_body(
        &mut self,
        node: &ExprNode,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        match &node.kind {
            ExprKind::For(c) => self.eval_for(node.id, c, ctx, item),
            ExprKind::Let(c) => self.eval_let(node.id, c, ctx, item),
            ExprKind::Where(c) => self.eval_where(node.id, c, ctx, item),
            ExprKind::OrderBy(c) => self.eval_order_by(node.id, c, ctx, item),
            ExprKind::GroupBy(c) => self.eval_group_by(node.id, c, ctx, item),
            ExprKind::Count(c) => self.eval_count(node.id, c, ctx, item),
            ExprKind::Window(c) => self.eval_window(c, ctx, item),
            other => Err(Error::internal(format!("{} is not a clause", other.name()))),
        }
    }

    /// Value of a for/let input, served from the cache when the input is
    /// constant and its documents were not replaced.
    fn clause_input(
        &mut self,
        id: ExprId,
        input: ExprId,
        cacheable: bool,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        if cacheable && let Some(v) = self.state.cached(id) {
            return Ok(v.clone());
        }
        let value = self.eval(input, ctx, item)?;
        if cacheable && let Sequence::Nodes(set) = &value {
            let valid = Arc::new(AtomicBool::new(true));
            let docs = set.documents().iter().map(|d| d.id()).collect();
            let listener = self
                .dynamic
                .store
                .subscribe(Arc::new(InvalidateOnUpdate::new(docs, valid.clone())));
            let binding = CachedBinding {
                value: value.clone(),
                valid,
                listener,
            };
            if let Some(old) = self.state.set_cached(id, binding) {
                self.dynamic.store.unsubscribe(old);
            }
            self.note(id, "cached constant binding");
        }
        Ok(value)
    }

    fn eval_for(
        &mut self,
        id: ExprId,
        c: &ForClause,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let mut input = self.clause_input(id, c.input, c.cacheable, ctx, item)?;
        let query = self.query;
        let Some(ExprKind::Where(w)) = query.node(c.return_expr).map(|n| &n.kind) else {
            return self.for_loop(c, &input, ctx, item);
        };
        let Some(shape) = w.fast_track else {
            return self.for_loop(c, &input, ctx, item);
        };
        // every activation gets its own frame so a recursive call never sees
        // the flag of an outer one
        let filtered = if input.is_persistent_set() {
            self.where_pre_eval(c.return_expr, w, shape, &c.var, &input, ctx, item)?
        } else {
            None
        };
        let active = filtered.is_some();
        if let Some(filtered) = filtered {
            input = filtered;
        }
        self.state.push_fast_track(c.return_expr, active);
        let result = self.for_loop(c, &input, ctx, item);
        self.state.pop_fast_track(c.return_expr);
        result
    }

    fn for_loop(
        &mut self,
        c: &ForClause,
        input: &Sequence,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let mark = self.state.locals_len();
        if input.is_empty() {
            if !c.allowing_empty {
                return Ok(Sequence::empty());
            }
            self.state.push_local(c.var.clone(), Sequence::empty());
            if let Some(pos) = &c.position_var {
                self.state.push_local(pos.clone(), Sequence::integer(0));
            }
            let r = self.eval(c.return_expr, ctx, item);
            self.state.truncate_locals(mark);
            return r;
        }
        let mut out = Sequence::empty();
        for (i, it) in input.iter().enumerate() {
            let value = Sequence::from_item(it);
            if let Some(t) = &c.seq_type {
                t.check(&value).map_err(|e| binding_error(&c.var, e))?;
            }
            self.state.push_local(c.var.clone(), value);
            if let Some(pos) = &c.position_var {
                let n = i64::try_from(i + 1).unwrap_or(i64::MAX);
                self.state.push_local(pos.clone(), Sequence::integer(n));
            }
            let r = self.eval(c.return_expr, ctx, item);
            self.state.truncate_locals(mark);
            out = out.concat(r?);
        }
        Ok(out)
    }

    /// Evaluates the where condition once with the for variable bound to the
    /// whole input and returns the bindings that satisfy it. Each binding is
    /// linked to itself under the where clause's id so hits reached through
    /// a path can be traced back. `None` if the condition did not produce
    /// nodes.
    #[allow(clippy::too_many_arguments)]
    fn where_pre_eval(
        &mut self,
        where_id: ExprId,
        w: &WhereClause,
        shape: FastTrackShape,
        var: &ExpandedName,
        input: &Sequence,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Option<Sequence>, Error> {
        let set = input.to_node_set()?;
        let linked = NodeSet::from_nodes(set.iter().map(|n| {
            let mut l = n.clone();
            l.add_context_node(where_id, n);
            l
        }));
        let mark = self.state.locals_len();
        self.state.push_local(var.clone(), Sequence::Nodes(linked));
        let hits = self.eval(w.condition, ctx, item);
        self.state.truncate_locals(mark);
        let hits = hits?;
        if !hits.is_all_nodes() {
            return Ok(None);
        }
        let hits = hits.to_node_set()?;
        let keep: NodeSet = match shape {
            FastTrackShape::Path => hits
                .iter()
                .flat_map(|n| n.context().origins(where_id).cloned())
                .collect(),
            FastTrackShape::Filter => hits,
        };
        self.note(where_id, "where clause fast track: condition evaluated once");
        let kept: Vec<NodeProxy> = set
            .into_vec()
            .into_iter()
            .filter(|n| keep.contains_node(n))
            .collect();
        Ok(Some(Sequence::from_nodes(kept)))
    }

    fn eval_let(
        &mut self,
        id: ExprId,
        c: &LetClause,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let value = self.clause_input(id, c.input, c.cacheable, ctx, item)?;
        if let Some(t) = &c.seq_type {
            t.check(&value).map_err(|e| binding_error(&c.var, e))?;
        }
        let mark = self.state.locals_len();
        self.state.push_local(c.var.clone(), value);
        let r = self.eval(c.return_expr, ctx, item);
        self.state.truncate_locals(mark);
        r
    }

    fn eval_where(
        &mut self,
        id: ExprId,
        c: &WhereClause,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        if !self.state.fast_track(id)
            && !self.eval(c.condition, ctx, item)?.effective_boolean_value()?
        {
            return Ok(Sequence::empty());
        }
        self.eval(c.return_expr, ctx, item)
    }

    fn current_bindings(&self, names: &[ExpandedName]) -> Vec<Sequence> {
        names
            .iter()
            .map(|n| self.state.lookup_local(n).cloned().unwrap_or_default())
            .collect()
    }

    fn rebind_and_eval(
        &mut self,
        names: impl IntoIterator<Item = (ExpandedName, Sequence)>,
        body: ExprId,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let mark = self.state.locals_len();
        for (name, value) in names {
            self.state.push_local(name, value);
        }
        let r = self.eval(body, ctx, item);
        self.state.truncate_locals(mark);
        r
    }

    fn eval_order_by(
        &mut self,
        id: ExprId,
        c: &OrderByClause,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let mut keys = Vec::with_capacity(c.specs.len());
        for spec in &c.specs {
            let value = self.eval(spec.key, ctx, item)?.zero_or_one_atomic("order by key")?;
            let collation = self.collation(spec.collation.as_deref())?;
            keys.push(SortKey::new(value, &*collation));
        }
        let tuple = OrderTuple {
            keys,
            bindings: self.current_bindings(&c.rebind),
        };
        let Some(buffer) = self.state.order_buffer(id) else {
            return Err(Error::internal(format!("order by {id} has no open frame")));
        };
        buffer.push(tuple);
        Ok(Sequence::empty())
    }

    fn order_by_post(
        &mut self,
        id: ExprId,
        c: &OrderByClause,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let Some(buffer) = self.state.order_buffer(id) else {
            return Err(Error::internal(format!("order by {id} has no open frame")));
        };
        for k in 0..c.specs.len() {
            let mut class = None;
            for t in buffer.iter() {
                let Some(this) = t.keys.get(k).and_then(SortKey::class) else {
                    continue;
                };
                match class {
                    None => class = Some(this),
                    Some(seen) if seen != this => {
                        return Err(Error::dynamic(
                            ErrorCode::XPTY0004,
                            format!(
                                "order by key {} mixes {seen} and {this} values",
                                k + 1
                            ),
                        ));
                    }
                    Some(_) => {}
                }
            }
        }
        buffer.sort_by(|a, b| {
            for (k, spec) in c.specs.iter().enumerate() {
                let (Some(x), Some(y)) = (a.keys.get(k), b.keys.get(k)) else {
                    continue;
                };
                let mut ord = x.compare(y, spec.empty);
                if spec.descending {
                    ord = ord.reverse();
                }
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        let tuples = buffer.clone();
        tracing::trace!(expr = %id, tuples = tuples.len(), "order by sorted");
        let mut out = Sequence::empty();
        for t in tuples {
            let bound = c.rebind.iter().cloned().zip(t.bindings);
            let r = self.rebind_and_eval(bound, c.return_expr, ctx, item)?;
            out = out.concat(r);
        }
        Ok(out)
    }

    fn eval_group_by(
        &mut self,
        id: ExprId,
        c: &GroupByClause,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let mut keys = Vec::with_capacity(c.specs.len());
        let mut key_values = Vec::with_capacity(c.specs.len());
        for spec in &c.specs {
            let value = match spec.key {
                Some(key) => self.eval(key, ctx, item)?,
                None => self
                    .state
                    .lookup_local(&spec.var)
                    .cloned()
                    .unwrap_or_default(),
            };
            let value = value.zero_or_one_atomic("grouping key")?;
            let collation = self.collation(spec.collation.as_deref())?;
            keys.push(GroupKey::new(value.as_ref(), &*collation));
            key_values.push(value);
        }
        let tuple = GroupTuple {
            keys,
            key_values,
            bindings: self.current_bindings(&c.rebind),
        };
        let Some(buffer) = self.state.group_buffer(id) else {
            return Err(Error::internal(format!("group by {id} has no open frame")));
        };
        buffer.push(tuple);
        Ok(Sequence::empty())
    }

    fn group_by_post(
        &mut self,
        id: ExprId,
        c: &GroupByClause,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let Some(buffer) = self.state.group_buffer(id) else {
            return Err(Error::internal(format!("group by {id} has no open frame")));
        };
        let tuples = std::mem::take(buffer);
        let mut index: HashMap<Vec<GroupKey>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<Option<AtomicValue>>, Vec<Sequence>)> = Vec::new();
        for t in tuples {
            match index.get(&t.keys) {
                Some(&g) => {
                    let members = &mut groups[g].1;
                    for (acc, value) in members.iter_mut().zip(t.bindings) {
                        *acc = std::mem::take(acc).concat(value);
                    }
                }
                None => {
                    index.insert(t.keys, groups.len());
                    groups.push((t.key_values, t.bindings));
                }
            }
        }
        tracing::trace!(expr = %id, groups = groups.len(), "group by formed groups");
        let mut out = Sequence::empty();
        for (key_values, members) in groups {
            let grouping = c.specs.iter().zip(key_values).map(|(spec, v)| {
                (
                    spec.var.clone(),
                    v.map(Sequence::from_item).unwrap_or_default(),
                )
            });
            let bound: Vec<(ExpandedName, Sequence)> = c
                .rebind
                .iter()
                .cloned()
                .zip(members)
                .chain(grouping)
                .collect();
            let r = self.rebind_and_eval(bound, c.return_expr, ctx, item)?;
            out = out.concat(r);
        }
        Ok(out)
    }

    fn eval_count(
        &mut self,
        id: ExprId,
        c: &CountClause,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let Some(n) = self.state.next_count(id) else {
            return Err(Error::internal(format!("count {id} has no open frame")));
        };
        self.rebind_and_eval(
            [(c.var.clone(), Sequence::integer(n))],
            c.return_expr,
            ctx,
            item,
        )
    }

    fn push_window_vars(&mut self, vars: &WindowVars, items: &[Item], i: usize) {
        let at = |j: Option<usize>| {
            j.and_then(|j| items.get(j))
                .cloned()
                .map(Sequence::from_item)
                .unwrap_or_default()
        };
        if let Some(v) = &vars.current {
            self.state.push_local(v.clone(), at(Some(i)));
        }
        if let Some(v) = &vars.position {
            let n = i64::try_from(i + 1).unwrap_or(i64::MAX);
            self.state.push_local(v.clone(), Sequence::integer(n));
        }
        if let Some(v) = &vars.previous {
            self.state.push_local(v.clone(), at(i.checked_sub(1)));
        }
        if let Some(v) = &vars.next {
            self.state.push_local(v.clone(), at(Some(i + 1)));
        }
    }

    fn window_start(
        &mut self,
        c: &WindowClause,
        items: &[Item],
        i: usize,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<bool, Error> {
        let mark = self.state.locals_len();
        self.push_window_vars(&c.start.vars, items, i);
        let r = self.eval(c.start.when, ctx, item);
        self.state.truncate_locals(mark);
        r?.effective_boolean_value()
    }

    /// First position at or after `start` where the end condition holds.
    fn window_end(
        &mut self,
        c: &WindowClause,
        end: &WindowCondition,
        items: &[Item],
        start: usize,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Option<usize>, Error> {
        for j in start..items.len() {
            let mark = self.state.locals_len();
            self.push_window_vars(&c.start.vars, items, start);
            self.push_window_vars(&end.vars, items, j);
            let r = self.eval(end.when, ctx, item);
            self.state.truncate_locals(mark);
            if r?.effective_boolean_value()? {
                return Ok(Some(j));
            }
        }
        Ok(None)
    }

    fn eval_window(
        &mut self,
        c: &WindowClause,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let items = self.eval(c.input, ctx, item)?.into_items();
        let n = items.len();
        let mut windows: Vec<(usize, usize)> = Vec::new();
        let mut i = 0;
        while i < n {
            if !self.window_start(c, &items, i, ctx, item)? {
                i += 1;
                continue;
            }
            let end = match &c.end {
                Some(end) => match self.window_end(c, end, &items, i, ctx, item)? {
                    Some(j) => Some(j),
                    None if c.only_end => None,
                    None => Some(n - 1),
                },
                None => {
                    let mut j = i + 1;
                    while j < n && !self.window_start(c, &items, j, ctx, item)? {
                        j += 1;
                    }
                    Some(j - 1)
                }
            };
            match (c.kind, end) {
                (WindowKind::Tumbling, Some(j)) => {
                    windows.push((i, j));
                    i = j + 1;
                }
                (WindowKind::Tumbling, None) => break,
                (WindowKind::Sliding, end) => {
                    windows.extend(end.map(|j| (i, j)));
                    i += 1;
                }
            }
        }
        let mut out = Sequence::empty();
        for (s, e) in windows {
            let mark = self.state.locals_len();
            self.state
                .push_local(c.var.clone(), Sequence::from_items(items[s..=e].to_vec()));
            self.push_window_vars(&c.start.vars, &items, s);
            if let Some(end) = &c.end {
                self.push_window_vars(&end.vars, &items, e);
            }
            let r = self.eval(c.return_expr, ctx, item);
            self.state.truncate_locals(mark);
            out = out.concat(r?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collation::{CodepointCollation, SimpleCaseCollation};
    use rstest::rstest;

    #[rstest]
    #[case(SortKey::Empty, SortKey::NaN, EmptyOrder::Least, Ordering::Less)]
    #[case(SortKey::Empty, SortKey::NaN, EmptyOrder::Greatest, Ordering::Greater)]
    #[case(SortKey::NaN, SortKey::Num(-1.0), EmptyOrder::Greatest, Ordering::Less)]
    #[case(SortKey::Num(2.0), SortKey::Num(10.0), EmptyOrder::Least, Ordering::Less)]
    #[case(SortKey::Empty, SortKey::Str("a".into()), EmptyOrder::Greatest, Ordering::Greater)]
    fn sort_key_order(
        #[case] a: SortKey,
        #[case] b: SortKey,
        #[case] empty: EmptyOrder,
        #[case] expected: Ordering,
    ) {
        assert_eq!(a.compare(&b, empty), expected);
    }

    #[test]
    fn group_keys_normalize_numbers_and_collations() {
        let cp = CodepointCollation;
        assert_eq!(
            GroupKey::new(Some(&AtomicValue::Integer(1)), &cp),
            GroupKey::new(Some(&AtomicValue::Double(1.0)), &cp)
        );
        assert_eq!(
            GroupKey::new(Some(&AtomicValue::Double(-0.0)), &cp),
            GroupKey::new(Some(&AtomicValue::Integer(0)), &cp)
        );
        assert_ne!(
            GroupKey::new(Some(&AtomicValue::from("A")), &cp),
            GroupKey::new(Some(&AtomicValue::from("a")), &cp)
        );
        let ci = SimpleCaseCollation;
        assert_eq!(
            GroupKey::new(Some(&AtomicValue::from("A")), &ci),
            GroupKey::new(Some(&AtomicValue::from("a")), &ci)
        );
    }
}
