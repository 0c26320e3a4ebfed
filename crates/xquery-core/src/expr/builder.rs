//! Programmatic construction of expression trees.
//!
//! A front end (parser, test, embedding application) builds nodes bottom-up
//! with already resolved children; ids are handed out in allocation order.
//! No semantic checks happen here, [`crate::Query::analyze`] does them.
use crate::error::Location;
use crate::expr::{
    ArithOp, Arithmetic, Axis, CommentConstructor, Comparison, Conditional, CountClause,
    DynamicCall, EmptyOrder, ExprArena, ExprId, ExprKind, FilterExpr, ForClause, FunctionId,
    GroupByClause, GroupSpec, InlineFunction, InstanceOf, LetClause, Literal, LocationStep,
    LogicalExpr, LogicalOp, NamedFunctionRef, NodeTest, OrderByClause, OrderSpec, Param,
    PathExpr, Predicate, RangeExpr, SequenceExpr, SetExpr, SetOp, StaticCall, TreatAs,
    UserFunction, VariableRef, WhereClause, WindowClause, WindowCondition, WindowKind,
    WindowVars,
};
use crate::query::Query;
use crate::types::SequenceType;
use crate::value::{ComparisonOp, ExpandedName, Item, Sequence};

#[derive(Debug, Default)]
pub struct QueryBuilder {
    arena: ExprArena,
    functions: Vec<UserFunction>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: ExprKind) -> ExprId {
        self.arena.alloc(kind)
    }

    pub fn set_location(&mut self, id: ExprId, line: u32, column: u32) {
        self.arena.node_mut(id).location = Some(Location::new(line, column));
    }

    pub fn literal(&mut self, value: impl Into<Item>) -> ExprId {
        self.literal_sequence(Sequence::from_item(value))
    }

    pub fn literal_sequence(&mut self, value: Sequence) -> ExprId {
        self.add(ExprKind::Literal(Literal { value }))
    }

    /// `()`
    pub fn empty(&mut self) -> ExprId {
        self.literal_sequence(Sequence::empty())
    }

    pub fn sequence(&mut self, items: Vec<ExprId>) -> ExprId {
        self.add(ExprKind::Sequence(SequenceExpr { items }))
    }

    pub fn integers(&mut self, values: &[i64]) -> ExprId {
        self.literal_sequence(Sequence::from_items(
            values.iter().map(|v| Item::from(*v)).collect(),
        ))
    }

    pub fn context_item(&mut self) -> ExprId {
        self.add(ExprKind::ContextItem)
    }

    pub fn root(&mut self) -> ExprId {
        self.add(ExprKind::Root)
    }

    pub fn var(&mut self, name: &str) -> ExprId {
        self.add(ExprKind::VariableRef(VariableRef {
            name: ExpandedName::parse(name),
            local: false,
        }))
    }

    pub fn path(&mut self, steps: Vec<ExprId>) -> ExprId {
        self.add(ExprKind::Path(PathExpr { steps }))
    }

    pub fn step(&mut self, axis: Axis, test: NodeTest) -> ExprId {
        self.step_with(axis, test, Vec::new())
    }

    pub fn step_with(&mut self, axis: Axis, test: NodeTest, predicates: Vec<ExprId>) -> ExprId {
        let mut step = LocationStep::new(axis, test);
        step.predicates = predicates;
        self.add(ExprKind::Step(step))
    }

    /// `child::name`
    pub fn child(&mut self, name: &str) -> ExprId {
        self.step(Axis::Child, NodeTest::Name(name.to_string()))
    }

    /// `descendant::name`
    pub fn descendant(&mut self, name: &str) -> ExprId {
        self.step(Axis::Descendant, NodeTest::Name(name.to_string()))
    }

    /// `attribute::name`
    pub fn attribute(&mut self, name: &str) -> ExprId {
        self.step(Axis::Attribute, NodeTest::Name(name.to_string()))
    }

    pub fn predicate(&mut self, expr: ExprId) -> ExprId {
        self.add(ExprKind::Predicate(Predicate {
            expr,
            mode: Default::default(),
        }))
    }

    pub fn filter(&mut self, base: ExprId, predicates: Vec<ExprId>) -> ExprId {
        self.add(ExprKind::Filter(FilterExpr { base, predicates }))
    }

    /// General comparison (`=`, `<`, ...).
    pub fn general_comparison(&mut self, op: ComparisonOp, left: ExprId, right: ExprId) -> ExprId {
        self.comparison(op, true, left, right, None)
    }

    /// Value comparison (`eq`, `lt`, ...).
    pub fn value_comparison(&mut self, op: ComparisonOp, left: ExprId, right: ExprId) -> ExprId {
        self.comparison(op, false, left, right, None)
    }

    pub fn comparison(
        &mut self,
        op: ComparisonOp,
        general: bool,
        left: ExprId,
        right: ExprId,
        collation: Option<&str>,
    ) -> ExprId {
        self.add(ExprKind::Comparison(Comparison {
            op,
            general,
            left,
            right,
            collation: collation.map(str::to_string),
        }))
    }

    pub fn arithmetic(&mut self, op: ArithOp, left: ExprId, right: ExprId) -> ExprId {
        self.add(ExprKind::Arithmetic(Arithmetic { op, left, right }))
    }

    pub fn range(&mut self, from: ExprId, to: ExprId) -> ExprId {
        self.add(ExprKind::Range(RangeExpr { from, to }))
    }

    pub fn if_then_else(
        &mut self,
        test: ExprId,
        then_branch: ExprId,
        else_branch: ExprId,
    ) -> ExprId {
        self.add(ExprKind::If(Conditional {
            test,
            then_branch,
            else_branch,
        }))
    }

    pub fn instance_of(&mut self, expr: ExprId, seq_type: SequenceType) -> ExprId {
        self.add(ExprKind::InstanceOf(InstanceOf { expr, seq_type }))
    }

    pub fn treat_as(&mut self, expr: ExprId, seq_type: SequenceType) -> ExprId {
        self.add(ExprKind::TreatAs(TreatAs { expr, seq_type }))
    }

    pub fn comment(&mut self, content: ExprId) -> ExprId {
        self.add(ExprKind::Comment(CommentConstructor { content }))
    }

    pub fn set_op(&mut self, op: SetOp, left: ExprId, right: ExprId) -> ExprId {
        self.add(ExprKind::Set(SetExpr { op, left, right }))
    }

    pub fn union(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.set_op(SetOp::Union, left, right)
    }

    pub fn intersect(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.set_op(SetOp::Intersect, left, right)
    }

    pub fn except(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.set_op(SetOp::Except, left, right)
    }

    pub fn logical(&mut self, op: LogicalOp, left: ExprId, right: ExprId) -> ExprId {
        self.add(ExprKind::Logical(LogicalExpr {
            op,
            left,
            right,
            use_set_algebra: false,
        }))
    }

    pub fn and(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.logical(LogicalOp::And, left, right)
    }

    pub fn or(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.logical(LogicalOp::Or, left, right)
    }

    pub fn call(&mut self, name: &str, args: Vec<ExprId>) -> ExprId {
        self.add(ExprKind::StaticCall(StaticCall {
            name: ExpandedName::parse(name),
            args,
            target: None,
        }))
    }

    pub fn dynamic_call(&mut self, callee: ExprId, args: Vec<Option<ExprId>>) -> ExprId {
        self.add(ExprKind::DynamicCall(DynamicCall { callee, args }))
    }

    pub fn function_ref(&mut self, name: &str, arity: usize) -> ExprId {
        self.add(ExprKind::FunctionRef(NamedFunctionRef {
            name: ExpandedName::parse(name),
            arity,
            target: None,
        }))
    }

    /// `name(a, ?, c)`: a call with at least one placeholder, built as a
    /// dynamic call on `name#arity`.
    pub fn partial_call(&mut self, name: &str, args: Vec<Option<ExprId>>) -> ExprId {
        let callee = self.function_ref(name, args.len());
        self.dynamic_call(callee, args)
    }

    /// Declares a named function. Its body may call it recursively.
    pub fn declare_function(
        &mut self,
        name: &str,
        params: Vec<Param>,
        return_type: Option<SequenceType>,
        body: ExprId,
    ) -> FunctionId {
        self.register(UserFunction {
            name: Some(ExpandedName::parse(name)),
            params,
            return_type,
            body,
            inline: false,
            location: None,
        })
    }

    pub fn inline_function(
        &mut self,
        params: Vec<Param>,
        return_type: Option<SequenceType>,
        body: ExprId,
    ) -> ExprId {
        let function = self.register(UserFunction {
            name: None,
            params,
            return_type,
            body,
            inline: true,
            location: None,
        });
        self.add(ExprKind::InlineFunction(InlineFunction { function, body }))
    }

    fn register(&mut self, f: UserFunction) -> FunctionId {
        let raw = u32::try_from(self.functions.len()).unwrap_or(u32::MAX);
        self.functions.push(f);
        FunctionId::new(raw)
    }

    /// Allocates the clauses of `flwor` as consecutive nodes, each returning
    /// into the next and the last into `return_expr`. Returns the first
    /// clause, which stands for the whole FLWOR expression.
    pub fn flwor(&mut self, flwor: FlworBuilder, return_expr: ExprId) -> ExprId {
        let first = u32::try_from(self.arena.len()).unwrap_or(u32::MAX);
        let count = flwor.clauses.len();
        if count == 0 {
            return return_expr;
        }
        for (i, mut kind) in flwor.clauses.into_iter().enumerate() {
            let offset = u32::try_from(i).unwrap_or(u32::MAX);
            let previous = (i > 0).then(|| ExprId::new(first + offset - 1));
            let next = if i + 1 == count {
                return_expr
            } else {
                ExprId::new(first + offset + 1)
            };
            link_clause(&mut kind, previous, next);
            self.add(kind);
        }
        ExprId::new(first)
    }

    pub fn finish(self, root: ExprId) -> Query {
        Query::new(self.arena, self.functions, root)
    }
}

fn link_clause(kind: &mut ExprKind, prev: Option<ExprId>, next: ExprId) {
    match kind {
        ExprKind::For(c) => (c.previous, c.return_expr) = (prev, next),
        ExprKind::Let(c) => (c.previous, c.return_expr) = (prev, next),
        ExprKind::Where(c) => (c.previous, c.return_expr) = (prev, next),
        ExprKind::OrderBy(c) => (c.previous, c.return_expr) = (prev, next),
        ExprKind::GroupBy(c) => (c.previous, c.return_expr) = (prev, next),
        ExprKind::Count(c) => (c.previous, c.return_expr) = (prev, next),
        ExprKind::Window(c) => (c.previous, c.return_expr) = (prev, next),
        _ => {}
    }
}

/// Collects the clauses of one FLWOR expression. Clause inputs and
/// conditions are built beforehand with the [`QueryBuilder`]; the clause
/// nodes themselves are allocated by [`QueryBuilder::flwor`].
#[derive(Debug, Default)]
pub struct FlworBuilder {
    clauses: Vec<ExprKind>,
}

const UNLINKED: ExprId = ExprId::new(u32::MAX);

impl FlworBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, kind: ExprKind) -> Self {
        self.clauses.push(kind);
        self
    }

    /// `for $var in input`
    pub fn for_var(self, var: &str, input: ExprId) -> Self {
        self.for_clause(var, None, None, false, input)
    }

    /// `for $var at $pos in input`
    pub fn for_at(self, var: &str, pos: &str, input: ExprId) -> Self {
        self.for_clause(var, Some(pos), None, false, input)
    }

    pub fn for_clause(
        self,
        var: &str,
        pos: Option<&str>,
        seq_type: Option<SequenceType>,
        allowing_empty: bool,
        input: ExprId,
    ) -> Self {
        self.push(ExprKind::For(ForClause {
            var: ExpandedName::parse(var),
            position_var: pos.map(ExpandedName::parse),
            allowing_empty,
            seq_type,
            input,
            return_expr: UNLINKED,
            previous: None,
            cacheable: false,
        }))
    }

    /// `let $var := input`
    pub fn let_var(self, var: &str, input: ExprId) -> Self {
        self.let_typed(var, None, input)
    }

    pub fn let_typed(self, var: &str, seq_type: Option<SequenceType>, input: ExprId) -> Self {
        self.push(ExprKind::Let(LetClause {
            var: ExpandedName::parse(var),
            seq_type,
            input,
            return_expr: UNLINKED,
            previous: None,
            cacheable: false,
        }))
    }

    pub fn where_cond(self, condition: ExprId) -> Self {
        self.push(ExprKind::Where(WhereClause {
            condition,
            return_expr: UNLINKED,
            previous: None,
            fast_track: None,
        }))
    }

    pub fn order_by(self, specs: Vec<OrderSpec>) -> Self {
        self.push(ExprKind::OrderBy(OrderByClause {
            specs,
            return_expr: UNLINKED,
            previous: None,
            rebind: Vec::new(),
        }))
    }

    pub fn group_by(self, specs: Vec<GroupSpec>) -> Self {
        self.push(ExprKind::GroupBy(GroupByClause {
            specs,
            return_expr: UNLINKED,
            previous: None,
            rebind: Vec::new(),
        }))
    }

    pub fn count(self, var: &str) -> Self {
        self.push(ExprKind::Count(CountClause {
            var: ExpandedName::parse(var),
            return_expr: UNLINKED,
            previous: None,
        }))
    }

    pub fn window(
        self,
        kind: WindowKind,
        var: &str,
        input: ExprId,
        start: WindowCondition,
        end: Option<WindowCondition>,
        only_end: bool,
    ) -> Self {
        self.push(ExprKind::Window(WindowClause {
            kind,
            var: ExpandedName::parse(var),
            input,
            start,
            end,
            only_end,
            return_expr: UNLINKED,
            previous: None,
        }))
    }
}

impl OrderSpec {
    pub fn ascending(key: ExprId) -> Self {
        Self {
            key,
            descending: false,
            empty: EmptyOrder::Least,
            collation: None,
        }
    }

    pub fn descending(key: ExprId) -> Self {
        Self {
            descending: true,
            ..Self::ascending(key)
        }
    }

    pub fn empty_greatest(mut self) -> Self {
        self.empty = EmptyOrder::Greatest;
        self
    }

    pub fn with_collation(mut self, uri: &str) -> Self {
        self.collation = Some(uri.to_string());
        self
    }
}

impl GroupSpec {
    /// `group by $var`
    pub fn var(var: &str) -> Self {
        Self {
            var: ExpandedName::parse(var),
            key: None,
            collation: None,
        }
    }

    /// `group by $var := key`
    pub fn key(var: &str, key: ExprId) -> Self {
        Self {
            key: Some(key),
            ..Self::var(var)
        }
    }

    pub fn with_collation(mut self, uri: &str) -> Self {
        self.collation = Some(uri.to_string());
        self
    }
}

impl WindowCondition {
    pub fn new(when: ExprId) -> Self {
        Self {
            vars: WindowVars::default(),
            when,
        }
    }

    pub fn current(mut self, name: &str) -> Self {
        self.vars.current = Some(ExpandedName::parse(name));
        self
    }

    pub fn position(mut self, name: &str) -> Self {
        self.vars.position = Some(ExpandedName::parse(name));
        self
    }

    pub fn previous(mut self, name: &str) -> Self {
        self.vars.previous = Some(ExpandedName::parse(name));
        self
    }

    pub fn next(mut self, name: &str) -> Self {
        self.vars.next = Some(ExpandedName::parse(name));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flwor_clauses_are_chained() {
        let mut b = QueryBuilder::new();
        let input = b.integers(&[1, 2]);
        let cond = b.literal(true);
        let ret = b.var("x");
        let first = b.flwor(FlworBuilder::new().for_var("x", input).where_cond(cond), ret);
        let q = b.finish(first);
        let Some(ExprKind::For(f)) = q.node(first).map(|n| n.kind().clone()) else {
            panic!("expected a for clause");
        };
        assert_eq!(f.previous, None);
        assert_eq!(f.return_expr, ExprId::new(first.raw() + 1));
        let Some(ExprKind::Where(w)) = q.node(f.return_expr).map(|n| n.kind().clone()) else {
            panic!("expected a where clause");
        };
        assert_eq!(w.previous, Some(first));
        assert_eq!(w.return_expr, ret);
    }

    #[test]
    fn empty_flwor_is_its_return() {
        let mut b = QueryBuilder::new();
        let ret = b.literal(1_i64);
        assert_eq!(b.flwor(FlworBuilder::new(), ret), ret);
    }
}
