//! Compiled expression tree.
//!
//! Nodes live in an [`ExprArena`] and refer to each other (children,
//! parent, FLWOR clause links) by [`ExprId`], which is also the node's
//! index in the arena. Static analysis fills in the per-node dependency,
//! cardinality and type fields; afterwards the tree is read-only and all
//! evaluation-time state lives in the evaluator.
use std::fmt;
use std::ops::Index;

use crate::cardinality::Cardinality;
use crate::context::ContextId;
use crate::dependency::Dependency;
use crate::error::Location;
use crate::types::{ItemType, SequenceType};
use crate::value::ExpandedName;

pub mod basic;
pub mod builder;
pub mod call;
pub mod combining;
pub mod flwor;
pub mod path;

pub use basic::{
    ArithOp, Arithmetic, CommentConstructor, Comparison, Conditional, InstanceOf, Literal,
    RangeExpr, SequenceExpr, TreatAs, VariableRef,
};
pub use builder::{FlworBuilder, QueryBuilder};
pub use call::{CallTarget, DynamicCall, InlineFunction, NamedFunctionRef, StaticCall};
pub use combining::{LogicalExpr, LogicalOp, SetExpr, SetOp};
pub use flwor::{
    CountClause, EmptyOrder, FastTrackShape, ForClause, GroupByClause, GroupSpec, LetClause,
    OrderByClause, OrderSpec, WhereClause, WindowClause, WindowCondition, WindowKind, WindowVars,
};
pub use path::{Axis, FilterExpr, LocationStep, NodeTest, PathExpr, Predicate, PredicateMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u32);

impl ExprId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of a user function (declared or inline) in the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(u32);

impl FunctionId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: ExpandedName,
    pub seq_type: Option<SequenceType>,
}

impl Param {
    pub fn new(name: &str) -> Self {
        Self {
            name: ExpandedName::parse(name),
            seq_type: None,
        }
    }

    pub fn typed(name: &str, seq_type: SequenceType) -> Self {
        Self {
            name: ExpandedName::parse(name),
            seq_type: Some(seq_type),
        }
    }
}

/// A declared function or the body of an inline function expression.
#[derive(Debug, Clone)]
pub struct UserFunction {
    pub name: Option<ExpandedName>,
    pub params: Vec<Param>,
    pub return_type: Option<SequenceType>,
    pub body: ExprId,
    /// Inline function bodies are analyzed where the literal appears, with
    /// the enclosing variables in scope.
    pub inline: bool,
    pub location: Option<Location>,
}

impl UserFunction {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Sequence(SequenceExpr),
    ContextItem,
    Root,
    VariableRef(VariableRef),
    Path(PathExpr),
    Step(LocationStep),
    Predicate(Predicate),
    Filter(FilterExpr),
    Comparison(Comparison),
    Arithmetic(Arithmetic),
    Range(RangeExpr),
    If(Conditional),
    InstanceOf(InstanceOf),
    TreatAs(TreatAs),
    Comment(CommentConstructor),
    Set(SetExpr),
    Logical(LogicalExpr),
    For(ForClause),
    Let(LetClause),
    Where(WhereClause),
    OrderBy(OrderByClause),
    GroupBy(GroupByClause),
    Count(CountClause),
    Window(WindowClause),
    StaticCall(StaticCall),
    DynamicCall(DynamicCall),
    InlineFunction(InlineFunction),
    FunctionRef(NamedFunctionRef),
    /// Placeholder while the real kind is taken out for analysis.
    Detached,
}

impl ExprKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Literal(_) => "Literal",
            ExprKind::Sequence(_) => "SequenceConstructor",
            ExprKind::ContextItem => "ContextItem",
            ExprKind::Root => "RootNode",
            ExprKind::VariableRef(_) => "VariableReference",
            ExprKind::Path(_) => "PathExpr",
            ExprKind::Step(_) => "LocationStep",
            ExprKind::Predicate(_) => "Predicate",
            ExprKind::Filter(_) => "FilterExpr",
            ExprKind::Comparison(_) => "Comparison",
            ExprKind::Arithmetic(_) => "Arithmetic",
            ExprKind::Range(_) => "RangeExpr",
            ExprKind::If(_) => "ConditionalExpr",
            ExprKind::InstanceOf(_) => "InstanceOf",
            ExprKind::TreatAs(_) => "TreatAs",
            ExprKind::Comment(_) => "CommentConstructor",
            ExprKind::Set(s) => s.op.name(),
            ExprKind::Logical(l) => l.op.name(),
            ExprKind::For(_) => "ForClause",
            ExprKind::Let(_) => "LetClause",
            ExprKind::Where(_) => "WhereClause",
            ExprKind::OrderBy(_) => "OrderByClause",
            ExprKind::GroupBy(_) => "GroupByClause",
            ExprKind::Count(_) => "CountClause",
            ExprKind::Window(_) => "WindowClause",
            ExprKind::StaticCall(_) => "FunctionCall",
            ExprKind::DynamicCall(_) => "DynamicFunctionCall",
            ExprKind::InlineFunction(_) => "InlineFunction",
            ExprKind::FunctionRef(_) => "NamedFunctionReference",
            ExprKind::Detached => "Detached",
        }
    }

    pub fn is_clause(&self) -> bool {
        matches!(
            self,
            ExprKind::For(_)
                | ExprKind::Let(_)
                | ExprKind::Where(_)
                | ExprKind::OrderBy(_)
                | ExprKind::GroupBy(_)
                | ExprKind::Count(_)
                | ExprKind::Window(_)
        )
    }

    /// Next clause or final return expression of a FLWOR clause.
    pub fn return_expr(&self) -> Option<ExprId> {
        match self {
            ExprKind::For(c) => Some(c.return_expr),
            ExprKind::Let(c) => Some(c.return_expr),
            ExprKind::Where(c) => Some(c.return_expr),
            ExprKind::OrderBy(c) => Some(c.return_expr),
            ExprKind::GroupBy(c) => Some(c.return_expr),
            ExprKind::Count(c) => Some(c.return_expr),
            ExprKind::Window(c) => Some(c.return_expr),
            _ => None,
        }
    }

    pub fn previous_clause(&self) -> Option<ExprId> {
        match self {
            ExprKind::For(c) => c.previous,
            ExprKind::Let(c) => c.previous,
            ExprKind::Where(c) => c.previous,
            ExprKind::OrderBy(c) => c.previous,
            ExprKind::GroupBy(c) => c.previous,
            ExprKind::Count(c) => c.previous,
            ExprKind::Window(c) => c.previous,
            _ => None,
        }
    }

    /// Direct sub-expressions in evaluation order.
    pub fn children(&self) -> Vec<ExprId> {
        match self {
            ExprKind::Literal(_)
            | ExprKind::ContextItem
            | ExprKind::Root
            | ExprKind::VariableRef(_)
            | ExprKind::FunctionRef(_)
            | ExprKind::Detached => Vec::new(),
            ExprKind::Sequence(s) => s.items.clone(),
            ExprKind::Path(p) => p.steps.clone(),
            ExprKind::Step(s) => s.predicates.clone(),
            ExprKind::Predicate(p) => vec![p.expr],
            ExprKind::Filter(f) => {
                let mut v = vec![f.base];
                v.extend(&f.predicates);
                v
            }
            ExprKind::Comparison(c) => vec![c.left, c.right],
            ExprKind::Arithmetic(a) => vec![a.left, a.right],
            ExprKind::Range(r) => vec![r.from, r.to],
            ExprKind::If(c) => vec![c.test, c.then_branch, c.else_branch],
            ExprKind::InstanceOf(i) => vec![i.expr],
            ExprKind::TreatAs(t) => vec![t.expr],
            ExprKind::Comment(c) => vec![c.content],
            ExprKind::Set(s) => vec![s.left, s.right],
            ExprKind::Logical(l) => vec![l.left, l.right],
            ExprKind::For(c) => vec![c.input, c.return_expr],
            ExprKind::Let(c) => vec![c.input, c.return_expr],
            ExprKind::Where(c) => vec![c.condition, c.return_expr],
            ExprKind::OrderBy(c) => {
                let mut v: Vec<ExprId> = c.specs.iter().map(|s| s.key).collect();
                v.push(c.return_expr);
                v
            }
            ExprKind::GroupBy(c) => {
                let mut v: Vec<ExprId> = c.specs.iter().filter_map(|s| s.key).collect();
                v.push(c.return_expr);
                v
            }
            ExprKind::Count(c) => vec![c.return_expr],
            ExprKind::Window(c) => {
                let mut v = vec![c.input, c.start.when];
                if let Some(end) = &c.end {
                    v.push(end.when);
                }
                v.push(c.return_expr);
                v
            }
            ExprKind::StaticCall(c) => c.args.clone(),
            ExprKind::DynamicCall(c) => {
                let mut v = vec![c.callee];
                v.extend(c.args.iter().flatten());
                v
            }
            ExprKind::InlineFunction(f) => vec![f.body],
        }
    }
}

/// One node of the compiled tree.
#[derive(Debug, Clone)]
pub struct ExprNode {
    pub(crate) id: ExprId,
    pub(crate) kind: ExprKind,
    pub(crate) location: Option<Location>,
    pub(crate) parent: Option<ExprId>,
    pub(crate) context_id: ContextId,
    pub(crate) deps: Dependency,
    pub(crate) cardinality: Cardinality,
    pub(crate) static_type: ItemType,
    pub(crate) analyzed: bool,
}

impl ExprNode {
    pub(crate) fn new(id: ExprId, kind: ExprKind) -> Self {
        Self {
            id,
            kind,
            location: None,
            parent: None,
            context_id: ContextId::None,
            deps: Dependency::DEFAULT,
            cardinality: Cardinality::ZeroOrMore,
            static_type: ItemType::Item,
            analyzed: false,
        }
    }

    pub fn id(&self) -> ExprId {
        self.id
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    pub fn parent(&self) -> Option<ExprId> {
        self.parent
    }

    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub fn dependencies(&self) -> Dependency {
        self.deps
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn static_type(&self) -> ItemType {
        self.static_type
    }

    pub fn is_analyzed(&self) -> bool {
        self.analyzed
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn alloc(&mut self, kind: ExprKind) -> ExprId {
        let raw = u32::try_from(self.nodes.len()).unwrap_or(u32::MAX);
        let id = ExprId::new(raw);
        self.nodes.push(ExprNode::new(id, kind));
        id
    }

    pub fn get(&self, id: ExprId) -> Option<&ExprNode> {
        self.nodes.get(id.index())
    }

    pub(crate) fn node_mut(&mut self, id: ExprId) -> &mut ExprNode {
        &mut self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExprNode> + '_ {
        self.nodes.iter()
    }
}

impl Index<ExprId> for ExprArena {
    type Output = ExprNode;

    fn index(&self, id: ExprId) -> &ExprNode {
        &self.nodes[id.index()]
    }
}
