//! Static analysis pass.
//!
//! Walks the tree top-down once, threading an [`AnalyzeContext`] copy into
//! every child. Each node comes out with its dependency bits, cardinality,
//! static item type, correlation id and parent link fixed; kind-specific
//! decisions (predicate execution mode, and/or set algebra, where-clause
//! fast track, FLWOR rebinding) are stored on the node's kind.
use crate::cardinality::Cardinality;
use crate::context::AnalyzeContext;
use crate::dependency::Dependency;
use crate::error::{Error, ErrorCode};
use crate::expr::{ExprArena, ExprId, ExprKind, FunctionId, UserFunction};
use crate::runtime::{StaticContext, XQueryVersion};
use crate::types::ItemType;
use crate::value::ExpandedName;

/// Static properties computed for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Analysis {
    pub deps: Dependency,
    pub cardinality: Cardinality,
    pub static_type: ItemType,
}

impl Analysis {
    pub fn new(deps: Dependency, cardinality: Cardinality, static_type: ItemType) -> Self {
        Self {
            deps,
            cardinality,
            static_type,
        }
    }
}

pub(crate) struct Analyzer<'a> {
    arena: &'a mut ExprArena,
    functions: &'a [UserFunction],
    pub(crate) static_ctx: &'a StaticContext,
    /// Local variables in scope, innermost last.
    scope: Vec<ExpandedName>,
    /// Scope length at the start of each enclosing FLWOR expression.
    flwor_starts: Vec<usize>,
}

impl<'a> Analyzer<'a> {
    pub fn new(
        arena: &'a mut ExprArena,
        functions: &'a [UserFunction],
        static_ctx: &'a StaticContext,
    ) -> Self {
        Self {
            arena,
            functions,
            static_ctx,
            scope: Vec::new(),
            flwor_starts: Vec::new(),
        }
    }

    /// Analyzes a declared function body with only its parameters in scope.
    pub fn analyze_function(&mut self, function: &UserFunction) -> Result<(), Error> {
        let saved = std::mem::take(&mut self.scope);
        self.scope
            .extend(function.params.iter().map(|p| p.name.clone()));
        let mut ctx = AnalyzeContext::new();
        let result = self.analyze(function.body, &mut ctx);
        self.scope = saved;
        result.map_err(|e| e.with_location_if_unset(function.location))
    }

    pub fn analyze(&mut self, id: ExprId, ctx: &mut AnalyzeContext) -> Result<(), Error> {
        let mut kind = std::mem::replace(&mut self.arena.node_mut(id).kind, ExprKind::Detached);
        self.arena.node_mut(id).parent = ctx.parent;
        let result = self.analyze_kind(id, &mut kind, ctx);
        let node = self.arena.node_mut(id);
        node.kind = kind;
        let analysis = result.map_err(|e| e.with_location_if_unset(node.location))?;
        node.deps = analysis.deps;
        node.cardinality = analysis.cardinality;
        node.static_type = analysis.static_type;
        node.context_id = ctx.context_id;
        node.analyzed = true;
        ctx.static_return_type = analysis.static_type;
        Ok(())
    }

    fn analyze_kind(
        &mut self,
        id: ExprId,
        kind: &mut ExprKind,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        match kind {
            ExprKind::Literal(l) => Ok(self.analyze_literal(l)),
            ExprKind::Sequence(s) => self.analyze_sequence(id, s, ctx),
            ExprKind::ContextItem => Ok(Analysis::new(
                Dependency::CONTEXT_ITEM,
                Cardinality::ExactlyOne,
                ItemType::Item,
            )),
            ExprKind::Root => Ok(Analysis::new(
                Dependency::CONTEXT_ITEM,
                Cardinality::ExactlyOne,
                ItemType::Document,
            )),
            ExprKind::VariableRef(v) => self.analyze_variable(v),
            ExprKind::Path(p) => self.analyze_path(id, p, ctx),
            ExprKind::Step(s) => self.analyze_step(id, s, ctx),
            ExprKind::Predicate(p) => self.analyze_predicate(id, p, ctx),
            ExprKind::Filter(f) => self.analyze_filter(id, f, ctx),
            ExprKind::Comparison(c) => self.analyze_comparison(id, c, ctx),
            ExprKind::Arithmetic(a) => self.analyze_arithmetic(id, a, ctx),
            ExprKind::Range(r) => self.analyze_range(id, r, ctx),
            ExprKind::If(c) => self.analyze_conditional(id, c, ctx),
            ExprKind::InstanceOf(i) => self.analyze_instance_of(id, i, ctx),
            ExprKind::TreatAs(t) => self.analyze_treat_as(id, t, ctx),
            ExprKind::Comment(c) => self.analyze_comment(id, c, ctx),
            ExprKind::Set(s) => self.analyze_set(id, s, ctx),
            ExprKind::Logical(l) => self.analyze_logical(id, l, ctx),
            ExprKind::For(c) => self.analyze_for(id, c, ctx),
            ExprKind::Let(c) => self.analyze_let(id, c, ctx),
            ExprKind::Where(c) => self.analyze_where(id, c, ctx),
            ExprKind::OrderBy(c) => self.analyze_order_by(id, c, ctx),
            ExprKind::GroupBy(c) => self.analyze_group_by(id, c, ctx),
            ExprKind::Count(c) => self.analyze_count(id, c, ctx),
            ExprKind::Window(c) => self.analyze_window(id, c, ctx),
            ExprKind::StaticCall(c) => self.analyze_static_call(id, c, ctx),
            ExprKind::DynamicCall(c) => self.analyze_dynamic_call(id, c, ctx),
            ExprKind::InlineFunction(f) => self.analyze_inline_function(id, f),
            ExprKind::FunctionRef(r) => self.analyze_function_ref(r),
            ExprKind::Detached => Err(Error::internal(format!(
                "expression {id} is already being analyzed"
            ))),
        }
    }

    /// Analyzes `child` with a fresh copy of `ctx` parented at `parent`.
    pub fn child(
        &mut self,
        parent: ExprId,
        child: ExprId,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        self.child_with(child, ctx.for_child(parent))
    }

    /// Analyzes `child` with a context the caller prepared.
    pub fn child_with(
        &mut self,
        child: ExprId,
        mut ctx: AnalyzeContext,
    ) -> Result<Analysis, Error> {
        self.analyze(child, &mut ctx)?;
        Ok(self.summary(child))
    }

    pub fn summary(&self, id: ExprId) -> Analysis {
        let node = &self.arena[id];
        Analysis::new(node.deps, node.cardinality, node.static_type)
    }

    pub fn kind(&self, id: ExprId) -> &ExprKind {
        &self.arena[id].kind
    }

    pub fn kind_mut(&mut self, id: ExprId) -> &mut ExprKind {
        &mut self.arena.node_mut(id).kind
    }

    pub fn arena(&self) -> &ExprArena {
        self.arena
    }

    pub fn push_var(&mut self, name: &ExpandedName) {
        self.scope.push(name.clone());
    }

    pub fn scope_len(&self) -> usize {
        self.scope.len()
    }

    pub fn truncate_scope(&mut self, len: usize) {
        self.scope.truncate(len);
    }

    pub fn is_local(&self, name: &ExpandedName) -> bool {
        self.scope.iter().any(|n| n == name)
    }

    /// Opens a FLWOR scope if `id` is the first clause of a FLWOR
    /// expression.
    pub fn enter_flwor(&mut self, previous: Option<ExprId>) {
        if previous.is_none() {
            self.flwor_starts.push(self.scope.len());
        }
    }

    pub fn leave_flwor(&mut self, previous: Option<ExprId>) {
        if previous.is_none() {
            self.flwor_starts.pop();
        }
    }

    /// Variables bound by clauses of the innermost FLWOR expression,
    /// without shadowed duplicates.
    pub fn flwor_variables(&self) -> Vec<ExpandedName> {
        let start = self.flwor_starts.last().copied().unwrap_or(self.scope.len());
        let mut out: Vec<ExpandedName> = Vec::new();
        for name in &self.scope[start..] {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        out
    }

    /// Whether the surrounding language level supports `feature`.
    pub fn require_v3(&self, feature: &str) -> Result<(), Error> {
        if self.static_ctx.version < XQueryVersion::V3_0 {
            return Err(Error::static_error(
                ErrorCode::XPST0003,
                format!("{feature} requires XQuery 3.0 or later"),
            ));
        }
        Ok(())
    }

    pub fn find_function(&self, name: &ExpandedName, arity: usize) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|f| !f.inline && f.name.as_ref() == Some(name) && f.arity() == arity)
            .and_then(|i| u32::try_from(i).ok())
            .map(FunctionId::new)
    }

    pub fn function(&self, id: FunctionId) -> Option<&UserFunction> {
        self.functions.get(id.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::QueryBuilder;

    #[test]
    fn undeclared_variable_is_a_static_error() {
        let mut b = QueryBuilder::new();
        let v = b.var("nope");
        b.set_location(v, 4, 2);
        let mut q = b.finish(v);
        let err = q.analyze(StaticContext::default()).unwrap_err();
        assert!(err.is_static());
        assert_eq!(err.code, ErrorCode::XPST0008);
        assert_eq!(err.location, Some(crate::error::Location::new(4, 2)));
    }

    #[test]
    fn parent_links_are_set() {
        let mut b = QueryBuilder::new();
        let one = b.literal(1_i64);
        let two = b.literal(2_i64);
        let seq = b.sequence(vec![one, two]);
        let mut q = b.finish(seq);
        q.analyze(StaticContext::default()).unwrap();
        assert_eq!(q.node(one).and_then(|n| n.parent()), Some(seq));
        assert_eq!(q.node(seq).and_then(|n| n.parent()), None);
        assert_eq!(q.node(seq).map(|n| n.cardinality()), Some(Cardinality::Many));
    }
}
