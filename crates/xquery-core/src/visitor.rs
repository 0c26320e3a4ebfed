//! Read-only traversal of the expression tree.
use crate::expr::{
    DynamicCall, ExprArena, ExprId, ExprKind, ExprNode, FilterExpr, InlineFunction, LocationStep,
    LogicalExpr, PathExpr, Predicate, SetExpr, StaticCall, VariableRef,
};
use crate::value::ExpandedName;

/// Per-kind hooks. Every hook defaults to [`ExpressionVisitor::visit_generic`],
/// which walks the children, so a visitor only overrides what it cares about
/// and calls [`walk_children`] itself if it wants to keep descending.
pub trait ExpressionVisitor {
    fn visit_generic(&mut self, arena: &ExprArena, node: &ExprNode) {
        walk_children(self, arena, node);
    }

    fn visit_variable(&mut self, arena: &ExprArena, node: &ExprNode, _var: &VariableRef) {
        self.visit_generic(arena, node);
    }

    fn visit_path(&mut self, arena: &ExprArena, node: &ExprNode, _path: &PathExpr) {
        self.visit_generic(arena, node);
    }

    fn visit_step(&mut self, arena: &ExprArena, node: &ExprNode, _step: &LocationStep) {
        self.visit_generic(arena, node);
    }

    fn visit_predicate(&mut self, arena: &ExprArena, node: &ExprNode, _pred: &Predicate) {
        self.visit_generic(arena, node);
    }

    fn visit_filter(&mut self, arena: &ExprArena, node: &ExprNode, _filter: &FilterExpr) {
        self.visit_generic(arena, node);
    }

    fn visit_set(&mut self, arena: &ExprArena, node: &ExprNode, _set: &SetExpr) {
        self.visit_generic(arena, node);
    }

    fn visit_logical(&mut self, arena: &ExprArena, node: &ExprNode, _logical: &LogicalExpr) {
        self.visit_generic(arena, node);
    }

    /// Any FLWOR clause.
    fn visit_clause(&mut self, arena: &ExprArena, node: &ExprNode) {
        self.visit_generic(arena, node);
    }

    fn visit_static_call(&mut self, arena: &ExprArena, node: &ExprNode, _call: &StaticCall) {
        self.visit_generic(arena, node);
    }

    fn visit_dynamic_call(&mut self, arena: &ExprArena, node: &ExprNode, _call: &DynamicCall) {
        self.visit_generic(arena, node);
    }

    fn visit_inline_function(
        &mut self,
        arena: &ExprArena,
        node: &ExprNode,
        _function: &InlineFunction,
    ) {
        self.visit_generic(arena, node);
    }
}

/// Dispatches `id` to the matching hook of `visitor`.
pub fn accept<V: ExpressionVisitor + ?Sized>(visitor: &mut V, arena: &ExprArena, id: ExprId) {
    let Some(node) = arena.get(id) else {
        return;
    };
    match &node.kind {
        ExprKind::VariableRef(v) => visitor.visit_variable(arena, node, v),
        ExprKind::Path(p) => visitor.visit_path(arena, node, p),
        ExprKind::Step(s) => visitor.visit_step(arena, node, s),
        ExprKind::Predicate(p) => visitor.visit_predicate(arena, node, p),
        ExprKind::Filter(f) => visitor.visit_filter(arena, node, f),
        ExprKind::Set(s) => visitor.visit_set(arena, node, s),
        ExprKind::Logical(l) => visitor.visit_logical(arena, node, l),
        ExprKind::StaticCall(c) => visitor.visit_static_call(arena, node, c),
        ExprKind::DynamicCall(c) => visitor.visit_dynamic_call(arena, node, c),
        ExprKind::InlineFunction(f) => visitor.visit_inline_function(arena, node, f),
        k if k.is_clause() => visitor.visit_clause(arena, node),
        _ => visitor.visit_generic(arena, node),
    }
}

pub fn walk_children<V: ExpressionVisitor + ?Sized>(
    visitor: &mut V,
    arena: &ExprArena,
    node: &ExprNode,
) {
    for child in node.kind.children() {
        accept(visitor, arena, child);
    }
}

/// Counts references to each variable name in a subtree.
#[derive(Debug, Default)]
pub struct VariableReferenceCollector {
    refs: Vec<ExpandedName>,
}

impl VariableReferenceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, name: &ExpandedName) -> usize {
        self.refs.iter().filter(|n| *n == name).count()
    }

    pub fn names(&self) -> &[ExpandedName] {
        &self.refs
    }
}

impl ExpressionVisitor for VariableReferenceCollector {
    fn visit_variable(&mut self, _arena: &ExprArena, _node: &ExprNode, var: &VariableRef) {
        self.refs.push(var.name.clone());
    }
}

/// Collects location steps in tree order.
#[derive(Debug, Default)]
pub struct LocationStepCollector {
    steps: Vec<ExprId>,
}

impl LocationStepCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[ExprId] {
        &self.steps
    }
}

impl ExpressionVisitor for LocationStepCollector {
    fn visit_step(&mut self, arena: &ExprArena, node: &ExprNode, _step: &LocationStep) {
        self.steps.push(node.id);
        walk_children(self, arena, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Axis, NodeTest, QueryBuilder};

    #[test]
    fn collects_variables_and_steps() {
        let mut b = QueryBuilder::new();
        let x = b.var("x");
        let a = b.child("a");
        let y = b.var("y");
        let pred = b.predicate(y);
        let s = b.step_with(Axis::Child, NodeTest::Wildcard, vec![pred]);
        let path = b.path(vec![x, a, s]);
        let x2 = b.var("x");
        let root = b.sequence(vec![path, x2]);
        let q = b.finish(root);

        let mut vars = VariableReferenceCollector::new();
        q.accept(&mut vars);
        assert_eq!(vars.count(&ExpandedName::local("x")), 2);
        assert_eq!(vars.count(&ExpandedName::local("y")), 1);

        let mut steps = LocationStepCollector::new();
        q.accept(&mut steps);
        assert_eq!(steps.steps(), &[a, s]);
    }
}
