//! Set operators (`union`, `intersect`, `except`) and the logical
//! operators.
//!
//! Both families have two code paths: merge-based set algebra when the
//! operands are persistent node sets, and a generic path over arbitrary
//! items otherwise.
use std::collections::BTreeSet;

use crate::analyze::{Analysis, Analyzer};
use crate::cardinality::Cardinality;
use crate::context::AnalyzeContext;
use crate::dependency::Dependency;
use crate::error::{Error, ErrorCode};
use crate::eval::Evaluator;
use crate::expr::{ExprId, ExprNode};
use crate::types::ItemType;
use crate::value::{Item, ItemKey, NodeSet, Sequence};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

impl SetOp {
    pub fn name(self) -> &'static str {
        match self {
            SetOp::Union => "Union",
            SetOp::Intersect => "Intersect",
            SetOp::Except => "Except",
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            SetOp::Union => "union",
            SetOp::Intersect => "intersect",
            SetOp::Except => "except",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SetExpr {
    pub op: SetOp,
    pub left: ExprId,
    pub right: ExprId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn name(self) -> &'static str {
        match self {
            LogicalOp::And => "OpAnd",
            LogicalOp::Or => "OpOr",
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogicalExpr {
    pub op: LogicalOp,
    pub left: ExprId,
    pub right: ExprId,
    /// Both operands are node-valued, navigate from the context set and are
    /// independent of the context item and of local variables, and the
    /// expression sits inside a predicate:
    /// the operands' correlated context nodes are combined by set algebra
    /// instead of computing a boolean.
    pub use_set_algebra: bool,
}

fn require_nodes(seq: Sequence, op: SetOp) -> Result<Sequence, Error> {
    if seq.is_all_nodes() {
        Ok(seq)
    } else {
        Err(Error::dynamic(
            ErrorCode::XPTY0004,
            format!("operand of '{}' is not a node sequence", op.keyword()),
        ))
    }
}

/// Node-only results in document order, anything else in the order given.
fn finish(items: Vec<Item>) -> Sequence {
    if !items.is_empty() && items.iter().all(Item::is_node) {
        Sequence::from_nodes(items.into_iter().filter_map(|i| match i {
            Item::Node(n) => Some(n),
            _ => None,
        }))
    } else {
        Sequence::from_items(items)
    }
}

fn generic_combine(op: SetOp, left: Sequence, right: Sequence) -> Sequence {
    match op {
        SetOp::Union => {
            let combined = left.concat(right).sort_in_document_order().remove_duplicates();
            finish(combined.into_items())
        }
        SetOp::Intersect | SetOp::Except => {
            let keys: BTreeSet<ItemKey> = right.into_items().into_iter().map(ItemKey).collect();
            let keep_members = op == SetOp::Intersect;
            let kept: Vec<Item> = left
                .into_items()
                .into_iter()
                .filter(|i| keys.contains(&ItemKey(i.clone())) == keep_members)
                .collect();
            finish(Sequence::from_items(kept).remove_duplicates().into_items())
        }
    }
}

impl Analyzer<'_> {
    pub(crate) fn analyze_set(
        &mut self,
        id: ExprId,
        s: &mut SetExpr,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        let l = self.child(id, s.left, ctx)?;
        let r = self.child(id, s.right, ctx)?;
        let ty = match s.op {
            SetOp::Union => l.static_type.common_supertype(r.static_type),
            SetOp::Intersect | SetOp::Except => l.static_type,
        };
        Ok(Analysis::new(l.deps | r.deps, Cardinality::ZeroOrMore, ty))
    }

    pub(crate) fn analyze_logical(
        &mut self,
        id: ExprId,
        l: &mut LogicalExpr,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        let left = self.child(id, l.left, ctx)?;
        let right = self.child(id, l.right, ctx)?;
        let blocking = Dependency::CONTEXT_ITEM | Dependency::LOCAL_VARS;
        let optimize = left.static_type.is_node()
            && right.static_type.is_node()
            && !(left.deps | right.deps).intersects(blocking)
            && self.correlates(l.left)
            && self.correlates(l.right);
        l.use_set_algebra = optimize && ctx.in_predicate();
        let deps = left.deps | right.deps;
        if l.use_set_algebra {
            Ok(Analysis::new(deps, Cardinality::ZeroOrMore, ItemType::Node))
        } else {
            Ok(Analysis::new(deps, Cardinality::ExactlyOne, ItemType::Boolean))
        }
    }
}

impl Evaluator<'_> {
    pub(crate) fn eval_set(
        &mut self,
        s: &SetExpr,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let left = self.eval(s.left, ctx, item)?.remove_duplicates();
        let right = self.eval(s.right, ctx, item)?.remove_duplicates();
        match s.op {
            SetOp::Union if left.is_empty() => {
                if right.is_empty() {
                    return Ok(right);
                }
                return require_nodes(right, s.op);
            }
            SetOp::Union if right.is_empty() => return require_nodes(left, s.op),
            SetOp::Except if left.is_empty() => return Ok(Sequence::empty()),
            SetOp::Except if right.is_empty() => return require_nodes(left, s.op),
            SetOp::Intersect if left.is_empty() || right.is_empty() => {
                return Ok(Sequence::empty());
            }
            _ => {}
        }
        if let (Sequence::Nodes(l), Sequence::Nodes(r)) = (&left, &right) {
            let out = match s.op {
                SetOp::Union => l.union(r),
                SetOp::Intersect => l.intersection(r),
                SetOp::Except => l.except(r),
            };
            return Ok(Sequence::Nodes(out));
        }
        Ok(generic_combine(s.op, left, right))
    }

    pub(crate) fn eval_logical(
        &mut self,
        node: &ExprNode,
        l: &LogicalExpr,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let structural = item.is_none() && ctx.is_some_and(Sequence::is_persistent_set);
        if !(l.use_set_algebra && structural) {
            let left = self.eval(l.left, ctx, item)?;
            return self.short_circuit(l, &left, ctx, item);
        }
        let left = self.eval(l.left, ctx, item)?;
        if !left.is_all_nodes() {
            return self.short_circuit(l, &left, ctx, item);
        }
        let left_set = left.to_node_set()?.get_context_nodes(node.context_id);
        if l.op == LogicalOp::And && left_set.is_empty() {
            self.note(node.id, "and: left operand matched nothing, right skipped");
            return Ok(Sequence::Nodes(NodeSet::new()));
        }
        let right = self.eval(l.right, ctx, item)?;
        if !right.is_all_nodes() {
            let left_true = left.effective_boolean_value()?;
            let right_true = right.effective_boolean_value()?;
            let value = match l.op {
                LogicalOp::And => left_true && right_true,
                LogicalOp::Or => left_true || right_true,
            };
            return Ok(Sequence::boolean(value));
        }
        let right_set = right.to_node_set()?.get_context_nodes(node.context_id);
        let out = match l.op {
            LogicalOp::And => left_set.intersection(&right_set),
            LogicalOp::Or => left_set.union(&right_set),
        };
        self.note(
            node.id,
            &format!("{} answered by node set algebra", l.op.keyword()),
        );
        Ok(Sequence::Nodes(out))
    }

    fn short_circuit(
        &mut self,
        l: &LogicalExpr,
        left: &Sequence,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let left_true = left.effective_boolean_value()?;
        match l.op {
            LogicalOp::And if !left_true => return Ok(Sequence::boolean(false)),
            LogicalOp::Or if left_true => return Ok(Sequence::boolean(true)),
            _ => {}
        }
        let right = self.eval(l.right, ctx, item)?;
        Ok(Sequence::boolean(right.effective_boolean_value()?))
    }
}
