//! Path expressions, location steps, predicates and filter expressions.
//!
//! A step is evaluated set-at-a-time against the whole context node set.
//! Every result node records the context node it was reached from under the
//! step's correlation id, which lets a predicate evaluated once over a set
//! map its hits back to the context nodes that produced them.
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::analyze::{Analysis, Analyzer};
use crate::cardinality::Cardinality;
use crate::context::{AnalyzeContext, ContextFlags, ContextId};
use crate::dependency::Dependency;
use crate::error::{Error, ErrorCode};
use crate::eval::Evaluator;
use crate::eval::state::Focus;
use crate::expr::{ExprId, ExprKind, ExprNode, SetOp};
use crate::selector::{
    AncestorSelector, ChildSelector, DescendantOrSelfSelector, DescendantSelector, NodeSelector,
    ParentSelector, SelfSelector, select,
};
use crate::store::{Document, NodeId, NodeKind};
use crate::types::ItemType;
use crate::value::{AtomicValue, Item, NodeProxy, NodeSet, Sequence};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Attribute,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
}

impl Axis {
    pub fn name(self) -> &'static str {
        match self {
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::Attribute => "attribute",
            Axis::SelfAxis => "self",
            Axis::Parent => "parent",
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
            Axis::FollowingSibling => "following-sibling",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::Following => "following",
            Axis::Preceding => "preceding",
        }
    }

    /// Positions in predicates count backwards from the context node.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Parent
                | Axis::Ancestor
                | Axis::AncestorOrSelf
                | Axis::PrecedingSibling
                | Axis::Preceding
        )
    }

    fn principal_kind(self) -> NodeKind {
        if self == Axis::Attribute {
            NodeKind::Attribute
        } else {
            NodeKind::Element
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// `node()`
    AnyKind,
    Name(String),
    /// `*`
    Wildcard,
    Kind(NodeKind),
}

impl NodeTest {
    fn matches(&self, doc: &Document, id: &NodeId, principal: NodeKind) -> bool {
        let Some(kind) = doc.kind(id) else {
            return false;
        };
        match self {
            NodeTest::AnyKind => true,
            NodeTest::Wildcard => kind == principal,
            NodeTest::Kind(k) => kind == *k,
            NodeTest::Name(name) => {
                kind == principal && doc.name(id).is_some_and(|n| &**n == name.as_str())
            }
        }
    }

    fn static_type(&self, axis: Axis) -> ItemType {
        match self {
            NodeTest::Kind(k) => ItemType::of_node_kind(*k),
            NodeTest::Name(_) | NodeTest::Wildcard => ItemType::of_node_kind(axis.principal_kind()),
            NodeTest::AnyKind if axis == Axis::Attribute => ItemType::Attribute,
            NodeTest::AnyKind => ItemType::Node,
        }
    }
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTest::AnyKind => f.write_str("node()"),
            NodeTest::Name(n) => f.write_str(n),
            NodeTest::Wildcard => f.write_str("*"),
            NodeTest::Kind(NodeKind::Document) => f.write_str("document-node()"),
            NodeTest::Kind(NodeKind::Element) => f.write_str("element()"),
            NodeTest::Kind(NodeKind::Attribute) => f.write_str("attribute()"),
            NodeTest::Kind(NodeKind::Text) => f.write_str("text()"),
            NodeTest::Kind(NodeKind::Comment) => f.write_str("comment()"),
            NodeTest::Kind(NodeKind::ProcessingInstruction) => {
                f.write_str("processing-instruction()")
            }
        }
    }
}

/// `e1/e2/...`. The first element is evaluated against the incoming
/// context, each later one against the node sequence its predecessor
/// produced.
#[derive(Debug, Clone)]
pub struct PathExpr {
    pub steps: Vec<ExprId>,
}

#[derive(Debug, Clone)]
pub struct LocationStep {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<ExprId>,
    /// Evaluate once per context node instead of once per context set.
    /// Needed when a predicate counts positions.
    pub per_context: bool,
}

impl LocationStep {
    pub fn new(axis: Axis, test: NodeTest) -> Self {
        Self {
            axis,
            test,
            predicates: Vec::new(),
            per_context: false,
        }
    }
}

/// How a predicate is executed, decided by analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredicateMode {
    /// Per item with focus, keeping items whose value is true (or, for a
    /// single number, equals the position).
    #[default]
    Boolean,
    /// A constant number selecting one item by position.
    Positional,
    /// A node-valued condition evaluated once over the whole input set; the
    /// hits are mapped back to the input nodes via their correlation links.
    Node,
}

#[derive(Debug, Clone)]
pub struct Predicate {
    pub expr: ExprId,
    pub mode: PredicateMode,
}

#[derive(Debug, Clone)]
pub struct FilterExpr {
    pub base: ExprId,
    pub predicates: Vec<ExprId>,
}

fn could_be_numeric(ty: ItemType) -> bool {
    ty.is_numeric() || matches!(ty, ItemType::Item | ItemType::AnyAtomic | ItemType::UntypedAtomic)
}

/// Proxy for `id` reached from `origin`, carrying the correlation link.
fn attach(
    doc: &Arc<Document>,
    id: &NodeId,
    origin: &NodeProxy,
    context_id: ContextId,
) -> NodeProxy {
    let mut node = NodeProxy::new(doc.clone(), id.clone());
    match context_id {
        ContextId::Scope(scope) => node.attach_scoped(scope, origin),
        ContextId::None => node.share_context(origin),
    }
    node
}

fn not_attribute(doc: &Document, id: &NodeId) -> bool {
    doc.kind(id) != Some(NodeKind::Attribute)
}

impl Analyzer<'_> {
    /// True if the nodes `id` produces are reached by navigating from the
    /// context set, so each carries a correlation link back to the context
    /// node it came from.
    pub(crate) fn correlates(&self, id: ExprId) -> bool {
        match self.kind(id) {
            ExprKind::Step(_) => true,
            ExprKind::Path(p) => p.steps.first().is_some_and(|&s| self.correlates(s)),
            ExprKind::Filter(f) => self.correlates(f.base),
            ExprKind::Set(s) => match s.op {
                SetOp::Union => self.correlates(s.left) && self.correlates(s.right),
                SetOp::Intersect => self.correlates(s.left) || self.correlates(s.right),
                SetOp::Except => self.correlates(s.left),
            },
            ExprKind::Logical(l) => l.use_set_algebra,
            _ => false,
        }
    }

    pub(crate) fn analyze_path(
        &mut self,
        id: ExprId,
        p: &mut PathExpr,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        let mut deps = Dependency::NONE;
        let mut card = Cardinality::ExactlyOne;
        let mut ty = ItemType::Item;
        for (i, &step) in p.steps.iter().enumerate() {
            let mut child_ctx = ctx.for_child(id);
            if i > 0 {
                child_ctx = child_ctx.with_context_id(ContextId::None);
            }
            let a = self.child_with(step, child_ctx)?;
            if i == 0 {
                deps = a.deps;
                card = a.cardinality;
            } else {
                deps |= a.deps & Dependency::VARS;
                card = card.repeat(a.cardinality);
            }
            ty = a.static_type;
        }
        Ok(Analysis::new(deps, card, ty))
    }

    pub(crate) fn analyze_step(
        &mut self,
        id: ExprId,
        s: &mut LocationStep,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        let mut deps = Dependency::CONTEXT_SET;
        let mut per_context = false;
        for &pred in &s.predicates {
            let a = self.child(id, pred, ctx)?;
            deps |= a.deps;
            if let ExprKind::Predicate(p) = self.kind(pred) {
                let inner = self.summary(p.expr);
                per_context |= match p.mode {
                    PredicateMode::Positional => true,
                    PredicateMode::Node => false,
                    PredicateMode::Boolean => {
                        inner.deps.contains(Dependency::CONTEXT_POSITION)
                            || could_be_numeric(inner.static_type)
                    }
                };
            }
        }
        s.per_context = per_context;
        Ok(Analysis::new(
            deps,
            Cardinality::ZeroOrMore,
            s.test.static_type(s.axis),
        ))
    }

    pub(crate) fn analyze_predicate(
        &mut self,
        id: ExprId,
        p: &mut Predicate,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        let inner_ctx = ctx
            .for_child(id)
            .with_flags(ContextFlags::IN_PREDICATE)
            .without_flags(ContextFlags::IN_WHERE_CLAUSE | ContextFlags::DOT_TEST)
            .with_context_id(ContextId::Scope(id));
        let inner = self.child_with(p.expr, inner_ctx)?;
        let focus = Dependency::CONTEXT_ITEM | Dependency::CONTEXT_POSITION;
        p.mode = if inner.static_type.is_node()
            && !inner.deps.intersects(focus)
            && self.correlates(p.expr)
        {
            PredicateMode::Node
        } else if inner.static_type.is_numeric()
            && inner.cardinality == Cardinality::ExactlyOne
            && !inner.deps.intersects(focus)
        {
            PredicateMode::Positional
        } else {
            PredicateMode::Boolean
        };
        Ok(Analysis::new(
            Dependency::CONTEXT_SET | (inner.deps & Dependency::VARS),
            Cardinality::ZeroOrMore,
            ItemType::Item,
        ))
    }

    pub(crate) fn analyze_filter(
        &mut self,
        id: ExprId,
        f: &mut FilterExpr,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        let base = self.child(id, f.base, ctx)?;
        let mut deps = base.deps;
        for &pred in &f.predicates {
            let a = self.child(id, pred, ctx)?;
            deps |= a.deps & Dependency::VARS;
        }
        let card = if f.predicates.is_empty() {
            base.cardinality
        } else {
            base.cardinality.or_empty()
        };
        Ok(Analysis::new(deps, card, base.static_type))
    }
}

impl Evaluator<'_> {
    pub(crate) fn eval_path(
        &mut self,
        p: &PathExpr,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let query = self.query;
        let last = p.steps.len().saturating_sub(1);
        let mut current: Option<Sequence> = None;
        for (i, &step) in p.steps.iter().enumerate() {
            let Some(node) = query.node(step) else {
                return Err(Error::internal(format!("no expression {step}")));
            };
            let result = match &current {
                None => self.eval(step, ctx, item)?,
                Some(input) => {
                    let is_step = matches!(node.kind, ExprKind::Step(_));
                    if !is_step && node.deps.depends_on_context_item() {
                        self.eval_per_item(step, input)?
                    } else {
                        self.eval(step, Some(input), None)?
                    }
                }
            };
            let result = if i < last {
                if !result.is_all_nodes() {
                    return Err(Error::dynamic(
                        ErrorCode::XPTY0019,
                        "intermediate path step returned a non-node",
                    )
                    .with_location_if_unset(node.location));
                }
                Sequence::from_nodes(result.to_node_set()?.into_vec())
            } else if i > 0 && !result.is_empty() && result.is_all_nodes() {
                Sequence::from_nodes(result.to_node_set()?.into_vec())
            } else {
                result
            };
            if result.is_empty() {
                return Ok(result);
            }
            current = Some(result);
        }
        Ok(current.unwrap_or_default())
    }

    pub(crate) fn eval_step(
        &mut self,
        node: &ExprNode,
        s: &LocationStep,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let input = self.context_sequence(ctx, item)?;
        if input.is_empty() {
            return Ok(input);
        }
        if s.per_context && input.len() > 1 {
            let mut nodes = Vec::new();
            for it in input.iter() {
                let single = Sequence::from_item(it);
                let r = self.step_once(node, s, &single)?;
                nodes.extend(r.into_items().into_iter().filter_map(|i| match i {
                    Item::Node(n) => Some(n),
                    _ => None,
                }));
            }
            return Ok(Sequence::from_nodes(nodes));
        }
        self.step_once(node, s, &input)
    }

    fn step_once(
        &mut self,
        node: &ExprNode,
        s: &LocationStep,
        input: &Sequence,
    ) -> Result<Sequence, Error> {
        let mut context = Vec::with_capacity(input.len());
        for it in input.iter() {
            match it {
                Item::Node(n) => context.push(n),
                other => {
                    return Err(Error::dynamic(
                        ErrorCode::XPTY0020,
                        format!(
                            "{}::{} requires a node as context item, got {}",
                            s.axis,
                            s.test,
                            other.item_type()
                        ),
                    ));
                }
            }
        }
        let context = NodeSet::from_nodes(context);
        let mut result = Sequence::from_nodes(axis_nodes(s, &context, node.context_id));
        for &pred in &s.predicates {
            if result.is_empty() {
                break;
            }
            result = self.eval_predicate(pred, result, s.axis.is_reverse())?;
        }
        Ok(result)
    }

    /// Applies predicate `id` to `input`. With `reverse`, positions count
    /// from the end of the input.
    pub(crate) fn eval_predicate(
        &mut self,
        id: ExprId,
        input: Sequence,
        reverse: bool,
    ) -> Result<Sequence, Error> {
        let query = self.query;
        let Some(ExprKind::Predicate(p)) = query.node(id).map(|n| &n.kind) else {
            return Err(Error::internal(format!("{id} is not a predicate")));
        };
        if input.is_empty() {
            return Ok(input);
        }
        match p.mode {
            PredicateMode::Node if input.is_persistent_set() => {
                let hits = self.eval(p.expr, Some(&input), None)?;
                if hits.is_all_nodes() {
                    let origins = hits.to_node_set()?.get_context_nodes(ContextId::Scope(id));
                    self.note(id, "node predicate evaluated once over the context set");
                    let kept: Vec<NodeProxy> = input
                        .to_node_set()?
                        .into_vec()
                        .into_iter()
                        .filter(|n| origins.contains_node(n))
                        .collect();
                    return Ok(Sequence::from_nodes(kept));
                }
                self.filter_by_boolean(p.expr, input, reverse)
            }
            PredicateMode::Positional => {
                let value = self.eval(p.expr, Some(&input), None)?;
                let Some(n) = value.zero_or_one_atomic("positional predicate")? else {
                    return Ok(Sequence::empty());
                };
                Ok(pick_position(input, &n, reverse))
            }
            PredicateMode::Node | PredicateMode::Boolean => {
                let inner = query.node(p.expr);
                let invariant = inner.is_some_and(|n| {
                    n.static_type.is_node() && !n.deps.intersects(Dependency::FOCUS)
                });
                if !invariant {
                    return self.filter_by_boolean(p.expr, input, reverse);
                }
                // same value for every item: evaluate once
                let value = self.eval(p.expr, Some(&input), None)?;
                if value.effective_boolean_value()? {
                    Ok(input)
                } else {
                    Ok(Sequence::empty())
                }
            }
        }
    }

    fn filter_by_boolean(
        &mut self,
        expr: ExprId,
        input: Sequence,
        reverse: bool,
    ) -> Result<Sequence, Error> {
        let size = input.len();
        let nodes = input.is_persistent_set();
        let mut kept = Vec::new();
        for (i, it) in input.iter().enumerate() {
            let position = if reverse { size - i } else { i + 1 };
            self.state.push_focus(Focus { position, size });
            let single = Sequence::from_item(it.clone());
            let r = self.eval(expr, Some(&single), Some(&it));
            self.state.pop_focus();
            if predicate_truth(&r?, position)? {
                kept.push(it);
            }
        }
        if nodes {
            return Ok(Sequence::from_nodes(kept.into_iter().filter_map(|i| match i {
                Item::Node(n) => Some(n),
                _ => None,
            })));
        }
        Ok(Sequence::from_items(kept))
    }

    pub(crate) fn eval_filter(
        &mut self,
        f: &FilterExpr,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let mut value = self.eval(f.base, ctx, item)?;
        for &pred in &f.predicates {
            value = self.eval_predicate(pred, value, false)?;
        }
        Ok(value)
    }
}

/// A single numeric predicate value selects by position, anything else
/// is reduced to its effective boolean value.
fn predicate_truth(value: &Sequence, position: usize) -> Result<bool, Error> {
    if value.len() == 1
        && let Some(Item::Atomic(a)) = value.first()
        && a.is_numeric()
    {
        #[allow(clippy::cast_precision_loss)]
        return Ok(a.as_f64() == Some(position as f64));
    }
    value.effective_boolean_value()
}

fn pick_position(input: Sequence, n: &AtomicValue, reverse: bool) -> Sequence {
    let Some(v) = n.as_f64() else {
        return Sequence::empty();
    };
    #[allow(clippy::cast_precision_loss)]
    let in_range = v.fract() == 0.0 && v >= 1.0 && v <= input.len() as f64;
    if !in_range {
        return Sequence::empty();
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let pos = v as usize;
    let index = if reverse { input.len() - pos } else { pos - 1 };
    input.get(index).map(Sequence::from_item).unwrap_or_default()
}

/// Nodes reachable from `context` along the step's axis that pass its node
/// test, in document order. Name tests on the child, descendant and
/// attribute axes are answered from the structural index.
fn axis_nodes(s: &LocationStep, context: &NodeSet, context_id: ContextId) -> Vec<NodeProxy> {
    let principal = s.axis.principal_kind();
    let mut out = Vec::new();
    for doc in context.documents() {
        let here: Vec<&NodeProxy> = context
            .iter()
            .filter(|n| n.doc_id() == doc.id())
            .collect();
        let test = |id: &NodeId| s.test.matches(&doc, id, principal);
        let scan = |ids: BTreeSet<NodeId>| -> Vec<NodeId> {
            ids.into_iter().filter(|id| test(id)).collect()
        };
        match s.axis {
            Axis::Child => {
                let sel = ChildSelector::new(context, context_id);
                if let NodeTest::Name(name) = &s.test {
                    out.extend(select(&sel, &doc, doc.index().elements(name)));
                } else {
                    let ids = scan(
                        here.iter()
                            .flat_map(|n| doc.children(n.node_id()).iter().cloned())
                            .collect(),
                    );
                    out.extend(select(&sel, &doc, &ids));
                }
            }
            Axis::Attribute => {
                let sel = ChildSelector::new(context, context_id);
                if let NodeTest::Name(name) = &s.test {
                    out.extend(select(&sel, &doc, doc.index().attributes(name)));
                } else {
                    let ids = scan(
                        here.iter()
                            .flat_map(|n| doc.attributes(n.node_id()).iter().cloned())
                            .collect(),
                    );
                    out.extend(select(&sel, &doc, &ids));
                }
            }
            Axis::Descendant | Axis::DescendantOrSelf => {
                let include_self = s.axis == Axis::DescendantOrSelf;
                let sel: Box<dyn NodeSelector + '_> = if include_self {
                    Box::new(DescendantOrSelfSelector::new(context, context_id))
                } else {
                    Box::new(DescendantSelector::new(context, context_id))
                };
                match &s.test {
                    NodeTest::Name(name) => {
                        out.extend(select(&*sel, &doc, doc.index().elements(name)));
                    }
                    _ => {
                        let mut ids = BTreeSet::new();
                        for n in &here {
                            if include_self {
                                ids.insert(n.node_id().clone());
                            }
                            ids.extend(
                                doc.descendants(n.node_id())
                                    .filter(|id| not_attribute(&doc, id))
                                    .cloned(),
                            );
                        }
                        out.extend(select(&*sel, &doc, &scan(ids)));
                    }
                }
            }
            Axis::SelfAxis => {
                let sel = SelfSelector::new(context, context_id);
                let ids = scan(here.iter().map(|n| n.node_id().clone()).collect());
                out.extend(select(&sel, &doc, &ids));
            }
            Axis::Parent => {
                let sel = ParentSelector::new(context, context_id);
                let ids = scan(here.iter().filter_map(|n| n.node_id().parent()).collect());
                out.extend(select(&sel, &doc, &ids));
            }
            Axis::Ancestor | Axis::AncestorOrSelf => {
                let include_self = s.axis == Axis::AncestorOrSelf;
                let sel = AncestorSelector::new(context, context_id, include_self);
                let mut ids = BTreeSet::new();
                for n in &here {
                    if include_self {
                        ids.insert(n.node_id().clone());
                    }
                    ids.extend(n.node_id().ancestors());
                }
                out.extend(select(&sel, &doc, &scan(ids)));
            }
            Axis::FollowingSibling | Axis::PrecedingSibling => {
                let following = s.axis == Axis::FollowingSibling;
                for n in &here {
                    let id = n.node_id();
                    if !not_attribute(&doc, id) {
                        continue;
                    }
                    let Some(parent) = id.parent() else {
                        continue;
                    };
                    for sibling in doc.children(&parent) {
                        let wanted = if following { sibling > id } else { sibling < id };
                        if wanted && test(sibling) {
                            out.push(attach(&doc, sibling, n, context_id));
                        }
                    }
                }
            }
            Axis::Following | Axis::Preceding => {
                for n in &here {
                    let id = n.node_id();
                    let ids: Vec<&NodeId> = if s.axis == Axis::Following {
                        doc.following(id).collect()
                    } else {
                        doc.preceding(id).collect()
                    };
                    for other in ids {
                        if not_attribute(&doc, other) && test(other) {
                            out.push(attach(&doc, other, n, context_id));
                        }
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, elem, text};

    fn doc() -> Arc<Document> {
        Store::new().add_document(
            "p.xml",
            elem("r")
                .child(elem("a").attr("id", "1").child(elem("b")).text("x"))
                .child(elem("a").attr("id", "2"))
                .child(elem("c").child(text("y"))),
        )
    }

    fn step(axis: Axis, test: NodeTest) -> LocationStep {
        LocationStep::new(axis, test)
    }

    fn ids(nodes: &[NodeProxy]) -> Vec<String> {
        nodes.iter().map(|n| n.node_id().to_string()).collect()
    }

    #[test]
    fn child_name_test_uses_index() {
        let d = doc();
        let ctx = NodeSet::single(NodeProxy::new(d.clone(), NodeId::from_levels(&[1])));
        let child_a = step(Axis::Child, NodeTest::Name("a".into()));
        let hits = axis_nodes(&child_a, &ctx, ContextId::None);
        assert_eq!(ids(&hits), vec!["1.1", "1.2"]);
    }

    #[test]
    fn attribute_axis_and_kind_tests() {
        let d = doc();
        let a = NodeSet::single(NodeProxy::new(d.clone(), NodeId::from_levels(&[1, 1])));
        let attrs = axis_nodes(&step(Axis::Attribute, NodeTest::Wildcard), &a, ContextId::None);
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].kind(), NodeKind::Attribute);
        let texts = axis_nodes(
            &step(Axis::Child, NodeTest::Kind(NodeKind::Text)),
            &a,
            ContextId::None,
        );
        assert_eq!(texts.len(), 1);
        let children = axis_nodes(&step(Axis::Child, NodeTest::AnyKind), &a, ContextId::None);
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn sibling_axes_skip_attributes() {
        let d = doc();
        let b = NodeSet::single(NodeProxy::new(d.clone(), NodeId::from_levels(&[1, 2])));
        let before = axis_nodes(
            &step(Axis::PrecedingSibling, NodeTest::AnyKind),
            &b,
            ContextId::None,
        );
        assert_eq!(ids(&before), vec!["1.1"]);
        let after = axis_nodes(
            &step(Axis::FollowingSibling, NodeTest::Wildcard),
            &b,
            ContextId::None,
        );
        assert_eq!(ids(&after), vec!["1.3"]);
    }

    #[test]
    fn scoped_steps_record_origins() {
        let d = doc();
        let scope = ExprId::new(9);
        let root = NodeProxy::new(d.clone(), NodeId::from_levels(&[1]));
        let ctx = NodeSet::single(root.clone());
        let hits = axis_nodes(
            &step(Axis::Descendant, NodeTest::Name("b".into())),
            &ctx,
            ContextId::Scope(scope),
        );
        assert_eq!(hits.len(), 1);
        assert!(hits[0].context().contains(scope, &root));
    }

    #[test]
    fn positions_count_from_the_end_on_reverse_axes() {
        let seq = Sequence::from_items(vec![
            Item::from(1_i64),
            Item::from(2_i64),
            Item::from(3_i64),
        ]);
        let first = pick_position(seq.clone(), &AtomicValue::Integer(1), false);
        assert_eq!(first, Sequence::integer(1));
        let nearest = pick_position(seq.clone(), &AtomicValue::Integer(1), true);
        assert_eq!(nearest, Sequence::integer(3));
        assert!(pick_position(seq, &AtomicValue::Decimal(1.5), false).is_empty());
    }
}
