//! Indented text rendering of an expression subtree with the properties
//! analysis computed for each node.
use std::fmt::Write;

use itertools::Itertools;

use crate::expr::{EmptyOrder, ExprArena, ExprId, ExprKind, ExprNode, WindowKind};
use crate::value::{Item, Sequence};

pub struct ExpressionDumper<'a> {
    arena: &'a ExprArena,
    out: String,
}

fn render_sequence(seq: &Sequence) -> String {
    let items = seq.iter().map(|item| match item {
        Item::Atomic(a) if a.is_string_like() => format!("\"{a}\""),
        Item::Atomic(a) => a.to_string(),
        Item::Node(n) => format!("node({})", n.node_id()),
        Item::Function(f) => match f.name() {
            Some(name) => format!("{name}#{}", f.arity()),
            None => format!("function#{}", f.arity()),
        },
    });
    match seq.len() {
        1 => items.collect(),
        _ => format!("({})", items.format(", ")),
    }
}

fn detail(kind: &ExprKind) -> String {
    match kind {
        ExprKind::Literal(l) => render_sequence(&l.value),
        ExprKind::VariableRef(v) => format!("${}", v.name),
        ExprKind::Step(s) => format!("{}::{}", s.axis, s.test),
        ExprKind::Predicate(p) => format!("{:?}", p.mode),
        ExprKind::Comparison(c) if c.general => c.op.general_symbol().to_string(),
        ExprKind::Comparison(c) => c.op.value_symbol().to_string(),
        ExprKind::Arithmetic(a) => a.op.symbol().to_string(),
        ExprKind::InstanceOf(i) => i.seq_type.to_string(),
        ExprKind::TreatAs(t) => t.seq_type.to_string(),
        ExprKind::Set(s) => s.op.keyword().to_string(),
        ExprKind::Logical(l) if l.use_set_algebra => format!("{} (set algebra)", l.op.keyword()),
        ExprKind::Logical(l) => l.op.keyword().to_string(),
        ExprKind::For(c) => {
            let mut s = format!("${}", c.var);
            if c.allowing_empty {
                s.push_str(" allowing empty");
            }
            if let Some(pos) = &c.position_var {
                let _ = write!(s, " at ${pos}");
            }
            s
        }
        ExprKind::Let(c) => format!("${}", c.var),
        ExprKind::Where(c) => match c.fast_track {
            Some(shape) => format!("fast track: {shape:?}"),
            None => String::new(),
        },
        ExprKind::OrderBy(c) => c
            .specs
            .iter()
            .map(|s| {
                let dir = if s.descending { "descending" } else { "ascending" };
                let empty = match s.empty {
                    EmptyOrder::Least => "empty least",
                    EmptyOrder::Greatest => "empty greatest",
                };
                format!("{dir} {empty}")
            })
            .join(", "),
        ExprKind::GroupBy(c) => c.specs.iter().map(|s| format!("${}", s.var)).join(", "),
        ExprKind::Count(c) => format!("${}", c.var),
        ExprKind::Window(c) => {
            let kind = match c.kind {
                WindowKind::Tumbling => "tumbling",
                WindowKind::Sliding => "sliding",
            };
            format!("{kind} ${}", c.var)
        }
        ExprKind::StaticCall(c) => format!("{}#{}", c.name, c.args.len()),
        ExprKind::FunctionRef(r) => format!("{}#{}", r.name, r.arity),
        ExprKind::DynamicCall(c) if c.is_partial() => "partial".to_string(),
        ExprKind::InlineFunction(f) => f.function.to_string(),
        _ => String::new(),
    }
}

impl<'a> ExpressionDumper<'a> {
    pub fn new(arena: &'a ExprArena) -> Self {
        Self {
            arena,
            out: String::new(),
        }
    }

    pub fn dump(mut self, id: ExprId) -> String {
        self.node(id, 0);
        self.out
    }

    fn node(&mut self, id: ExprId, depth: usize) {
        let Some(node) = self.arena.get(id) else {
            return;
        };
        self.header(node, depth);
        for child in node.kind.children() {
            self.node(child, depth + 1);
        }
    }

    fn header(&mut self, node: &ExprNode, depth: usize) {
        let indent = "  ".repeat(depth);
        let _ = write!(self.out, "{indent}{}{}", node.kind.name(), node.id);
        let detail = detail(&node.kind);
        if !detail.is_empty() {
            let _ = write!(self.out, " {detail}");
        }
        if node.analyzed {
            let deps = node.deps.names();
            let deps = if deps.is_empty() {
                "none".to_string()
            } else {
                deps.join("|")
            };
            let _ = write!(
                self.out,
                " [deps: {deps}; card: {}; type: {}",
                node.cardinality, node.static_type
            );
            if !node.context_id.is_none() {
                let _ = write!(self.out, "; ctx: {}", node.context_id);
            }
            self.out.push(']');
        }
        self.out.push('\n');
    }
}
