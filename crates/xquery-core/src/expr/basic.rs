//! Leaf expressions, operators and constructors that need no special
//! correlation handling.
use std::fmt;

use crate::analyze::{Analysis, Analyzer};
use crate::cardinality::Cardinality;
use crate::context::AnalyzeContext;
use crate::dependency::Dependency;
use crate::error::{Error, ErrorCode};
use crate::eval::Evaluator;
use crate::expr::ExprId;
use crate::store::{NodeId, comment};
use crate::types::{ItemType, SequenceType};
use crate::value::{
    AtomicValue, ComparisonOp, ExpandedName, Item, NodeProxy, Sequence, general_compare,
    value_compare,
};

#[derive(Debug, Clone)]
pub struct Literal {
    pub value: Sequence,
}

#[derive(Debug, Clone)]
pub struct SequenceExpr {
    pub items: Vec<ExprId>,
}

#[derive(Debug, Clone)]
pub struct VariableRef {
    pub name: ExpandedName,
    /// Bound by an enclosing clause, parameter or closure rather than
    /// declared externally. Decided during analysis.
    pub local: bool,
}

#[derive(Debug, Clone)]
pub struct Comparison {
    pub op: ComparisonOp,
    /// General (`=`) rather than value (`eq`) comparison.
    pub general: bool,
    pub left: ExprId,
    pub right: ExprId,
    pub collation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "div",
            ArithOp::IDiv => "idiv",
            ArithOp::Mod => "mod",
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone)]
pub struct Arithmetic {
    pub op: ArithOp,
    pub left: ExprId,
    pub right: ExprId,
}

#[derive(Debug, Clone)]
pub struct RangeExpr {
    pub from: ExprId,
    pub to: ExprId,
}

#[derive(Debug, Clone)]
pub struct Conditional {
    pub test: ExprId,
    pub then_branch: ExprId,
    pub else_branch: ExprId,
}

#[derive(Debug, Clone)]
pub struct InstanceOf {
    pub expr: ExprId,
    pub seq_type: SequenceType,
}

#[derive(Debug, Clone)]
pub struct TreatAs {
    pub expr: ExprId,
    pub seq_type: SequenceType,
}

/// Computed `comment { ... }` constructor.
#[derive(Debug, Clone)]
pub struct CommentConstructor {
    pub content: ExprId,
}

fn overflow(op: ArithOp) -> Error {
    Error::dynamic(
        ErrorCode::FOAR0002,
        format!("integer overflow in '{op}'"),
    )
}

fn division_by_zero() -> Error {
    Error::dynamic(ErrorCode::FOAR0001, "division by zero")
}

fn numeric_operand(v: &AtomicValue, op: ArithOp) -> Result<AtomicValue, Error> {
    match v {
        AtomicValue::UntypedAtomic(s) => {
            Ok(AtomicValue::Double(AtomicValue::untyped_to_double(s)?))
        }
        n if n.is_numeric() => Ok(n.clone()),
        other => Err(Error::dynamic(
            ErrorCode::XPTY0004,
            format!("operator '{op}' is not defined for {}", other.type_name()),
        )),
    }
}

/// Applies an arithmetic operator to two atomic values. Untyped operands
/// are cast to `xs:double`; integer arithmetic is checked.
pub(crate) fn arithmetic(
    op: ArithOp,
    a: &AtomicValue,
    b: &AtomicValue,
) -> Result<AtomicValue, Error> {
    let a = numeric_operand(a, op)?;
    let b = numeric_operand(b, op)?;
    if let (AtomicValue::Integer(x), AtomicValue::Integer(y)) = (&a, &b) {
        let (x, y) = (*x, *y);
        return match op {
            ArithOp::Add => x.checked_add(y).map(AtomicValue::Integer).ok_or_else(|| overflow(op)),
            ArithOp::Sub => x.checked_sub(y).map(AtomicValue::Integer).ok_or_else(|| overflow(op)),
            ArithOp::Mul => x.checked_mul(y).map(AtomicValue::Integer).ok_or_else(|| overflow(op)),
            ArithOp::Div if y == 0 => Err(division_by_zero()),
            #[allow(clippy::cast_precision_loss)]
            ArithOp::Div => Ok(AtomicValue::Decimal(x as f64 / y as f64)),
            ArithOp::IDiv | ArithOp::Mod if y == 0 => Err(division_by_zero()),
            ArithOp::IDiv => x.checked_div(y).map(AtomicValue::Integer).ok_or_else(|| overflow(op)),
            ArithOp::Mod => x.checked_rem(y).map(AtomicValue::Integer).ok_or_else(|| overflow(op)),
        };
    }
    let double = matches!(a, AtomicValue::Double(_)) || matches!(b, AtomicValue::Double(_));
    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    let wrap = |v: f64| {
        if double {
            AtomicValue::Double(v)
        } else {
            AtomicValue::Decimal(v)
        }
    };
    match op {
        ArithOp::Add => Ok(wrap(x + y)),
        ArithOp::Sub => Ok(wrap(x - y)),
        ArithOp::Mul => Ok(wrap(x * y)),
        ArithOp::Div | ArithOp::Mod if !double && y == 0.0 => Err(division_by_zero()),
        ArithOp::Div => Ok(wrap(x / y)),
        ArithOp::Mod => Ok(wrap(x % y)),
        ArithOp::IDiv => {
            if y == 0.0 {
                return Err(division_by_zero());
            }
            let q = (x / y).trunc();
            #[allow(clippy::cast_precision_loss)]
            let in_range = q.is_finite() && q.abs() < i64::MAX as f64;
            if !in_range {
                return Err(overflow(op));
            }
            #[allow(clippy::cast_possible_truncation)]
            Ok(AtomicValue::Integer(q as i64))
        }
    }
}

fn range_bound(v: AtomicValue) -> Result<i64, Error> {
    match v {
        AtomicValue::Integer(i) => Ok(i),
        AtomicValue::UntypedAtomic(s) => s.trim().parse::<i64>().map_err(|_| {
            Error::dynamic(
                ErrorCode::FORG0001,
                format!("cannot convert '{s}' to xs:integer"),
            )
        }),
        other => Err(Error::dynamic(
            ErrorCode::XPTY0004,
            format!("range bounds must be integers, got {}", other.type_name()),
        )),
    }
}

/// Comment content may neither contain `--` nor end with `-`.
fn check_comment(text: &str) -> Result<(), Error> {
    if text.contains("--") || text.ends_with('-') {
        return Err(Error::dynamic(
            ErrorCode::XQDY0072,
            format!("invalid comment content '{text}'"),
        ));
    }
    Ok(())
}

impl Analyzer<'_> {
    pub(crate) fn analyze_literal(&mut self, l: &Literal) -> Analysis {
        let ty = if l.value.is_empty() {
            ItemType::Item
        } else {
            l.value.item_type()
        };
        Analysis::new(Dependency::NONE, Cardinality::from_count(l.value.len()), ty)
    }

    pub(crate) fn analyze_sequence(
        &mut self,
        id: ExprId,
        s: &mut SequenceExpr,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        let mut deps = Dependency::NONE;
        let mut card = Cardinality::Empty;
        let mut ty: Option<ItemType> = None;
        for &item in &s.items {
            let a = self.child(id, item, ctx)?;
            deps |= a.deps;
            card = card.concat(a.cardinality);
            if a.cardinality != Cardinality::Empty {
                ty = Some(ty.map_or(a.static_type, |t| t.common_supertype(a.static_type)));
            }
        }
        Ok(Analysis::new(deps, card, ty.unwrap_or(ItemType::Item)))
    }

    pub(crate) fn analyze_variable(&mut self, v: &mut VariableRef) -> Result<Analysis, Error> {
        let deps = if self.is_local(&v.name) {
            v.local = true;
            Dependency::LOCAL_VARS
        } else if self.static_ctx.in_scope_variables.contains(&v.name) {
            v.local = false;
            Dependency::CONTEXT_VARS
        } else {
            return Err(Error::static_error(
                ErrorCode::XPST0008,
                format!("variable ${} is not declared", v.name),
            ));
        };
        Ok(Analysis::new(deps, Cardinality::ZeroOrMore, ItemType::Item))
    }

    pub(crate) fn analyze_comparison(
        &mut self,
        id: ExprId,
        c: &mut Comparison,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        let l = self.child(id, c.left, ctx)?;
        let r = self.child(id, c.right, ctx)?;
        let card = if c.general {
            Cardinality::ExactlyOne
        } else {
            Cardinality::ZeroOrOne
        };
        Ok(Analysis::new(l.deps | r.deps, card, ItemType::Boolean))
    }

    pub(crate) fn analyze_arithmetic(
        &mut self,
        id: ExprId,
        a: &mut Arithmetic,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        let l = self.child(id, a.left, ctx)?;
        let r = self.child(id, a.right, ctx)?;
        let ty = match (l.static_type, r.static_type) {
            (ItemType::Integer, ItemType::Integer) if a.op == ArithOp::Div => ItemType::Decimal,
            (ItemType::Integer, ItemType::Integer) => ItemType::Integer,
            (_, _) if a.op == ArithOp::IDiv => ItemType::Integer,
            (x, y) if x.is_numeric() && y.is_numeric() => x.common_supertype(y),
            _ => ItemType::AnyAtomic,
        };
        let card = if l.cardinality == Cardinality::ExactlyOne
            && r.cardinality == Cardinality::ExactlyOne
        {
            Cardinality::ExactlyOne
        } else {
            Cardinality::ZeroOrOne
        };
        Ok(Analysis::new(l.deps | r.deps, card, ty))
    }

    pub(crate) fn analyze_range(
        &mut self,
        id: ExprId,
        r: &mut RangeExpr,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        let from = self.child(id, r.from, ctx)?;
        let to = self.child(id, r.to, ctx)?;
        Ok(Analysis::new(
            from.deps | to.deps,
            Cardinality::ZeroOrMore,
            ItemType::Integer,
        ))
    }

    pub(crate) fn analyze_conditional(
        &mut self,
        id: ExprId,
        c: &mut Conditional,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        let test = self.child(id, c.test, ctx)?;
        let then = self.child(id, c.then_branch, ctx)?;
        let other = self.child(id, c.else_branch, ctx)?;
        Ok(Analysis::new(
            test.deps | then.deps | other.deps,
            then.cardinality.join(other.cardinality),
            then.static_type.common_supertype(other.static_type),
        ))
    }

    pub(crate) fn analyze_instance_of(
        &mut self,
        id: ExprId,
        i: &mut InstanceOf,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        let a = self.child(id, i.expr, ctx)?;
        Ok(Analysis::new(a.deps, Cardinality::ExactlyOne, ItemType::Boolean))
    }

    pub(crate) fn analyze_treat_as(
        &mut self,
        id: ExprId,
        t: &mut TreatAs,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        let a = self.child(id, t.expr, ctx)?;
        Ok(Analysis::new(
            a.deps,
            t.seq_type.cardinality,
            t.seq_type.item_type,
        ))
    }

    pub(crate) fn analyze_comment(
        &mut self,
        id: ExprId,
        c: &mut CommentConstructor,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        let a = self.child(id, c.content, ctx)?;
        Ok(Analysis::new(a.deps, Cardinality::ExactlyOne, ItemType::Comment))
    }
}

impl Evaluator<'_> {
    pub(crate) fn eval_sequence(
        &mut self,
        s: &SequenceExpr,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let mut out = Sequence::empty();
        for &id in &s.items {
            let r = self.eval(id, ctx, item)?;
            out = out.concat(r);
        }
        Ok(out)
    }

    pub(crate) fn eval_context_item(
        &mut self,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        self.context_sequence(ctx, item)
    }

    pub(crate) fn eval_root(
        &mut self,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let input = self.context_sequence(ctx, item)?;
        let mut roots = Vec::with_capacity(1);
        for it in input.iter() {
            match it {
                Item::Node(n) => roots.push(n.root()),
                other => {
                    return Err(Error::dynamic(
                        ErrorCode::XPTY0020,
                        format!("'/' requires a node as context item, got {}", other.item_type()),
                    ));
                }
            }
        }
        Ok(Sequence::from_nodes(roots))
    }

    pub(crate) fn eval_variable(&mut self, v: &VariableRef) -> Result<Sequence, Error> {
        let value = if v.local {
            self.state.lookup_local(&v.name)
        } else {
            self.dynamic.variable(&v.name)
        };
        value.cloned().ok_or_else(|| {
            Error::dynamic(
                ErrorCode::XPDY0002,
                format!("variable ${} has no value", v.name),
            )
        })
    }

    pub(crate) fn eval_comparison(
        &mut self,
        c: &Comparison,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let l = self.eval(c.left, ctx, item)?;
        let r = self.eval(c.right, ctx, item)?;
        let collation = self.collation(c.collation.as_deref())?;
        if c.general {
            return Ok(Sequence::boolean(general_compare(c.op, &l, &r, &*collation)?));
        }
        let what = c.op.value_symbol();
        let (Some(a), Some(b)) = (l.zero_or_one_atomic(what)?, r.zero_or_one_atomic(what)?) else {
            return Ok(Sequence::empty());
        };
        Ok(Sequence::boolean(value_compare(c.op, &a, &b, &*collation)?))
    }

    pub(crate) fn eval_arithmetic(
        &mut self,
        a: &Arithmetic,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let l = self.eval(a.left, ctx, item)?;
        let r = self.eval(a.right, ctx, item)?;
        let what = a.op.symbol();
        let (Some(x), Some(y)) = (l.zero_or_one_atomic(what)?, r.zero_or_one_atomic(what)?) else {
            return Ok(Sequence::empty());
        };
        Ok(Sequence::from_item(arithmetic(a.op, &x, &y)?))
    }

    pub(crate) fn eval_range(
        &mut self,
        r: &RangeExpr,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let from = self.eval(r.from, ctx, item)?.zero_or_one_atomic("to")?;
        let to = self.eval(r.to, ctx, item)?.zero_or_one_atomic("to")?;
        let (Some(from), Some(to)) = (from, to) else {
            return Ok(Sequence::empty());
        };
        let (from, to) = (range_bound(from)?, range_bound(to)?);
        Ok(Sequence::from_items((from..=to).map(Item::from).collect()))
    }

    pub(crate) fn eval_conditional(
        &mut self,
        c: &Conditional,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        if self.eval(c.test, ctx, item)?.effective_boolean_value()? {
            self.eval(c.then_branch, ctx, item)
        } else {
            self.eval(c.else_branch, ctx, item)
        }
    }

    pub(crate) fn eval_instance_of(
        &mut self,
        i: &InstanceOf,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let value = self.eval(i.expr, ctx, item)?;
        Ok(Sequence::boolean(i.seq_type.matches(&value)))
    }

    pub(crate) fn eval_treat_as(
        &mut self,
        t: &TreatAs,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let value = self.eval(t.expr, ctx, item)?;
        t.seq_type.check(&value).map_err(|e| {
            Error::dynamic(
                ErrorCode::XPDY0050,
                format!("treat as {} failed", t.seq_type),
            )
            .with_source(e)
        })?;
        Ok(value)
    }

    pub(crate) fn eval_comment(
        &mut self,
        c: &CommentConstructor,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let content = self.eval(c.content, ctx, item)?;
        let parts: Vec<String> = content
            .atomize()?
            .iter()
            .map(ToString::to_string)
            .collect();
        let text = parts.join(" ");
        check_comment(&text)?;
        let doc = self.dynamic.store.create_temporary(vec![comment(&text)]);
        Ok(Sequence::from_item(NodeProxy::new(
            doc,
            NodeId::from_levels(&[1]),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ArithOp::Add, 2, 3, AtomicValue::Integer(5))]
    #[case(ArithOp::Div, 7, 2, AtomicValue::Decimal(3.5))]
    #[case(ArithOp::IDiv, -7, 2, AtomicValue::Integer(-3))]
    #[case(ArithOp::Mod, -7, 2, AtomicValue::Integer(-1))]
    fn integer_arithmetic(
        #[case] op: ArithOp,
        #[case] a: i64,
        #[case] b: i64,
        #[case] expected: AtomicValue,
    ) {
        assert_eq!(
            arithmetic(op, &AtomicValue::Integer(a), &AtomicValue::Integer(b)).unwrap(),
            expected
        );
    }

    #[test]
    fn arithmetic_errors() {
        let max = AtomicValue::Integer(i64::MAX);
        let one = AtomicValue::Integer(1);
        let zero = AtomicValue::Integer(0);
        assert_eq!(
            arithmetic(ArithOp::Add, &max, &one).unwrap_err().code,
            ErrorCode::FOAR0002
        );
        assert_eq!(
            arithmetic(ArithOp::IDiv, &one, &zero).unwrap_err().code,
            ErrorCode::FOAR0001
        );
        assert_eq!(
            arithmetic(ArithOp::Add, &one, &AtomicValue::from("x")).unwrap_err().code,
            ErrorCode::XPTY0004
        );
    }

    #[test]
    fn doubles_follow_ieee() {
        let r = arithmetic(
            ArithOp::Div,
            &AtomicValue::Double(1.0),
            &AtomicValue::Integer(0),
        )
        .unwrap();
        assert_eq!(r, AtomicValue::Double(f64::INFINITY));
        let r = arithmetic(
            ArithOp::Mul,
            &AtomicValue::UntypedAtomic("2".into()),
            &AtomicValue::Integer(3),
        )
        .unwrap();
        assert_eq!(r, AtomicValue::Double(6.0));
    }

    #[rstest]
    #[case("fine", true)]
    #[case("a--b", false)]
    #[case("trailing-", false)]
    #[case("-leading", true)]
    fn comment_content(#[case] text: &str, #[case] ok: bool) {
        assert_eq!(check_comment(text).is_ok(), ok);
    }
}
