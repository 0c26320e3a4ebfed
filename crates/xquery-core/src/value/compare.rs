use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::atomic::AtomicValue;
use super::sequence::{Item, Sequence};
use crate::collation::Collation;
use crate::error::{Error, ErrorCode};

/// Item wrapper with a total order, used for membership tests and
/// duplicate elimination on the generic set-algebra path.
///
/// Nodes sort before atomic values, atomic values before functions. Nodes
/// compare by identity (document, node id), atomic values by value within
/// their comparison class (boolean, numeric, string-like), functions by
/// reference.
#[derive(Debug, Clone)]
pub struct ItemKey(pub Item);

fn rank(item: &Item) -> u8 {
    match item {
        Item::Node(_) => 0,
        Item::Atomic(_) => 1,
        Item::Function(_) => 2,
    }
}

fn atomic_class(a: &AtomicValue) -> u8 {
    match a {
        AtomicValue::Boolean(_) => 0,
        AtomicValue::Integer(_) | AtomicValue::Decimal(_) | AtomicValue::Double(_) => 1,
        AtomicValue::String(_) | AtomicValue::UntypedAtomic(_) | AtomicValue::AnyUri(_) => 2,
    }
}

// NaN equals NaN, -0 equals 0
fn normalized(d: f64) -> f64 {
    if d.is_nan() {
        f64::NAN
    } else if d == 0.0 {
        0.0
    } else {
        d
    }
}

fn total_atomic_cmp(a: &AtomicValue, b: &AtomicValue) -> Ordering {
    let class = atomic_class(a).cmp(&atomic_class(b));
    if class != Ordering::Equal {
        return class;
    }
    match (a, b) {
        (AtomicValue::Boolean(x), AtomicValue::Boolean(y)) => x.cmp(y),
        (AtomicValue::Integer(x), AtomicValue::Integer(y)) => x.cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => normalized(x).total_cmp(&normalized(y)),
            _ => a.as_str().unwrap_or_default().cmp(b.as_str().unwrap_or_default()),
        },
    }
}

impl Ord for ItemKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let r = rank(&self.0).cmp(&rank(&other.0));
        if r != Ordering::Equal {
            return r;
        }
        match (&self.0, &other.0) {
            (Item::Node(a), Item::Node(b)) => a.cmp(b),
            (Item::Atomic(a), Item::Atomic(b)) => total_atomic_cmp(a, b),
            (Item::Function(a), Item::Function(b)) => {
                Arc::as_ptr(a).cast::<()>().cmp(&Arc::as_ptr(b).cast::<()>())
            }
            _ => Ordering::Equal,
        }
    }
}

impl PartialOrd for ItemKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ItemKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ItemKey {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    pub fn general_symbol(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        }
    }

    pub fn value_symbol(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "eq",
            ComparisonOp::Ne => "ne",
            ComparisonOp::Lt => "lt",
            ComparisonOp::Le => "le",
            ComparisonOp::Gt => "gt",
            ComparisonOp::Ge => "ge",
        }
    }

    /// Applies the operator to an ordering. `None` (NaN involved) only
    /// satisfies `!=`.
    pub fn holds(self, ord: Option<Ordering>) -> bool {
        match ord {
            None => self == ComparisonOp::Ne,
            Some(o) => match self {
                ComparisonOp::Eq => o == Ordering::Equal,
                ComparisonOp::Ne => o != Ordering::Equal,
                ComparisonOp::Lt => o == Ordering::Less,
                ComparisonOp::Le => o != Ordering::Greater,
                ComparisonOp::Gt => o == Ordering::Greater,
                ComparisonOp::Ge => o != Ordering::Less,
            },
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.general_symbol())
    }
}

fn incomparable(a: &AtomicValue, b: &AtomicValue) -> Error {
    Error::dynamic(
        ErrorCode::XPTY0004,
        format!("cannot compare {} with {}", a.type_name(), b.type_name()),
    )
}

/// Compares two atomic values of compatible types. Returns `None` when the
/// values are unordered (NaN).
pub fn compare_atomic(
    a: &AtomicValue,
    b: &AtomicValue,
    collation: &dyn Collation,
) -> Result<Option<Ordering>, Error> {
    match (a, b) {
        (AtomicValue::Integer(x), AtomicValue::Integer(y)) => Ok(Some(x.cmp(y))),
        (AtomicValue::Boolean(x), AtomicValue::Boolean(y)) => Ok(Some(x.cmp(y))),
        _ if a.is_numeric() && b.is_numeric() => {
            let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            Ok(x.partial_cmp(&y))
        }
        _ if a.is_string_like() && b.is_string_like() => Ok(Some(
            collation.compare(a.as_str().unwrap_or_default(), b.as_str().unwrap_or_default()),
        )),
        _ => Err(incomparable(a, b)),
    }
}

fn untyped_to_boolean(s: &str) -> Result<bool, Error> {
    match s.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(Error::dynamic(
            ErrorCode::FORG0001,
            format!("cannot convert '{other}' to xs:boolean"),
        )),
    }
}

/// Casts an untyped operand of a general comparison towards the type of
/// the other operand.
fn promote_untyped(value: &AtomicValue, other: &AtomicValue) -> Result<AtomicValue, Error> {
    let AtomicValue::UntypedAtomic(s) = value else {
        return Ok(value.clone());
    };
    match other {
        o if o.is_numeric() => Ok(AtomicValue::Double(AtomicValue::untyped_to_double(s)?)),
        AtomicValue::Boolean(_) => Ok(AtomicValue::Boolean(untyped_to_boolean(s)?)),
        _ => Ok(AtomicValue::String(s.clone())),
    }
}

/// Value comparison (`eq`, `lt`, ...) of two single atomic values. Untyped
/// operands are treated as strings.
pub fn value_compare(
    op: ComparisonOp,
    a: &AtomicValue,
    b: &AtomicValue,
    collation: &dyn Collation,
) -> Result<bool, Error> {
    Ok(op.holds(compare_atomic(a, b, collation)?))
}

/// General comparison (`=`, `<`, ...): true if any pair of atomized items
/// satisfies the operator.
pub fn general_compare(
    op: ComparisonOp,
    left: &Sequence,
    right: &Sequence,
    collation: &dyn Collation,
) -> Result<bool, Error> {
    if left.is_empty() || right.is_empty() {
        return Ok(false);
    }
    let lhs = left.atomize()?;
    let rhs = right.atomize()?;
    for a in &lhs {
        for b in &rhs {
            let pa = promote_untyped(a, b)?;
            let pb = promote_untyped(b, a)?;
            if op.holds(compare_atomic(&pa, &pb, collation)?) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collation::{CodepointCollation, SimpleCaseCollation};
    use rstest::rstest;

    fn seq(values: Vec<AtomicValue>) -> Sequence {
        Sequence::from_items(values.into_iter().map(Item::Atomic).collect())
    }

    #[rstest]
    #[case(AtomicValue::Integer(1), AtomicValue::Double(1.0), Ordering::Equal)]
    #[case(AtomicValue::Double(f64::NAN), AtomicValue::Double(f64::NAN), Ordering::Equal)]
    #[case(AtomicValue::Double(-0.0), AtomicValue::Integer(0), Ordering::Equal)]
    #[case(AtomicValue::Boolean(true), AtomicValue::Integer(0), Ordering::Less)]
    #[case(AtomicValue::Integer(9), AtomicValue::from("1"), Ordering::Less)]
    fn item_key_order(#[case] a: AtomicValue, #[case] b: AtomicValue, #[case] expected: Ordering) {
        assert_eq!(
            ItemKey(Item::Atomic(a)).cmp(&ItemKey(Item::Atomic(b))),
            expected
        );
    }

    #[test]
    fn general_comparison_is_existential() {
        let l = seq(vec![1.into(), 2.into()]);
        let r = seq(vec![2.into(), 3.into()]);
        assert!(general_compare(ComparisonOp::Eq, &l, &r, &CodepointCollation).unwrap());
        assert!(!general_compare(ComparisonOp::Gt, &l, &r, &CodepointCollation).unwrap());
        assert!(
            !general_compare(ComparisonOp::Eq, &Sequence::empty(), &r, &CodepointCollation)
                .unwrap()
        );
    }

    #[test]
    fn untyped_promotes_to_numeric() {
        let l = seq(vec![AtomicValue::UntypedAtomic("10".into())]);
        let r = seq(vec![9.into()]);
        assert!(general_compare(ComparisonOp::Gt, &l, &r, &CodepointCollation).unwrap());
    }

    #[test]
    fn value_comparison_type_errors() {
        let err = value_compare(ComparisonOp::Eq, &1.into(), &"1".into(), &CodepointCollation)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::XPTY0004);
    }

    #[test]
    fn collation_drives_string_equality() {
        let (upper, lower): (AtomicValue, AtomicValue) = ("ABC".into(), "abc".into());
        assert!(value_compare(ComparisonOp::Eq, &upper, &lower, &SimpleCaseCollation).unwrap());
        assert!(!value_compare(ComparisonOp::Eq, &upper, &lower, &CodepointCollation).unwrap());
    }

    #[test]
    fn nan_is_only_unequal() {
        let nan = AtomicValue::Double(f64::NAN);
        assert!(value_compare(ComparisonOp::Ne, &nan, &nan, &CodepointCollation).unwrap());
        assert!(!value_compare(ComparisonOp::Eq, &nan, &nan, &CodepointCollation).unwrap());
    }
}
