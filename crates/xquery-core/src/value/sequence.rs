use std::collections::BTreeSet;
use std::sync::Arc;

use super::atomic::AtomicValue;
use super::compare::ItemKey;
use super::function::FunctionItem;
use super::node::NodeProxy;
use super::node_set::NodeSet;
use crate::error::{Error, ErrorCode};
use crate::types::ItemType;

#[derive(Debug, Clone)]
pub enum Item {
    Node(NodeProxy),
    Atomic(AtomicValue),
    Function(Arc<FunctionItem>),
}

impl Item {
    pub fn is_node(&self) -> bool {
        matches!(self, Item::Node(_))
    }

    pub fn as_node(&self) -> Option<&NodeProxy> {
        match self {
            Item::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_atomic(&self) -> Option<&AtomicValue> {
        match self {
            Item::Atomic(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Arc<FunctionItem>> {
        match self {
            Item::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn item_type(&self) -> ItemType {
        ItemType::of_item(self)
    }

    /// Typed value of the item: nodes atomize to their string value as
    /// `xs:untypedAtomic`.
    pub fn atomize(&self) -> Result<AtomicValue, Error> {
        match self {
            Item::Node(n) => Ok(AtomicValue::UntypedAtomic(n.string_value())),
            Item::Atomic(a) => Ok(a.clone()),
            Item::Function(_) => Err(Error::dynamic(
                ErrorCode::FOTY0013,
                "function items cannot be atomized",
            )),
        }
    }

    pub fn string_value(&self) -> Result<String, Error> {
        match self {
            Item::Node(n) => Ok(n.string_value()),
            Item::Atomic(a) => Ok(a.to_string()),
            Item::Function(_) => Err(Error::dynamic(
                ErrorCode::FOTY0013,
                "function items have no string value",
            )),
        }
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Item::Node(a), Item::Node(b)) => a == b,
            (Item::Atomic(a), Item::Atomic(b)) => a == b,
            (Item::Function(a), Item::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<AtomicValue> for Item {
    fn from(a: AtomicValue) -> Self {
        Item::Atomic(a)
    }
}

impl From<NodeProxy> for Item {
    fn from(n: NodeProxy) -> Self {
        Item::Node(n)
    }
}

impl From<i64> for Item {
    fn from(i: i64) -> Self {
        Item::Atomic(AtomicValue::Integer(i))
    }
}

impl From<bool> for Item {
    fn from(b: bool) -> Self {
        Item::Atomic(AtomicValue::Boolean(b))
    }
}

impl From<&str> for Item {
    fn from(s: &str) -> Self {
        Item::Atomic(AtomicValue::String(s.to_string()))
    }
}

impl From<f64> for Item {
    fn from(d: f64) -> Self {
        Item::Atomic(AtomicValue::Double(d))
    }
}

/// Result of evaluating an expression.
///
/// `Nodes` is the structural form: a node set backed by the store, always
/// in document order and free of duplicates, supporting merge-based set
/// algebra and context correlation. `Values` is an arbitrary ordered
/// sequence.
#[derive(Debug, Clone)]
pub enum Sequence {
    Values(Vec<Item>),
    Nodes(NodeSet),
}

impl Default for Sequence {
    fn default() -> Self {
        Sequence::Values(Vec::new())
    }
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl Sequence {
    pub fn empty() -> Self {
        Sequence::default()
    }

    pub fn from_items(items: Vec<Item>) -> Self {
        Sequence::Values(items)
    }

    /// A one-item sequence; a stored node becomes a singleton node set.
    pub fn from_item(item: impl Into<Item>) -> Self {
        match item.into() {
            Item::Node(n) if n.is_persistent() => Sequence::Nodes(NodeSet::single(n)),
            other => Sequence::Values(vec![other]),
        }
    }

    pub fn boolean(b: bool) -> Self {
        Sequence::Values(vec![Item::Atomic(AtomicValue::Boolean(b))])
    }

    pub fn integer(i: i64) -> Self {
        Sequence::Values(vec![Item::Atomic(AtomicValue::Integer(i))])
    }

    /// Nodes in document order without duplicates. Stored nodes form a
    /// persistent node set.
    pub fn from_nodes<I: IntoIterator<Item = NodeProxy>>(nodes: I) -> Self {
        let set = NodeSet::from_nodes(nodes);
        if set.is_persistent() {
            Sequence::Nodes(set)
        } else {
            Sequence::Values(set.into_vec().into_iter().map(Item::Node).collect())
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Sequence::Values(v) => v.len(),
            Sequence::Nodes(n) => n.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> SequenceIter<'_> {
        match self {
            Sequence::Values(v) => SequenceIter::Values(v.iter()),
            Sequence::Nodes(n) => SequenceIter::Nodes(n.iter()),
        }
    }

    pub fn get(&self, index: usize) -> Option<Item> {
        match self {
            Sequence::Values(v) => v.get(index).cloned(),
            Sequence::Nodes(n) => n.as_slice().get(index).cloned().map(Item::Node),
        }
    }

    pub fn first(&self) -> Option<Item> {
        self.get(0)
    }

    pub fn into_items(self) -> Vec<Item> {
        match self {
            Sequence::Values(v) => v,
            Sequence::Nodes(n) => n.into_vec().into_iter().map(Item::Node).collect(),
        }
    }

    /// Appends `other`, keeping both orders.
    pub fn concat(self, other: Sequence) -> Sequence {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        let mut items = self.into_items();
        items.extend(other.into_items());
        Sequence::Values(items)
    }

    pub fn is_persistent_set(&self) -> bool {
        matches!(self, Sequence::Nodes(_))
    }

    pub fn is_all_nodes(&self) -> bool {
        match self {
            Sequence::Nodes(_) => true,
            Sequence::Values(v) => v.iter().all(Item::is_node),
        }
    }

    /// Most specific item type covering all items.
    pub fn item_type(&self) -> ItemType {
        let mut it = self.iter();
        let Some(first) = it.next() else {
            return ItemType::Item;
        };
        it.fold(first.item_type(), |acc, item| acc.common_supertype(item.item_type()))
    }

    pub fn to_node_set(&self) -> Result<NodeSet, Error> {
        match self {
            Sequence::Nodes(n) => Ok(n.clone()),
            Sequence::Values(v) => {
                let mut nodes = Vec::with_capacity(v.len());
                for item in v {
                    match item {
                        Item::Node(n) => nodes.push(n.clone()),
                        other => {
                            return Err(Error::dynamic(
                                ErrorCode::XPTY0004,
                                format!("expected a node, got {}", other.item_type()),
                            ));
                        }
                    }
                }
                Ok(NodeSet::from_nodes(nodes))
            }
        }
    }

    pub fn effective_boolean_value(&self) -> Result<bool, Error> {
        let Some(first) = self.first() else {
            return Ok(false);
        };
        match first {
            Item::Node(_) => Ok(true),
            Item::Atomic(a) if self.len() == 1 => match a {
                AtomicValue::Boolean(b) => Ok(b),
                AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
                    Ok(!s.is_empty())
                }
                AtomicValue::Integer(i) => Ok(i != 0),
                AtomicValue::Decimal(d) | AtomicValue::Double(d) => Ok(!(d == 0.0 || d.is_nan())),
            },
            Item::Atomic(a) => Err(Error::dynamic(
                ErrorCode::FORG0006,
                format!(
                    "effective boolean value undefined for a sequence of {} items starting with {}",
                    self.len(),
                    a.type_name()
                ),
            )),
            Item::Function(_) => Err(Error::dynamic(
                ErrorCode::FORG0006,
                "effective boolean value undefined for a function item",
            )),
        }
    }

    /// Drops repeated items, keeping the first occurrence. Nodes compare by
    /// identity, atomic values by value.
    pub fn remove_duplicates(self) -> Sequence {
        match self {
            Sequence::Nodes(_) => self,
            Sequence::Values(items) => {
                let mut seen: BTreeSet<ItemKey> = BTreeSet::new();
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if seen.insert(ItemKey(item.clone())) {
                        out.push(item);
                    }
                }
                Sequence::Values(out)
            }
        }
    }

    /// Sorts node-only sequences into document order. Sequences containing
    /// other items keep their order.
    pub fn sort_in_document_order(self) -> Sequence {
        match self {
            Sequence::Values(mut items) if !items.is_empty() && items.iter().all(Item::is_node) => {
                items.sort_by(|a, b| match (a, b) {
                    (Item::Node(x), Item::Node(y)) => x.cmp(y),
                    _ => std::cmp::Ordering::Equal,
                });
                Sequence::Values(items)
            }
            other => other,
        }
    }

    pub fn atomize(&self) -> Result<Vec<AtomicValue>, Error> {
        self.iter().map(|i| i.atomize()).collect()
    }

    /// At most one atomized value, raising a type error for longer
    /// sequences.
    pub fn zero_or_one_atomic(&self, what: &str) -> Result<Option<AtomicValue>, Error> {
        match self.len() {
            0 => Ok(None),
            1 => match self.first() {
                Some(item) => item.atomize().map(Some),
                None => Ok(None),
            },
            n => Err(Error::dynamic(
                ErrorCode::XPTY0004,
                format!("{what} requires at most one item, got {n}"),
            )),
        }
    }
}

impl From<Item> for Sequence {
    fn from(item: Item) -> Self {
        Sequence::from_item(item)
    }
}

impl From<Vec<Item>> for Sequence {
    fn from(items: Vec<Item>) -> Self {
        Sequence::Values(items)
    }
}

impl From<NodeSet> for Sequence {
    fn from(set: NodeSet) -> Self {
        Sequence::Nodes(set)
    }
}

pub enum SequenceIter<'a> {
    Values(std::slice::Iter<'a, Item>),
    Nodes(std::slice::Iter<'a, NodeProxy>),
}

impl Iterator for SequenceIter<'_> {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        match self {
            SequenceIter::Values(it) => it.next().cloned(),
            SequenceIter::Nodes(it) => it.next().map(|n| Item::Node(n.clone())),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            SequenceIter::Values(it) => it.size_hint(),
            SequenceIter::Nodes(it) => it.size_hint(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ints(v: &[i64]) -> Sequence {
        Sequence::from_items(v.iter().map(|i| Item::from(*i)).collect())
    }

    #[rstest]
    #[case(Sequence::empty(), false)]
    #[case(Sequence::boolean(true), true)]
    #[case(Sequence::integer(0), false)]
    #[case(Sequence::from_item("x"), true)]
    #[case(Sequence::from_item(f64::NAN), false)]
    fn ebv(#[case] seq: Sequence, #[case] expected: bool) {
        assert_eq!(seq.effective_boolean_value().unwrap(), expected);
    }

    #[test]
    fn ebv_of_many_atomics_is_an_error() {
        let err = ints(&[1, 2]).effective_boolean_value().unwrap_err();
        assert_eq!(err.code, ErrorCode::FORG0006);
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let seq = Sequence::from_items(vec![
            Item::from(3),
            Item::from(1),
            Item::from(3.0),
            Item::from("1"),
            Item::from(1),
        ]);
        let out = seq.remove_duplicates();
        assert_eq!(
            out,
            Sequence::from_items(vec![Item::from(3), Item::from(1), Item::from("1")])
        );
    }
}
