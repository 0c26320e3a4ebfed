//! Item type lattice and sequence types.
use std::fmt;

use crate::cardinality::Cardinality;
use crate::error::{Error, ErrorCode};
use crate::store::NodeKind;
use crate::value::{AtomicValue, Item, Sequence};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ItemType {
    #[default]
    Item,
    Node,
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    AnyAtomic,
    UntypedAtomic,
    String,
    AnyUri,
    Boolean,
    Numeric,
    Decimal,
    Integer,
    Double,
    Function,
}

impl ItemType {
    pub fn parent(self) -> Option<ItemType> {
        use ItemType::*;
        match self {
            Item => None,
            Node | AnyAtomic | Function => Some(Item),
            Document | Element | Attribute | Text | Comment | ProcessingInstruction => Some(Node),
            UntypedAtomic | String | AnyUri | Boolean | Numeric => Some(AnyAtomic),
            Decimal | Double => Some(Numeric),
            Integer => Some(Decimal),
        }
    }

    pub fn is_subtype_of(self, other: ItemType) -> bool {
        let mut cur = Some(self);
        while let Some(t) = cur {
            if t == other {
                return true;
            }
            cur = t.parent();
        }
        false
    }

    /// Most specific type both arguments are subtypes of.
    pub fn common_supertype(self, other: ItemType) -> ItemType {
        let mut cur = Some(self);
        while let Some(t) = cur {
            if other.is_subtype_of(t) {
                return t;
            }
            cur = t.parent();
        }
        ItemType::Item
    }

    pub fn is_node(self) -> bool {
        self.is_subtype_of(ItemType::Node)
    }

    pub fn is_atomic(self) -> bool {
        self.is_subtype_of(ItemType::AnyAtomic)
    }

    pub fn is_numeric(self) -> bool {
        self.is_subtype_of(ItemType::Numeric)
    }

    pub fn of_node_kind(kind: NodeKind) -> ItemType {
        match kind {
            NodeKind::Document => ItemType::Document,
            NodeKind::Element => ItemType::Element,
            NodeKind::Attribute => ItemType::Attribute,
            NodeKind::Text => ItemType::Text,
            NodeKind::Comment => ItemType::Comment,
            NodeKind::ProcessingInstruction => ItemType::ProcessingInstruction,
        }
    }

    pub fn of_atomic(value: &AtomicValue) -> ItemType {
        match value {
            AtomicValue::Boolean(_) => ItemType::Boolean,
            AtomicValue::String(_) => ItemType::String,
            AtomicValue::UntypedAtomic(_) => ItemType::UntypedAtomic,
            AtomicValue::AnyUri(_) => ItemType::AnyUri,
            AtomicValue::Integer(_) => ItemType::Integer,
            AtomicValue::Decimal(_) => ItemType::Decimal,
            AtomicValue::Double(_) => ItemType::Double,
        }
    }

    pub fn of_item(item: &Item) -> ItemType {
        match item {
            Item::Node(n) => ItemType::of_node_kind(n.kind()),
            Item::Atomic(a) => ItemType::of_atomic(a),
            Item::Function(_) => ItemType::Function,
        }
    }

    pub fn name(self) -> &'static str {
        use ItemType::*;
        match self {
            Item => "item()",
            Node => "node()",
            Document => "document-node()",
            Element => "element()",
            Attribute => "attribute()",
            Text => "text()",
            Comment => "comment()",
            ProcessingInstruction => "processing-instruction()",
            AnyAtomic => "xs:anyAtomicType",
            UntypedAtomic => "xs:untypedAtomic",
            String => "xs:string",
            AnyUri => "xs:anyURI",
            Boolean => "xs:boolean",
            Numeric => "xs:numeric",
            Decimal => "xs:decimal",
            Integer => "xs:integer",
            Double => "xs:double",
            Function => "function(*)",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An item type together with an occurrence indicator, as used by
/// `instance of`, `treat as` and declared parameter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceType {
    pub item_type: ItemType,
    pub cardinality: Cardinality,
}

impl SequenceType {
    pub const fn new(item_type: ItemType, cardinality: Cardinality) -> Self {
        Self {
            item_type,
            cardinality,
        }
    }

    pub const fn one(item_type: ItemType) -> Self {
        Self::new(item_type, Cardinality::ExactlyOne)
    }

    pub const fn optional(item_type: ItemType) -> Self {
        Self::new(item_type, Cardinality::ZeroOrOne)
    }

    pub const fn star(item_type: ItemType) -> Self {
        Self::new(item_type, Cardinality::ZeroOrMore)
    }

    pub const fn plus(item_type: ItemType) -> Self {
        Self::new(item_type, Cardinality::OneOrMore)
    }

    pub const fn empty() -> Self {
        Self::new(ItemType::Item, Cardinality::Empty)
    }

    pub fn matches(&self, seq: &Sequence) -> bool {
        if !self.cardinality.matches_count(seq.len()) {
            return false;
        }
        seq.iter()
            .all(|item| ItemType::of_item(&item).is_subtype_of(self.item_type))
    }

    /// Like [`SequenceType::matches`] but reports a type error describing the
    /// first violation.
    pub fn check(&self, seq: &Sequence) -> Result<(), Error> {
        if !self.cardinality.matches_count(seq.len()) {
            return Err(Error::dynamic(
                ErrorCode::XPTY0004,
                format!(
                    "expected {} item(s) of {}, got a sequence of length {}",
                    self.cardinality,
                    self.item_type,
                    seq.len()
                ),
            ));
        }
        for item in seq.iter() {
            let actual = ItemType::of_item(&item);
            if !actual.is_subtype_of(self.item_type) {
                return Err(Error::dynamic(
                    ErrorCode::XPTY0004,
                    format!("expected {}, got {}", self.item_type, actual),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cardinality == Cardinality::Empty {
            return f.write_str("empty-sequence()");
        }
        write!(f, "{}{}", self.item_type, self.cardinality.occurrence_indicator())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ItemType::Integer, ItemType::Numeric, true)]
    #[case(ItemType::Integer, ItemType::Double, false)]
    #[case(ItemType::Element, ItemType::Node, true)]
    #[case(ItemType::Node, ItemType::Element, false)]
    #[case(ItemType::Function, ItemType::Item, true)]
    fn subtype(#[case] a: ItemType, #[case] b: ItemType, #[case] expected: bool) {
        assert_eq!(a.is_subtype_of(b), expected);
    }

    #[rstest]
    #[case(ItemType::Integer, ItemType::Double, ItemType::Numeric)]
    #[case(ItemType::Element, ItemType::Text, ItemType::Node)]
    #[case(ItemType::String, ItemType::Element, ItemType::Item)]
    #[case(ItemType::Integer, ItemType::Decimal, ItemType::Decimal)]
    fn supertype(#[case] a: ItemType, #[case] b: ItemType, #[case] expected: ItemType) {
        assert_eq!(a.common_supertype(b), expected);
        assert_eq!(b.common_supertype(a), expected);
    }

    #[test]
    fn sequence_type_display() {
        assert_eq!(SequenceType::star(ItemType::Integer).to_string(), "xs:integer*");
        assert_eq!(SequenceType::empty().to_string(), "empty-sequence()");
    }
}
