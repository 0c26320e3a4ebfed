//! Static cardinality lattice.
//!
//! A cardinality is a set of three independent bits: the sequence may be
//! empty, may hold exactly one item, may hold more than one item. Only six
//! combinations are meaningful; "zero or many but never one" does not exist
//! and is normalized to zero-or-more.
use std::fmt;

const ZERO: u8 = 0b001;
const ONE: u8 = 0b010;
const MANY: u8 = 0b100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cardinality {
    Empty,
    ExactlyOne,
    ZeroOrOne,
    /// More than one item; never empty, never a single item.
    Many,
    OneOrMore,
    #[default]
    ZeroOrMore,
}

impl Cardinality {
    pub const fn bits(self) -> u8 {
        match self {
            Cardinality::Empty => ZERO,
            Cardinality::ExactlyOne => ONE,
            Cardinality::ZeroOrOne => ZERO | ONE,
            Cardinality::Many => MANY,
            Cardinality::OneOrMore => ONE | MANY,
            Cardinality::ZeroOrMore => ZERO | ONE | MANY,
        }
    }

    /// Builds a cardinality from raw bits. A set without any bit is treated
    /// as empty, `ZERO | MANY` widens to zero-or-more.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & (ZERO | ONE | MANY) {
            0 | ZERO => Cardinality::Empty,
            ONE => Cardinality::ExactlyOne,
            0b011 => Cardinality::ZeroOrOne,
            MANY => Cardinality::Many,
            0b110 => Cardinality::OneOrMore,
            _ => Cardinality::ZeroOrMore,
        }
    }

    pub fn from_count(count: usize) -> Self {
        match count {
            0 => Cardinality::Empty,
            1 => Cardinality::ExactlyOne,
            _ => Cardinality::Many,
        }
    }

    /// Least upper bound of two cardinalities.
    pub fn super_cardinality_of(a: Cardinality, b: Cardinality) -> Cardinality {
        Cardinality::from_bits(a.bits() | b.bits())
    }

    pub fn join(self, other: Cardinality) -> Cardinality {
        Cardinality::super_cardinality_of(self, other)
    }

    /// True if every count allowed by `self` is also allowed by `other`.
    pub fn is_sub_cardinality_of(self, other: Cardinality) -> bool {
        self.bits() & other.bits() == self.bits()
    }

    pub fn is_super_cardinality_of(self, other: Cardinality) -> bool {
        other.is_sub_cardinality_of(self)
    }

    pub fn allows_empty(self) -> bool {
        self.bits() & ZERO != 0
    }

    pub fn allows_many(self) -> bool {
        self.bits() & MANY != 0
    }

    pub fn at_least_one(self) -> bool {
        !self.allows_empty()
    }

    pub fn at_most_one(self) -> bool {
        !self.allows_many()
    }

    pub fn matches_count(self, count: usize) -> bool {
        Cardinality::from_count(count).is_sub_cardinality_of(self)
    }

    // (min, max) with 2 standing for "more than one"
    fn bounds(self) -> (u8, u8) {
        match self {
            Cardinality::Empty => (0, 0),
            Cardinality::ExactlyOne => (1, 1),
            Cardinality::ZeroOrOne => (0, 1),
            Cardinality::Many => (2, 2),
            Cardinality::OneOrMore => (1, 2),
            Cardinality::ZeroOrMore => (0, 2),
        }
    }

    fn from_bounds(min: u8, max: u8) -> Self {
        match (min.min(2), max.min(2)) {
            (0, 0) => Cardinality::Empty,
            (0, 1) => Cardinality::ZeroOrOne,
            (0, _) => Cardinality::ZeroOrMore,
            (1, 1) => Cardinality::ExactlyOne,
            (1, _) => Cardinality::OneOrMore,
            _ => Cardinality::Many,
        }
    }

    /// Cardinality of the concatenation of two sequences.
    pub fn concat(self, other: Cardinality) -> Cardinality {
        let (amin, amax) = self.bounds();
        let (bmin, bmax) = other.bounds();
        Cardinality::from_bounds(amin + bmin, amax + bmax)
    }

    /// Cardinality of `for $x in <self> return <other>`.
    pub fn repeat(self, body: Cardinality) -> Cardinality {
        let (amin, amax) = self.bounds();
        let (bmin, bmax) = body.bounds();
        Cardinality::from_bounds(amin * bmin, amax * bmax)
    }

    /// Same cardinality but also admitting the empty sequence.
    pub fn or_empty(self) -> Cardinality {
        Cardinality::from_bits(self.bits() | ZERO)
    }

    pub fn occurrence_indicator(self) -> &'static str {
        match self {
            Cardinality::Empty | Cardinality::ExactlyOne => "",
            Cardinality::ZeroOrOne => "?",
            Cardinality::Many | Cardinality::OneOrMore => "+",
            Cardinality::ZeroOrMore => "*",
        }
    }

    pub const ALL: [Cardinality; 6] = [
        Cardinality::Empty,
        Cardinality::ExactlyOne,
        Cardinality::ZeroOrOne,
        Cardinality::Many,
        Cardinality::OneOrMore,
        Cardinality::ZeroOrMore,
    ];
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Cardinality::Empty => "empty",
            Cardinality::ExactlyOne => "exactly one",
            Cardinality::ZeroOrOne => "zero or one",
            Cardinality::Many => "more than one",
            Cardinality::OneOrMore => "one or more",
            Cardinality::ZeroOrMore => "zero or more",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Cardinality::Empty, Cardinality::Many, Cardinality::ZeroOrMore)]
    #[case(Cardinality::ExactlyOne, Cardinality::Many, Cardinality::OneOrMore)]
    #[case(Cardinality::Empty, Cardinality::ExactlyOne, Cardinality::ZeroOrOne)]
    #[case(Cardinality::ZeroOrOne, Cardinality::OneOrMore, Cardinality::ZeroOrMore)]
    fn join_normalizes(
        #[case] a: Cardinality,
        #[case] b: Cardinality,
        #[case] expected: Cardinality,
    ) {
        assert_eq!(Cardinality::super_cardinality_of(a, b), expected);
    }

    #[test]
    fn join_is_closed_and_commutative() {
        for a in Cardinality::ALL {
            for b in Cardinality::ALL {
                let j = a.join(b);
                assert!(Cardinality::ALL.contains(&j));
                assert_eq!(j, b.join(a));
                assert!(a.is_sub_cardinality_of(j));
                assert!(b.is_sub_cardinality_of(j));
            }
        }
    }

    #[rstest]
    #[case(Cardinality::ExactlyOne, Cardinality::ExactlyOne, Cardinality::Many)]
    #[case(Cardinality::Empty, Cardinality::ZeroOrOne, Cardinality::ZeroOrOne)]
    #[case(Cardinality::ZeroOrOne, Cardinality::ExactlyOne, Cardinality::OneOrMore)]
    fn concat_adds_bounds(
        #[case] a: Cardinality,
        #[case] b: Cardinality,
        #[case] expected: Cardinality,
    ) {
        assert_eq!(a.concat(b), expected);
    }

    #[test]
    fn counts_match() {
        assert!(Cardinality::OneOrMore.matches_count(3));
        assert!(!Cardinality::OneOrMore.matches_count(0));
        assert!(Cardinality::ZeroOrOne.matches_count(0));
        assert!(!Cardinality::ExactlyOne.matches_count(2));
    }
}
