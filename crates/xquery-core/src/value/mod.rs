//! Value model: items, sequences and the store-backed node set.
mod atomic;
mod compare;
mod function;
mod name;
mod node;
mod node_set;
mod sequence;

pub use atomic::AtomicValue;
pub use compare::{ComparisonOp, ItemKey, compare_atomic, general_compare, value_compare};
pub use function::{Closure, FunctionItem};
pub use name::ExpandedName;
pub use node::{ContextChain, ContextIter, NodeProxy};
pub use node_set::NodeSet;
pub use sequence::{Item, Sequence, SequenceIter};
