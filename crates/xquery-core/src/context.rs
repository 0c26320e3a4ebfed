//! Context descriptor threaded through static analysis.
use std::fmt;

use bitflags::bitflags;

use crate::expr::ExprId;
use crate::types::ItemType;

/// Correlation scope attached to result nodes. A scope is named after the
/// expression (predicate, where clause, step) that opened it, so ids are
/// unique per compiled query and never reused while the scope is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContextId {
    #[default]
    None,
    Scope(ExprId),
}

impl ContextId {
    pub fn is_none(self) -> bool {
        matches!(self, ContextId::None)
    }

    pub fn scope(self) -> Option<ExprId> {
        match self {
            ContextId::None => None,
            ContextId::Scope(id) => Some(id),
        }
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextId::None => f.write_str("-"),
            ContextId::Scope(id) => write!(f, "{id}"),
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ContextFlags: u32 {
        const IN_PREDICATE = 1;
        const IN_WHERE_CLAUSE = 1 << 1;
        const IN_UPDATE = 1 << 2;
        /// The current step is `.` or `self::node()`.
        const DOT_TEST = 1 << 3;
        const SINGLE_STEP_EXECUTION = 1 << 4;
        const UNORDERED = 1 << 5;
    }
}

/// Descriptor handed from a parent to each child during analysis. Every
/// child gets its own copy; flags a node sets for its children never leak
/// to siblings.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeContext {
    pub parent: Option<ExprId>,
    pub flags: ContextFlags,
    pub context_id: ContextId,
    /// Item type of the value the analyzed expression returns. Set by the
    /// child on its way out so the parent can read it.
    pub static_return_type: ItemType,
}

impl AnalyzeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy for a child of `parent`.
    pub fn for_child(&self, parent: ExprId) -> Self {
        Self {
            parent: Some(parent),
            flags: self.flags,
            context_id: self.context_id,
            static_return_type: ItemType::Item,
        }
    }

    pub fn with_flags(mut self, flags: ContextFlags) -> Self {
        self.flags.insert(flags);
        self
    }

    pub fn without_flags(mut self, flags: ContextFlags) -> Self {
        self.flags.remove(flags);
        self
    }

    pub fn with_context_id(mut self, context_id: ContextId) -> Self {
        self.context_id = context_id;
        self
    }

    pub fn in_predicate(&self) -> bool {
        self.flags.contains(ContextFlags::IN_PREDICATE)
    }

    pub fn in_where_clause(&self) -> bool {
        self.flags.contains(ContextFlags::IN_WHERE_CLAUSE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_copies_do_not_leak_to_siblings() {
        let root = AnalyzeContext::new().with_flags(ContextFlags::UNORDERED);
        let left = root
            .for_child(ExprId::new(1))
            .with_flags(ContextFlags::IN_PREDICATE);
        let right = root.for_child(ExprId::new(1));
        assert!(left.in_predicate());
        assert!(!right.in_predicate());
        assert!(right.flags.contains(ContextFlags::UNORDERED));
        assert_eq!(right.parent, Some(ExprId::new(1)));
    }

    #[test]
    fn scope_display() {
        assert_eq!(ContextId::None.to_string(), "-");
        assert_eq!(ContextId::Scope(ExprId::new(4)).to_string(), "#4");
        assert_eq!(ContextId::Scope(ExprId::new(4)).scope(), Some(ExprId::new(4)));
    }
}
