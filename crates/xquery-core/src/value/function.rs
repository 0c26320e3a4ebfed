use std::fmt;
use std::sync::Arc;

use super::name::ExpandedName;
use super::sequence::Sequence;
use crate::expr::FunctionId;

/// Snapshot of the local variables visible where an inline function was
/// evaluated.
#[derive(Debug, Default)]
pub struct Closure {
    pub(crate) captured: Vec<(ExpandedName, Sequence)>,
}

impl Closure {
    pub fn new(captured: Vec<(ExpandedName, Sequence)>) -> Self {
        Self { captured }
    }

    pub fn captured(&self) -> &[(ExpandedName, Sequence)] {
        &self.captured
    }

    pub fn lookup(&self, name: &ExpandedName) -> Option<&Sequence> {
        self.captured
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// A function value.
pub enum FunctionItem {
    /// Declared or inline user function, optionally bound to a closure.
    User {
        function: FunctionId,
        name: Option<ExpandedName>,
        arity: usize,
        closure: Option<Arc<Closure>>,
    },
    /// Reference to a registered native function.
    Builtin { name: ExpandedName, arity: usize },
    /// Partial application: `bound` holds one slot per parameter of `target`,
    /// `None` marking a placeholder that the eventual caller supplies.
    Partial {
        target: Arc<FunctionItem>,
        bound: Vec<Option<Sequence>>,
    },
}

impl FunctionItem {
    pub fn arity(&self) -> usize {
        match self {
            FunctionItem::User { arity, .. } | FunctionItem::Builtin { arity, .. } => *arity,
            FunctionItem::Partial { bound, .. } => bound.iter().filter(|b| b.is_none()).count(),
        }
    }

    pub fn name(&self) -> Option<&ExpandedName> {
        match self {
            FunctionItem::User { name, .. } => name.as_ref(),
            FunctionItem::Builtin { name, .. } => Some(name),
            FunctionItem::Partial { .. } => None,
        }
    }
}

impl fmt::Debug for FunctionItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}#{}", name, self.arity()),
            None => write!(f, "function#{}", self.arity()),
        }
    }
}
