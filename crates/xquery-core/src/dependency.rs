use bitflags::bitflags;

bitflags! {
    /// What part of the dynamic context an expression's value depends on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Dependency: u32 {
        /// Evaluated once against the whole context sequence.
        const CONTEXT_SET = 1;
        /// Must be evaluated once per item of the context sequence.
        const CONTEXT_ITEM = 1 << 1;
        /// References a variable bound by an enclosing clause or parameter.
        const LOCAL_VARS = 1 << 2;
        /// References an externally declared variable.
        const CONTEXT_VARS = 1 << 3;
        /// Reads the context position or size.
        const CONTEXT_POSITION = 1 << 4;
    }
}

impl Dependency {
    pub const NONE: Dependency = Dependency::empty();
    pub const VARS: Dependency = Dependency::LOCAL_VARS.union(Dependency::CONTEXT_VARS);
    pub const DEFAULT: Dependency = Dependency::CONTEXT_SET.union(Dependency::CONTEXT_ITEM);
    pub const FOCUS: Dependency = Dependency::CONTEXT_SET
        .union(Dependency::CONTEXT_ITEM)
        .union(Dependency::CONTEXT_POSITION);

    pub fn depends_on_context_item(self) -> bool {
        self.contains(Dependency::CONTEXT_ITEM)
    }

    pub fn depends_on_focus(self) -> bool {
        self.intersects(Dependency::FOCUS)
    }

    /// Human readable list of the set flags, used by the expression dump.
    pub fn names(self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_lists_individual_flags() {
        let deps = Dependency::CONTEXT_ITEM | Dependency::LOCAL_VARS;
        assert_eq!(deps.names(), vec!["CONTEXT_ITEM", "LOCAL_VARS"]);
        assert!(Dependency::NONE.names().is_empty());
    }

    #[test]
    fn default_is_item_at_a_time() {
        assert!(Dependency::DEFAULT.depends_on_context_item());
        assert!(!Dependency::VARS.depends_on_focus());
    }
}
