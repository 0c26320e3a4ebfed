use std::fmt;

use string_cache::DefaultAtom as Atom;

use crate::consts::{FN_NS, LOCAL_NS};

/// Namespace-qualified name of a variable or function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpandedName {
    pub ns_uri: Option<Atom>,
    pub local: Atom,
}

impl ExpandedName {
    pub fn new(ns_uri: Option<&str>, local: &str) -> Self {
        Self {
            ns_uri: ns_uri.map(Atom::from),
            local: Atom::from(local),
        }
    }

    pub fn local(local: &str) -> Self {
        Self::new(None, local)
    }

    pub fn fn_name(local: &str) -> Self {
        Self::new(Some(FN_NS), local)
    }

    /// Same local name in another namespace.
    pub fn in_namespace(&self, ns_uri: &str) -> Self {
        Self {
            ns_uri: Some(Atom::from(ns_uri)),
            local: self.local.clone(),
        }
    }

    /// Parses `Q{ns}local`, the `fn:` and `local:` prefixes, or a bare name.
    pub fn parse(s: &str) -> Self {
        if let Some(rest) = s.strip_prefix("Q{")
            && let Some((ns, local)) = rest.split_once('}')
        {
            return Self::new(if ns.is_empty() { None } else { Some(ns) }, local);
        }
        if let Some(local) = s.strip_prefix("fn:") {
            return Self::new(Some(FN_NS), local);
        }
        if let Some(local) = s.strip_prefix("local:") {
            return Self::new(Some(LOCAL_NS), local);
        }
        Self::local(s)
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns_uri {
            Some(ns) if &**ns == FN_NS => write!(f, "fn:{}", self.local),
            Some(ns) if &**ns == LOCAL_NS => write!(f, "local:{}", self.local),
            Some(ns) => write!(f, "Q{{{}}}{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}

impl From<&str> for ExpandedName {
    fn from(s: &str) -> Self {
        ExpandedName::parse(s)
    }
}
