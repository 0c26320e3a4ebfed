use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

pub use crate::consts::{CODEPOINT_URI, SIMPLE_ACCENT_URI, SIMPLE_CASE_ACCENT_URI, SIMPLE_CASE_URI};
use crate::error::{Error, ErrorCode};

/// String ordering used by comparisons, `order by` and `group by`.
///
/// `key` must be consistent with `compare`: two strings compare equal iff
/// their keys are equal. Sorting and grouping work on keys.
pub trait Collation: Send + Sync {
    fn uri(&self) -> &str;
    fn compare(&self, a: &str, b: &str) -> Ordering {
        self.key(a).cmp(&self.key(b))
    }
    fn key(&self, s: &str) -> String {
        s.to_string()
    }
}

pub struct CodepointCollation;

impl Collation for CodepointCollation {
    fn uri(&self) -> &str {
        CODEPOINT_URI
    }
    fn compare(&self, a: &str, b: &str) -> Ordering {
        a.cmp(b)
    }
}

/// Case-insensitive
pub struct SimpleCaseCollation;

impl Collation for SimpleCaseCollation {
    fn uri(&self) -> &str {
        SIMPLE_CASE_URI
    }
    fn key(&self, s: &str) -> String {
        s.to_lowercase()
    }
}

fn strip_marks(s: &str) -> String {
    use unicode_normalization::UnicodeNormalization;
    use unicode_normalization::char::canonical_combining_class as ccc;
    s.nfd().filter(|&ch| ccc(ch) == 0).collect()
}

/// Accent-insensitive (NFD, combining marks dropped)
pub struct SimpleAccentCollation;

impl Collation for SimpleAccentCollation {
    fn uri(&self) -> &str {
        SIMPLE_ACCENT_URI
    }
    fn key(&self, s: &str) -> String {
        strip_marks(s)
    }
}

pub struct SimpleCaseAccentCollation;

impl Collation for SimpleCaseAccentCollation {
    fn uri(&self) -> &str {
        SIMPLE_CASE_ACCENT_URI
    }
    fn key(&self, s: &str) -> String {
        strip_marks(s).to_lowercase()
    }
}

/// Collations known to a dynamic context, keyed by URI.
pub struct CollationRegistry {
    by_uri: HashMap<String, Arc<dyn Collation>>,
}

impl Default for CollationRegistry {
    fn default() -> Self {
        let mut reg = Self {
            by_uri: HashMap::new(),
        };
        reg.insert(Arc::new(CodepointCollation));
        reg.insert(Arc::new(SimpleCaseCollation));
        reg.insert(Arc::new(SimpleAccentCollation));
        reg.insert(Arc::new(SimpleCaseAccentCollation));
        reg
    }
}

impl CollationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri: &str) -> Option<Arc<dyn Collation>> {
        self.by_uri.get(uri).cloned()
    }

    pub fn insert(&mut self, collation: Arc<dyn Collation>) {
        self.by_uri.insert(collation.uri().to_string(), collation);
    }

    /// Resolves an explicit collation URI, falling back to `default_uri` and
    /// finally to codepoint order.
    pub fn resolve(
        &self,
        uri: Option<&str>,
        default_uri: &str,
    ) -> Result<Arc<dyn Collation>, Error> {
        let wanted = uri.unwrap_or(default_uri);
        if let Some(c) = self.get(wanted) {
            return Ok(c);
        }
        if uri.is_none() && wanted != CODEPOINT_URI {
            // an unknown default collation degrades to codepoint order
            tracing::debug!(uri = %wanted, "default collation not registered, using codepoint");
            return Ok(Arc::new(CodepointCollation));
        }
        Err(Error::dynamic(
            ErrorCode::FOCH0002,
            format!("unknown collation URI: {wanted}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_and_accent_keys() {
        let reg = CollationRegistry::new();
        let ci = reg.get(SIMPLE_CASE_URI).unwrap();
        assert_eq!(ci.compare("ABC", "abc"), Ordering::Equal);
        let ai = reg.get(SIMPLE_ACCENT_URI).unwrap();
        assert_eq!(ai.compare("café", "cafe"), Ordering::Equal);
        let both = reg.get(SIMPLE_CASE_ACCENT_URI).unwrap();
        assert_eq!(both.key("Éclair"), "eclair");
    }

    #[test]
    fn unknown_explicit_collation_is_an_error() {
        let reg = CollationRegistry::new();
        let err = reg.resolve(Some("urn:nope"), CODEPOINT_URI).err().unwrap();
        assert_eq!(err.code, ErrorCode::FOCH0002);
        assert!(reg.resolve(None, CODEPOINT_URI).is_ok());
    }
}
