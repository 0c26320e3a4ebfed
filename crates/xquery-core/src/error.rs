use std::fmt;
use std::sync::Arc;

use crate::consts::ERR_NS;

/// Source position of an expression in the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Whether an error was raised while analyzing or while evaluating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Static,
    Dynamic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Static => f.write_str("static"),
            ErrorKind::Dynamic => f.write_str("dynamic"),
        }
    }
}

/// Error codes raised by the evaluation core. All codes except `Internal`
/// live in the W3C `err:` namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum ErrorCode {
    FOAR0001, // division by zero
    FOAR0002, // numeric overflow
    FOCH0002, // unknown collation
    FODC0002, // document not available
    FOER0000, // fn:error default
    FORG0001, // invalid value for cast
    FORG0006, // effective boolean value undefined
    FOTY0013, // function item atomized
    XPDY0002, // context item / variable value absent
    XPDY0050, // treat as failure
    XPST0003, // grammar / language level violation
    XPST0008, // undeclared variable
    XPST0017, // unknown function or arity
    XPTY0004, // type error
    XPTY0019, // path step applied to a non-node
    XPTY0020, // axis step context is not a node
    XQDY0072, // invalid comment content
    XQST0094, // grouping variable not in scope
    Internal,
}

impl ErrorCode {
    pub fn local_name(&self) -> &'static str {
        use ErrorCode::*;
        match self {
            FOAR0001 => "FOAR0001",
            FOAR0002 => "FOAR0002",
            FOCH0002 => "FOCH0002",
            FODC0002 => "FODC0002",
            FOER0000 => "FOER0000",
            FORG0001 => "FORG0001",
            FORG0006 => "FORG0006",
            FOTY0013 => "FOTY0013",
            XPDY0002 => "XPDY0002",
            XPDY0050 => "XPDY0050",
            XPST0003 => "XPST0003",
            XPST0008 => "XPST0008",
            XPST0017 => "XPST0017",
            XPTY0004 => "XPTY0004",
            XPTY0019 => "XPTY0019",
            XPTY0020 => "XPTY0020",
            XQDY0072 => "XQDY0072",
            XQST0094 => "XQST0094",
            Internal => "XQC00001",
        }
    }

    pub fn namespace(&self) -> Option<&'static str> {
        match self {
            ErrorCode::Internal => None,
            _ => Some(ERR_NS),
        }
    }

    /// Parses `err:XPTY0004` or a bare `XPTY0004`.
    pub fn from_code(s: &str) -> Option<Self> {
        use ErrorCode::*;
        let local = s.strip_prefix("err:").unwrap_or(s);
        let code = match local {
            "FOAR0001" => FOAR0001,
            "FOAR0002" => FOAR0002,
            "FOCH0002" => FOCH0002,
            "FODC0002" => FODC0002,
            "FOER0000" => FOER0000,
            "FORG0001" => FORG0001,
            "FORG0006" => FORG0006,
            "FOTY0013" => FOTY0013,
            "XPDY0002" => XPDY0002,
            "XPDY0050" => XPDY0050,
            "XPST0003" => XPST0003,
            "XPST0008" => XPST0008,
            "XPST0017" => XPST0017,
            "XPTY0004" => XPTY0004,
            "XPTY0019" => XPTY0019,
            "XPTY0020" => XPTY0020,
            "XQDY0072" => XQDY0072,
            "XQST0094" => XQST0094,
            "XQC00001" => Internal,
            _ => return None,
        };
        Some(code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace().is_some() {
            write!(f, "err:{}", self.local_name())
        } else {
            f.write_str(self.local_name())
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub message: String,
    pub location: Option<Location>,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, msg: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: msg.into(),
            location: None,
            source: None,
        }
    }

    pub fn static_error(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Static, code, msg)
    }

    pub fn dynamic(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Dynamic, code, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Dynamic, ErrorCode::Internal, msg)
    }

    pub fn is_static(&self) -> bool {
        self.kind == ErrorKind::Static
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Stamps `location` unless the error already carries one. Used while an
    /// error propagates up the expression tree so the innermost known
    /// position wins.
    pub fn with_location_if_unset(mut self, location: Option<Location>) -> Self {
        if self.location.is_none() {
            self.location = location;
        }
        self
    }

    pub fn with_source(mut self, source: Error) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn format_code(&self) -> String {
        self.code.to_string()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error {}: {}", self.kind, self.code, self.message)?;
        if let Some(loc) = &self.location {
            write!(f, " [at {loc}]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_is_never_overwritten() {
        let err = Error::dynamic(ErrorCode::XPTY0004, "boom")
            .with_location_if_unset(Some(Location::new(3, 7)))
            .with_location_if_unset(Some(Location::new(1, 1)));
        assert_eq!(err.location, Some(Location::new(3, 7)));
    }

    #[test]
    fn display_includes_code_and_position() {
        let err = Error::static_error(ErrorCode::XPST0008, "undeclared variable $x")
            .with_location(Location::new(2, 5));
        assert_eq!(
            err.to_string(),
            "static error err:XPST0008: undeclared variable $x [at line 2, column 5]"
        );
    }

    #[test]
    fn codes_parse_with_and_without_prefix() {
        assert_eq!(ErrorCode::from_code("err:FORG0006"), Some(ErrorCode::FORG0006));
        assert_eq!(ErrorCode::from_code("XQST0094"), Some(ErrorCode::XQST0094));
        assert_eq!(ErrorCode::from_code("nope"), None);
    }
}
