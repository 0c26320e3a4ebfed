use std::fmt;

use crate::error::{Error, ErrorCode};

#[derive(Debug, Clone, PartialEq)]
pub enum AtomicValue {
    Boolean(bool),
    String(String),
    UntypedAtomic(String),
    AnyUri(String),
    Integer(i64),
    Decimal(f64),
    Double(f64),
}

impl AtomicValue {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            AtomicValue::Integer(_) | AtomicValue::Decimal(_) | AtomicValue::Double(_)
        )
    }

    pub fn is_string_like(&self) -> bool {
        matches!(
            self,
            AtomicValue::String(_) | AtomicValue::UntypedAtomic(_) | AtomicValue::AnyUri(_)
        )
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            AtomicValue::Integer(i) => Some(*i as f64),
            AtomicValue::Decimal(d) | AtomicValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
                Some(s)
            }
            _ => None,
        }
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, AtomicValue::Double(d) | AtomicValue::Decimal(d) if d.is_nan())
    }

    /// Casts an untyped value to `xs:double` as general comparisons and
    /// arithmetic require.
    pub fn untyped_to_double(s: &str) -> Result<f64, Error> {
        let t = s.trim();
        match t {
            "NaN" => Ok(f64::NAN),
            "INF" | "+INF" => Ok(f64::INFINITY),
            "-INF" => Ok(f64::NEG_INFINITY),
            _ => t.parse::<f64>().map_err(|_| {
                Error::dynamic(
                    ErrorCode::FORG0001,
                    format!("cannot convert '{s}' to xs:double"),
                )
            }),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            AtomicValue::Boolean(_) => "xs:boolean",
            AtomicValue::String(_) => "xs:string",
            AtomicValue::UntypedAtomic(_) => "xs:untypedAtomic",
            AtomicValue::AnyUri(_) => "xs:anyURI",
            AtomicValue::Integer(_) => "xs:integer",
            AtomicValue::Decimal(_) => "xs:decimal",
            AtomicValue::Double(_) => "xs:double",
        }
    }
}

fn format_double(d: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if d.is_nan() {
        f.write_str("NaN")
    } else if d.is_infinite() {
        f.write_str(if d > 0.0 { "INF" } else { "-INF" })
    } else if d == d.trunc() && d.abs() < 1e15 {
        #[allow(clippy::cast_possible_truncation)]
        let i = d as i64;
        write!(f, "{i}")
    } else {
        write!(f, "{d}")
    }
}

impl fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomicValue::Boolean(b) => write!(f, "{b}"),
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => {
                f.write_str(s)
            }
            AtomicValue::Integer(i) => write!(f, "{i}"),
            AtomicValue::Decimal(d) | AtomicValue::Double(d) => format_double(*d, f),
        }
    }
}

impl From<bool> for AtomicValue {
    fn from(b: bool) -> Self {
        AtomicValue::Boolean(b)
    }
}

impl From<i64> for AtomicValue {
    fn from(i: i64) -> Self {
        AtomicValue::Integer(i)
    }
}

impl From<f64> for AtomicValue {
    fn from(d: f64) -> Self {
        AtomicValue::Double(d)
    }
}

impl From<&str> for AtomicValue {
    fn from(s: &str) -> Self {
        AtomicValue::String(s.to_string())
    }
}

impl From<String> for AtomicValue {
    fn from(s: String) -> Self {
        AtomicValue::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_canonical_forms() {
        assert_eq!(AtomicValue::Double(2.0).to_string(), "2");
        assert_eq!(AtomicValue::Double(2.5).to_string(), "2.5");
        assert_eq!(AtomicValue::Double(f64::NAN).to_string(), "NaN");
        assert_eq!(AtomicValue::Integer(-7).to_string(), "-7");
    }

    #[test]
    fn untyped_cast() {
        assert_eq!(AtomicValue::untyped_to_double(" 4.5 ").unwrap(), 4.5);
        assert!(AtomicValue::untyped_to_double("abc").is_err());
    }
}
