//! Registry of native functions and the small builtin library the core
//! relies on.
use std::collections::HashMap;
use std::sync::Arc;

use crate::collation::Collation;
use crate::consts::FN_NS;
use crate::dependency::Dependency;
use crate::error::{Error, ErrorCode};
use crate::expr::ArithOp;
use crate::expr::basic::arithmetic;
use crate::runtime::{DynamicContext, StaticContext};
use crate::types::{ItemType, SequenceType};
use crate::value::{AtomicValue, ExpandedName, Item, NodeProxy, Sequence};

pub type Arity = usize;

/// What a native function can see of its caller.
pub struct CallContext<'a> {
    pub dynamic: &'a DynamicContext,
    pub static_ctx: &'a StaticContext,
    pub context_item: Option<&'a Item>,
    /// Context position and size, if a focus is active.
    pub focus: Option<(usize, usize)>,
    pub default_collation: Arc<dyn Collation>,
}

pub type FunctionImpl =
    Arc<dyn Fn(&CallContext<'_>, &[Sequence]) -> Result<Sequence, Error> + Send + Sync>;

#[derive(Clone)]
pub struct NativeFunction {
    pub min_arity: Arity,
    pub max_arity: Option<Arity>,
    /// Context the function reads besides its arguments.
    pub dependencies: Dependency,
    pub return_type: SequenceType,
    pub func: FunctionImpl,
}

impl NativeFunction {
    fn accepts(&self, arity: Arity) -> bool {
        arity >= self.min_arity && self.max_arity.is_none_or(|m| arity <= m)
    }
}

/// Error type returned by function resolution.
#[derive(Debug, Clone)]
pub enum ResolveError {
    /// No function with the (possibly default-namespace resolved) name exists.
    Unknown(ExpandedName),
    /// Function exists, but not for the requested arity.
    WrongArity {
        name: ExpandedName,
        available: Vec<Arity>,
    },
}

impl From<ResolveError> for Error {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::Unknown(name) => {
                Error::static_error(ErrorCode::XPST0017, format!("unknown function {name}"))
            }
            ResolveError::WrongArity { name, available } => Error::static_error(
                ErrorCode::XPST0017,
                format!("function {name} is not available with this arity (known: {available:?})"),
            ),
        }
    }
}

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    fns: HashMap<ExpandedName, Vec<NativeFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an implementation for an arity range. With `max_arity` of
    /// `None` the function is variadic. Among overlapping ranges the most
    /// specific one (highest minimum, then smallest maximum) wins.
    pub fn register_range(&mut self, name: ExpandedName, function: NativeFunction) {
        let overloads = self.fns.entry(name).or_default();
        overloads.push(function);
        overloads.sort_by(|a, b| {
            b.min_arity
                .cmp(&a.min_arity)
                .then_with(|| match (a.max_arity, b.max_arity) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
        });
    }

    /// Convenience: register an exact-arity function without context
    /// dependencies returning `item()*`.
    pub fn register_fn<F>(&mut self, name: ExpandedName, arity: Arity, f: F)
    where
        F: 'static + Send + Sync + Fn(&CallContext<'_>, &[Sequence]) -> Result<Sequence, Error>,
    {
        self.register_range(
            name,
            NativeFunction {
                min_arity: arity,
                max_arity: Some(arity),
                dependencies: Dependency::NONE,
                return_type: SequenceType::star(ItemType::Item),
                func: Arc::new(f),
            },
        );
    }

    /// Convenience: register a function in a namespace.
    pub fn register_ns<F>(&mut self, ns_uri: &str, local: &str, arity: Arity, f: F)
    where
        F: 'static + Send + Sync + Fn(&CallContext<'_>, &[Sequence]) -> Result<Sequence, Error>,
    {
        self.register_fn(ExpandedName::new(Some(ns_uri), local), arity, f);
    }

    fn builtin<F>(
        &mut self,
        local: &str,
        min_arity: Arity,
        max_arity: Option<Arity>,
        dependencies: Dependency,
        return_type: SequenceType,
        f: F,
    ) where
        F: 'static + Send + Sync + Fn(&CallContext<'_>, &[Sequence]) -> Result<Sequence, Error>,
    {
        self.register_range(
            ExpandedName::fn_name(local),
            NativeFunction {
                min_arity,
                max_arity,
                dependencies,
                return_type,
                func: Arc::new(f),
            },
        );
    }

    /// Resolves a function by name and arity. A name without namespace is
    /// first looked up as is, then in `default_ns`.
    pub fn resolve(
        &self,
        name: &ExpandedName,
        arity: Arity,
        default_ns: Option<&str>,
    ) -> Result<&NativeFunction, ResolveError> {
        if let Some(f) = self
            .fns
            .get(name)
            .and_then(|c| c.iter().find(|f| f.accepts(arity)))
        {
            return Ok(f);
        }
        let effective = match (&name.ns_uri, default_ns) {
            (None, Some(ns)) => name.in_namespace(ns),
            _ => name.clone(),
        };
        let Some(cands) = self.fns.get(&effective) else {
            return Err(ResolveError::Unknown(effective));
        };
        if let Some(f) = cands.iter().find(|f| f.accepts(arity)) {
            return Ok(f);
        }
        let mut available: Vec<Arity> = cands
            .iter()
            .filter_map(|f| f.max_arity.map(|max| f.min_arity..=max))
            .flatten()
            .collect();
        available.sort_unstable();
        available.dedup();
        Err(ResolveError::WrongArity {
            name: effective,
            available,
        })
    }

    /// Name under which `name` resolves, with the default namespace applied
    /// when needed.
    pub fn resolved_name(
        &self,
        name: &ExpandedName,
        arity: Arity,
        default_ns: Option<&str>,
    ) -> ExpandedName {
        if self
            .fns
            .get(name)
            .is_some_and(|c| c.iter().any(|f| f.accepts(arity)))
        {
            return name.clone();
        }
        match (&name.ns_uri, default_ns) {
            (None, Some(ns)) => name.in_namespace(ns),
            _ => name.clone(),
        }
    }
}

fn boolean(b: bool) -> Result<Sequence, Error> {
    Ok(Sequence::boolean(b))
}

fn context_item<'a>(ctx: &CallContext<'a>, function: &str) -> Result<&'a Item, Error> {
    ctx.context_item.ok_or_else(|| {
        Error::dynamic(
            ErrorCode::XPDY0002,
            format!("fn:{function}() requires a context item"),
        )
    })
}

fn focus(ctx: &CallContext<'_>, function: &str) -> Result<(usize, usize), Error> {
    ctx.focus.ok_or_else(|| {
        Error::dynamic(
            ErrorCode::XPDY0002,
            format!("fn:{function}() requires a focus"),
        )
    })
}

fn usize_to_integer(n: usize) -> Sequence {
    Sequence::integer(i64::try_from(n).unwrap_or(i64::MAX))
}

fn string_of(seq: &Sequence) -> Result<String, Error> {
    match seq.len() {
        0 => Ok(String::new()),
        1 => seq.first().map_or(Ok(String::new()), |i| i.string_value()),
        n => Err(Error::dynamic(
            ErrorCode::XPTY0004,
            format!("expected at most one item, got {n}"),
        )),
    }
}

fn sum(values: Vec<AtomicValue>) -> Result<Option<AtomicValue>, Error> {
    let mut acc: Option<AtomicValue> = None;
    for v in values {
        let v = match v {
            AtomicValue::UntypedAtomic(s) => {
                AtomicValue::Double(AtomicValue::untyped_to_double(&s)?)
            }
            other => other,
        };
        if !v.is_numeric() {
            return Err(Error::dynamic(
                ErrorCode::FORG0006,
                format!("fn:sum() cannot add {}", v.type_name()),
            ));
        }
        acc = Some(match acc {
            None => v,
            Some(a) => arithmetic(ArithOp::Add, &a, &v)?,
        });
    }
    Ok(acc)
}

/// Registry with the builtins the core needs: boolean logic, cardinality
/// tests, string/data conversion, summation, focus access, `fn:error` and
/// `fn:doc`.
pub fn default_function_registry() -> FunctionRegistry {
    let mut reg = FunctionRegistry::new();
    let bool_one = SequenceType::one(ItemType::Boolean);
    let int_one = SequenceType::one(ItemType::Integer);
    let string_one = SequenceType::one(ItemType::String);
    let none = Dependency::NONE;

    reg.builtin("true", 0, Some(0), none, bool_one, |_, _| boolean(true));
    reg.builtin("false", 0, Some(0), none, bool_one, |_, _| boolean(false));
    reg.builtin("not", 1, Some(1), none, bool_one, |_, args| {
        boolean(!args[0].effective_boolean_value()?)
    });
    reg.builtin("boolean", 1, Some(1), none, bool_one, |_, args| {
        boolean(args[0].effective_boolean_value()?)
    });
    reg.builtin("count", 1, Some(1), none, int_one, |_, args| {
        Ok(usize_to_integer(args[0].len()))
    });
    reg.builtin("empty", 1, Some(1), none, bool_one, |_, args| {
        boolean(args[0].is_empty())
    });
    reg.builtin("exists", 1, Some(1), none, bool_one, |_, args| {
        boolean(!args[0].is_empty())
    });
    reg.builtin(
        "string",
        0,
        Some(0),
        Dependency::CONTEXT_ITEM,
        string_one,
        |ctx, _| {
            let item = context_item(ctx, "string")?;
            Ok(Sequence::from_item(AtomicValue::String(item.string_value()?)))
        },
    );
    reg.builtin("string", 1, Some(1), none, string_one, |_, args| {
        Ok(Sequence::from_item(AtomicValue::String(string_of(&args[0])?)))
    });
    reg.builtin(
        "data",
        0,
        Some(0),
        Dependency::CONTEXT_ITEM,
        SequenceType::star(ItemType::AnyAtomic),
        |ctx, _| {
            let item = context_item(ctx, "data")?;
            Ok(Sequence::from_item(item.atomize()?))
        },
    );
    reg.builtin(
        "data",
        1,
        Some(1),
        none,
        SequenceType::star(ItemType::AnyAtomic),
        |_, args| {
            Ok(Sequence::from_items(
                args[0].atomize()?.into_iter().map(Item::Atomic).collect(),
            ))
        },
    );
    reg.builtin("concat", 2, None, none, string_one, |_, args| {
        let mut out = String::new();
        for a in args {
            out.push_str(&string_of(a)?);
        }
        Ok(Sequence::from_item(AtomicValue::String(out)))
    });
    reg.builtin(
        "sum",
        1,
        Some(2),
        none,
        SequenceType::optional(ItemType::AnyAtomic),
        |_, args| match sum(args[0].atomize()?)? {
            Some(total) => Ok(Sequence::from_item(total)),
            None if args.len() > 1 => Ok(args[1].clone()),
            None => Ok(Sequence::integer(0)),
        },
    );
    reg.builtin(
        "position",
        0,
        Some(0),
        Dependency::CONTEXT_POSITION,
        int_one,
        |ctx, _| Ok(usize_to_integer(focus(ctx, "position")?.0)),
    );
    reg.builtin(
        "last",
        0,
        Some(0),
        Dependency::CONTEXT_POSITION,
        int_one,
        |ctx, _| Ok(usize_to_integer(focus(ctx, "last")?.1)),
    );
    reg.builtin(
        "error",
        0,
        Some(2),
        none,
        SequenceType::empty(),
        |_, args| {
            let code = match args.first() {
                Some(c) => string_of(c)?,
                None => String::new(),
            };
            let code = ErrorCode::from_code(&code).unwrap_or(ErrorCode::FOER0000);
            let message = match args.get(1) {
                Some(m) => string_of(m)?,
                None => "error signalled by fn:error()".to_string(),
            };
            Err(Error::dynamic(code, message))
        },
    );
    reg.builtin(
        "doc",
        1,
        Some(1),
        none,
        SequenceType::optional(ItemType::Document),
        |ctx, args| {
            if args[0].is_empty() {
                return Ok(Sequence::empty());
            }
            let uri = string_of(&args[0])?;
            match ctx.dynamic.store.document_by_uri(&uri) {
                Some(doc) => Ok(Sequence::from_item(NodeProxy::document_node(doc))),
                None => Err(Error::dynamic(
                    ErrorCode::FODC0002,
                    format!("document '{uri}' is not available"),
                )),
            }
        },
    );
    reg
}

/// Builtins live in the `fn:` namespace.
pub fn builtin_name(local: &str) -> ExpandedName {
    ExpandedName::new(Some(FN_NS), local)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_through_default_namespace() {
        let reg = default_function_registry();
        let name = ExpandedName::local("count");
        assert!(reg.resolve(&name, 1, Some(FN_NS)).is_ok());
        assert!(matches!(
            reg.resolve(&name, 1, None),
            Err(ResolveError::Unknown(_))
        ));
        match reg.resolve(&name, 3, Some(FN_NS)) {
            Err(ResolveError::WrongArity { available, .. }) => assert_eq!(available, vec![1]),
            _ => panic!("expected an arity error"),
        }
    }

    #[test]
    fn concat_is_variadic() {
        let reg = default_function_registry();
        let name = builtin_name("concat");
        assert!(reg.resolve(&name, 5, None).is_ok());
        assert!(reg.resolve(&name, 1, None).is_err());
    }

    #[test]
    fn specific_arity_wins() {
        let reg = default_function_registry();
        let f = reg.resolve(&builtin_name("string"), 0, None).unwrap();
        assert_eq!(f.dependencies, Dependency::CONTEXT_ITEM);
        let f = reg.resolve(&builtin_name("string"), 1, None).unwrap();
        assert_eq!(f.dependencies, Dependency::NONE);
    }

    #[test]
    fn sum_promotes_untyped() {
        let total = sum(vec![AtomicValue::Integer(1), AtomicValue::UntypedAtomic("2.5".into())])
            .unwrap();
        assert_eq!(total, Some(AtomicValue::Double(3.5)));
    }
}
