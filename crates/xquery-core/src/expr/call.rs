//! Function calls, function items and inline functions.
use std::sync::Arc;

use crate::analyze::{Analysis, Analyzer};
use crate::cardinality::Cardinality;
use crate::context::AnalyzeContext;
use crate::dependency::Dependency;
use crate::error::{Error, ErrorCode};
use crate::eval::Evaluator;
use crate::expr::{ExprId, FunctionId, UserFunction};
use crate::types::ItemType;
use crate::value::{Closure, ExpandedName, FunctionItem, Item, Sequence};

/// What a call or function reference resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    User(FunctionId),
    Builtin(ExpandedName),
}

/// `name(args)` with the callee known by name.
#[derive(Debug, Clone)]
pub struct StaticCall {
    pub name: ExpandedName,
    pub args: Vec<ExprId>,
    /// Filled in by analysis.
    pub target: Option<CallTarget>,
}

/// `$f(args)`. A `None` argument is a `?` placeholder and turns the call
/// into a partial application.
#[derive(Debug, Clone)]
pub struct DynamicCall {
    pub callee: ExprId,
    pub args: Vec<Option<ExprId>>,
}

impl DynamicCall {
    pub fn is_partial(&self) -> bool {
        self.args.iter().any(Option::is_none)
    }
}

#[derive(Debug, Clone)]
pub struct InlineFunction {
    pub function: FunctionId,
    pub body: ExprId,
}

/// `name#arity`.
#[derive(Debug, Clone)]
pub struct NamedFunctionRef {
    pub name: ExpandedName,
    pub arity: usize,
    pub target: Option<CallTarget>,
}

fn describe(f: &UserFunction) -> String {
    match &f.name {
        Some(name) => format!("{name}#{}", f.arity()),
        None => format!("anonymous function#{}", f.arity()),
    }
}

impl Analyzer<'_> {
    pub(crate) fn analyze_static_call(
        &mut self,
        id: ExprId,
        c: &mut StaticCall,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        let mut deps = Dependency::NONE;
        for &arg in &c.args {
            deps |= self.child(id, arg, ctx)?.deps;
        }
        let arity = c.args.len();
        if let Some(fid) = self.find_function(&c.name, arity) {
            c.target = Some(CallTarget::User(fid));
            let (card, ty) = self
                .function(fid)
                .and_then(|f| f.return_type)
                .map_or((Cardinality::ZeroOrMore, ItemType::Item), |t| {
                    (t.cardinality, t.item_type)
                });
            return Ok(Analysis::new(deps, card, ty));
        }
        let sc = self.static_ctx;
        let default_ns = sc.default_function_namespace.as_deref();
        let native = sc.functions.resolve(&c.name, arity, default_ns)?;
        c.target = Some(CallTarget::Builtin(
            sc.functions.resolved_name(&c.name, arity, default_ns),
        ));
        Ok(Analysis::new(
            deps | native.dependencies,
            native.return_type.cardinality,
            native.return_type.item_type,
        ))
    }

    pub(crate) fn analyze_dynamic_call(
        &mut self,
        id: ExprId,
        c: &mut DynamicCall,
        ctx: &AnalyzeContext,
    ) -> Result<Analysis, Error> {
        self.require_v3("dynamic function call")?;
        let mut deps = self.child(id, c.callee, ctx)?.deps;
        for arg in c.args.iter().flatten() {
            deps |= self.child(id, *arg, ctx)?.deps;
        }
        if c.is_partial() {
            return Ok(Analysis::new(
                deps,
                Cardinality::ExactlyOne,
                ItemType::Function,
            ));
        }
        Ok(Analysis::new(deps, Cardinality::ZeroOrMore, ItemType::Item))
    }

    /// The body is analyzed where the literal appears: enclosing local
    /// variables stay in scope and become part of the closure.
    pub(crate) fn analyze_inline_function(
        &mut self,
        id: ExprId,
        f: &mut InlineFunction,
    ) -> Result<Analysis, Error> {
        self.require_v3("inline function")?;
        let Some(params) = self
            .function(f.function)
            .map(|u| u.params.iter().map(|p| p.name.clone()).collect::<Vec<_>>())
        else {
            return Err(Error::internal(format!("no function {}", f.function)));
        };
        let mark = self.scope_len();
        for p in &params {
            self.push_var(p);
        }
        let body = self.child(id, f.body, &AnalyzeContext::new());
        self.truncate_scope(mark);
        let body = body?;
        Ok(Analysis::new(
            body.deps & Dependency::VARS,
            Cardinality::ExactlyOne,
            ItemType::Function,
        ))
    }

    /// Unresolvable references are reported when evaluated.
    pub(crate) fn analyze_function_ref(
        &mut self,
        r: &mut NamedFunctionRef,
    ) -> Result<Analysis, Error> {
        self.require_v3("named function reference")?;
        r.target = match self.find_function(&r.name, r.arity) {
            Some(fid) => Some(CallTarget::User(fid)),
            None => {
                let sc = self.static_ctx;
                let default_ns = sc.default_function_namespace.as_deref();
                sc.functions
                    .resolve(&r.name, r.arity, default_ns)
                    .ok()
                    .map(|_| {
                        let name = sc.functions.resolved_name(&r.name, r.arity, default_ns);
                        CallTarget::Builtin(name)
                    })
            }
        };
        Ok(Analysis::new(
            Dependency::NONE,
            Cardinality::ExactlyOne,
            ItemType::Function,
        ))
    }
}

impl Evaluator<'_> {
    /// Arguments are evaluated left to right against the caller's focus.
    pub(crate) fn eval_static_call(
        &mut self,
        c: &StaticCall,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let mut args = Vec::with_capacity(c.args.len());
        for &arg in &c.args {
            args.push(self.eval(arg, ctx, item)?);
        }
        match &c.target {
            Some(CallTarget::User(fid)) => self.invoke_user(*fid, None, args),
            Some(CallTarget::Builtin(name)) => self.invoke_builtin(name, &args, item),
            None => Err(Error::internal(format!(
                "call to {} was never resolved",
                c.name
            ))),
        }
    }

    pub(crate) fn eval_dynamic_call(
        &mut self,
        c: &DynamicCall,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let callee = self.eval(c.callee, ctx, item)?;
        let function = match (callee.len(), callee.first()) {
            (1, Some(Item::Function(f))) => f,
            (n, _) => {
                return Err(Error::dynamic(
                    ErrorCode::XPTY0004,
                    format!("dynamic call target must be a single function item, got {n} items"),
                ));
            }
        };
        if function.arity() != c.args.len() {
            return Err(Error::dynamic(
                ErrorCode::XPTY0004,
                format!(
                    "function of arity {} called with {} arguments",
                    function.arity(),
                    c.args.len()
                ),
            ));
        }
        let mut bound = Vec::with_capacity(c.args.len());
        for arg in &c.args {
            bound.push(match arg {
                Some(e) => Some(self.eval(*e, ctx, item)?),
                None => None,
            });
        }
        if bound.iter().any(Option::is_none) {
            let partial = FunctionItem::Partial {
                target: function,
                bound,
            };
            return Ok(Sequence::from_items(vec![Item::Function(Arc::new(partial))]));
        }
        self.apply(&function, bound.into_iter().flatten().collect(), item)
    }

    /// Each evaluation yields a fresh function item over a snapshot of the
    /// locals visible at this point.
    pub(crate) fn eval_inline_function(
        &mut self,
        id: ExprId,
        f: &InlineFunction,
    ) -> Result<Sequence, Error> {
        let arity = self
            .query
            .function(f.function)
            .map_or(0, UserFunction::arity);
        let closure = Closure::new(self.state.visible_locals());
        let function = Arc::new(FunctionItem::User {
            function: f.function,
            name: None,
            arity,
            closure: Some(Arc::new(closure)),
        });
        self.state.record_spawned(id, function.clone());
        Ok(Sequence::from_items(vec![Item::Function(function)]))
    }

    pub(crate) fn eval_function_ref(&mut self, r: &NamedFunctionRef) -> Result<Sequence, Error> {
        let function = match &r.target {
            Some(CallTarget::User(fid)) => FunctionItem::User {
                function: *fid,
                name: Some(r.name.clone()),
                arity: r.arity,
                closure: None,
            },
            Some(CallTarget::Builtin(name)) => FunctionItem::Builtin {
                name: name.clone(),
                arity: r.arity,
            },
            None => {
                return Err(Error::dynamic(
                    ErrorCode::XPST0017,
                    format!("function {}#{} is not defined", r.name, r.arity),
                ));
            }
        };
        Ok(Sequence::from_items(vec![Item::Function(Arc::new(function))]))
    }

    /// Calls a function item with all of its arguments supplied.
    pub(crate) fn apply(
        &mut self,
        function: &Arc<FunctionItem>,
        args: Vec<Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        match &**function {
            FunctionItem::User {
                function, closure, ..
            } => self.invoke_user(*function, closure.as_deref(), args),
            FunctionItem::Builtin { name, .. } => self.invoke_builtin(name, &args, item),
            FunctionItem::Partial { target, bound } => {
                let mut supplied = args.into_iter();
                let full = bound
                    .iter()
                    .map(|b| match b {
                        Some(v) => v.clone(),
                        None => supplied.next().unwrap_or_default(),
                    })
                    .collect();
                self.apply(target, full, item)
            }
        }
    }

    fn invoke_builtin(
        &mut self,
        name: &ExpandedName,
        args: &[Sequence],
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let native = self.static_ctx.functions.resolve(name, args.len(), None)?;
        let call_ctx = self.call_context(item);
        (native.func)(&call_ctx, args)
    }

    /// Runs a user function body in a fresh frame: caller locals are hidden,
    /// closure values and parameters are bound, and there is no focus.
    fn invoke_user(
        &mut self,
        fid: FunctionId,
        closure: Option<&Closure>,
        args: Vec<Sequence>,
    ) -> Result<Sequence, Error> {
        let query = self.query;
        let Some(f) = query.function(fid) else {
            return Err(Error::internal(format!("no function {fid}")));
        };
        if f.arity() != args.len() {
            return Err(Error::dynamic(
                ErrorCode::XPTY0004,
                format!("{} called with {} arguments", describe(f), args.len()),
            ));
        }
        for (i, (param, value)) in f.params.iter().zip(&args).enumerate() {
            if let Some(t) = &param.seq_type {
                t.check(value).map_err(|e| {
                    Error::dynamic(
                        ErrorCode::XPTY0004,
                        format!("checking function parameter {} in call {}", i + 1, describe(f)),
                    )
                    .with_source(e)
                })?;
            }
        }
        let floor = self.state.push_floor();
        if let Some(closure) = closure {
            for (name, value) in closure.captured() {
                self.state.push_local(name.clone(), value.clone());
            }
        }
        for (param, value) in f.params.iter().zip(args) {
            self.state.push_local(param.name.clone(), value);
        }
        tracing::trace!(function = %fid, "invoke");
        let result = self.eval(f.body, None, None);
        self.state.pop_floor(floor);
        let result = result.map_err(|e| e.with_location_if_unset(f.location))?;
        if let Some(t) = &f.return_type {
            t.check(&result).map_err(|e| {
                Error::dynamic(
                    ErrorCode::XPTY0004,
                    format!("return value of {}", describe(f)),
                )
                .with_source(e)
            })?;
        }
        Ok(result)
    }
}
