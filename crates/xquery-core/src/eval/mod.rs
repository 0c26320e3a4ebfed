//! Dynamic evaluation pass.
pub(crate) mod state;

use std::sync::Arc;

use crate::collation::Collation;
use crate::error::{Error, ErrorCode};
use crate::expr::{ExprId, ExprKind, ExprNode};
use crate::functions::CallContext;
use crate::query::Query;
use crate::runtime::{DynamicContext, StaticContext};
use crate::value::{Item, Sequence};

use state::{EvalState, Focus};

/// Walks an analyzed query against a dynamic context.
///
/// The compiled tree is shared and never modified; all state an evaluation
/// produces (bindings, buffers, cached bindings, spawned closures) is owned
/// by the evaluator, so the same query can be evaluated repeatedly and by
/// several evaluators.
pub struct Evaluator<'q> {
    pub(crate) query: &'q Query,
    pub(crate) static_ctx: &'q StaticContext,
    pub(crate) dynamic: &'q DynamicContext,
    pub(crate) state: EvalState,
    pub(crate) default_collation: Arc<dyn Collation>,
}

impl<'q> Evaluator<'q> {
    pub(crate) fn new(
        query: &'q Query,
        static_ctx: &'q StaticContext,
        dynamic: &'q DynamicContext,
    ) -> Result<Self, Error> {
        let default_collation = dynamic
            .collations
            .resolve(None, &static_ctx.default_collation)?;
        Ok(Self {
            query,
            static_ctx,
            dynamic,
            state: EvalState::default(),
            default_collation,
        })
    }

    /// Evaluates the query body with the dynamic context item as focus.
    pub fn evaluate(&mut self) -> Result<Sequence, Error> {
        self.state.clear_transient();
        let item = self.dynamic.context_item.clone();
        let ctx = item.clone().map(Sequence::from_item);
        if item.is_some() {
            self.state.push_focus(Focus {
                position: 1,
                size: 1,
            });
        }
        let result = self.eval(self.query.root(), ctx.as_ref(), item.as_ref());
        self.state.clear_transient();
        result
    }

    /// Evaluates one expression. `ctx` is the context sequence, `item` the
    /// context item when the caller iterates item by item.
    pub fn eval(
        &mut self,
        id: ExprId,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        let query = self.query;
        let Some(node) = query.node(id) else {
            return Err(Error::internal(format!("no expression {id}")));
        };
        let profiler = self.dynamic.profiler.clone();
        let profiling = profiler.is_enabled();
        let name = node.kind.name();
        if profiling {
            profiler.start(id, name);
            profiler.dependencies(id, node.deps);
        }
        let result = self
            .dispatch(node, ctx, item)
            .map_err(|e| e.with_location_if_unset(node.location));
        if profiling {
            profiler.end(id, name, result.as_ref().ok().map(Sequence::len));
        }
        result
    }

    fn dispatch(
        &mut self,
        node: &'q ExprNode,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        match &node.kind {
            ExprKind::Literal(l) => Ok(l.value.clone()),
            ExprKind::Sequence(s) => self.eval_sequence(s, ctx, item),
            ExprKind::ContextItem => self.eval_context_item(ctx, item),
            ExprKind::Root => self.eval_root(ctx, item),
            ExprKind::VariableRef(v) => self.eval_variable(v),
            ExprKind::Path(p) => self.eval_path(p, ctx, item),
            ExprKind::Step(s) => self.eval_step(node, s, ctx, item),
            ExprKind::Predicate(_) => {
                let input = self.context_sequence(ctx, item)?;
                self.eval_predicate(node.id, input, false)
            }
            ExprKind::Filter(f) => self.eval_filter(f, ctx, item),
            ExprKind::Comparison(c) => self.eval_comparison(c, ctx, item),
            ExprKind::Arithmetic(a) => self.eval_arithmetic(a, ctx, item),
            ExprKind::Range(r) => self.eval_range(r, ctx, item),
            ExprKind::If(c) => self.eval_conditional(c, ctx, item),
            ExprKind::InstanceOf(i) => self.eval_instance_of(i, ctx, item),
            ExprKind::TreatAs(t) => self.eval_treat_as(t, ctx, item),
            ExprKind::Comment(c) => self.eval_comment(c, ctx, item),
            ExprKind::Set(s) => self.eval_set(s, ctx, item),
            ExprKind::Logical(l) => self.eval_logical(node, l, ctx, item),
            ExprKind::For(_)
            | ExprKind::Let(_)
            | ExprKind::Where(_)
            | ExprKind::OrderBy(_)
            | ExprKind::GroupBy(_)
            | ExprKind::Count(_)
            | ExprKind::Window(_) => self.eval_clause(node, ctx, item),
            ExprKind::StaticCall(c) => self.eval_static_call(c, ctx, item),
            ExprKind::DynamicCall(c) => self.eval_dynamic_call(c, ctx, item),
            ExprKind::InlineFunction(f) => self.eval_inline_function(node.id, f),
            ExprKind::FunctionRef(r) => self.eval_function_ref(r),
            ExprKind::Detached => Err(Error::internal(format!(
                "expression {} was never attached",
                node.id
            ))),
        }
    }

    /// Clears evaluation state so the compiled tree can be evaluated again.
    /// With `post_optimization` false, cached bindings are dropped and their
    /// update listeners unsubscribed as well.
    pub fn reset_state(&mut self, post_optimization: bool) {
        for listener in self.state.reset(post_optimization) {
            self.dynamic.store.unsubscribe(listener);
        }
    }

    /// Closures created by inline function expressions since the last reset.
    pub fn spawned_closures(&self) -> usize {
        self.state.spawned_count()
    }

    pub fn cached_bindings(&self) -> usize {
        self.state.cached_count()
    }

    /// The context sequence, or the context item as a one-item sequence.
    pub(crate) fn context_sequence(
        &self,
        ctx: Option<&Sequence>,
        item: Option<&Item>,
    ) -> Result<Sequence, Error> {
        match (item, ctx) {
            (Some(item), _) => Ok(Sequence::from_item(item.clone())),
            (None, Some(ctx)) => Ok(ctx.clone()),
            (None, None) => Err(Error::dynamic(
                ErrorCode::XPDY0002,
                "the context item is absent",
            )),
        }
    }

    /// Evaluates `id` once per item of `input`, each time with that item as
    /// focus, concatenating the results.
    pub(crate) fn eval_per_item(
        &mut self,
        id: ExprId,
        input: &Sequence,
    ) -> Result<Sequence, Error> {
        let size = input.len();
        let mut out = Sequence::empty();
        for (i, item) in input.iter().enumerate() {
            self.state.push_focus(Focus {
                position: i + 1,
                size,
            });
            let single = Sequence::from_item(item.clone());
            let r = self.eval(id, Some(&single), Some(&item));
            self.state.pop_focus();
            out = out.concat(r?);
        }
        Ok(out)
    }

    pub(crate) fn collation(&self, uri: Option<&str>) -> Result<Arc<dyn Collation>, Error> {
        match uri {
            None => Ok(self.default_collation.clone()),
            Some(uri) => self
                .dynamic
                .collations
                .resolve(Some(uri), &self.static_ctx.default_collation),
        }
    }

    pub(crate) fn call_context<'c>(&'c self, item: Option<&'c Item>) -> CallContext<'c> {
        CallContext {
            dynamic: self.dynamic,
            static_ctx: self.static_ctx,
            context_item: item,
            focus: self.state.focus().map(|f| (f.position, f.size)),
            default_collation: self.default_collation.clone(),
        }
    }

    /// Reports an optimization decision to the profiler and the log.
    pub(crate) fn note(&self, id: ExprId, text: &str) {
        tracing::debug!(expr = %id, "{text}");
        let profiler = &self.dynamic.profiler;
        if profiler.is_enabled() {
            profiler.message(id, text);
        }
    }
}

impl Drop for Evaluator<'_> {
    fn drop(&mut self) {
        self.reset_state(false);
    }
}
