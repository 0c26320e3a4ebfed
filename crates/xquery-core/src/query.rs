//! A compiled query: the expression arena, its user functions and the
//! static context it was analyzed against.
use std::sync::Arc;

use crate::analyze::Analyzer;
use crate::context::AnalyzeContext;
use crate::dump::ExpressionDumper;
use crate::error::Error;
use crate::eval::Evaluator;
use crate::expr::{ExprArena, ExprId, ExprNode, FunctionId, UserFunction};
use crate::runtime::{DynamicContext, StaticContext};
use crate::value::Sequence;
use crate::visitor::{ExpressionVisitor, accept};

#[derive(Debug, Clone)]
pub struct Query {
    arena: ExprArena,
    functions: Vec<UserFunction>,
    root: ExprId,
    static_ctx: Option<Arc<StaticContext>>,
}

impl Query {
    pub(crate) fn new(arena: ExprArena, functions: Vec<UserFunction>, root: ExprId) -> Self {
        Self {
            arena,
            functions,
            root,
            static_ctx: None,
        }
    }

    /// Runs static analysis over every declared function body and the query
    /// body. On success the query keeps `static_ctx` for evaluation.
    pub fn analyze(&mut self, static_ctx: StaticContext) -> Result<(), Error> {
        self.static_ctx = None;
        {
            let mut analyzer = Analyzer::new(&mut self.arena, &self.functions, &static_ctx);
            for f in self.functions.iter().filter(|f| !f.inline) {
                analyzer.analyze_function(f)?;
            }
            analyzer.analyze(self.root, &mut AnalyzeContext::new())?;
        }
        tracing::debug!(
            nodes = self.arena.len(),
            functions = self.functions.len(),
            "query analyzed"
        );
        self.static_ctx = Some(Arc::new(static_ctx));
        Ok(())
    }

    pub fn is_analyzed(&self) -> bool {
        self.static_ctx.is_some()
    }

    pub fn static_context(&self) -> Option<&StaticContext> {
        self.static_ctx.as_deref()
    }

    /// An evaluator that can run the query repeatedly against `dynamic`.
    pub fn evaluator<'q>(&'q self, dynamic: &'q DynamicContext) -> Result<Evaluator<'q>, Error> {
        let Some(static_ctx) = self.static_ctx.as_deref() else {
            return Err(Error::internal("query has not been analyzed"));
        };
        Evaluator::new(self, static_ctx, dynamic)
    }

    pub fn evaluate(&self, dynamic: &DynamicContext) -> Result<Sequence, Error> {
        self.evaluator(dynamic)?.evaluate()
    }

    pub fn root(&self) -> ExprId {
        self.root
    }

    pub fn node(&self, id: ExprId) -> Option<&ExprNode> {
        self.arena.get(id)
    }

    pub fn arena(&self) -> &ExprArena {
        &self.arena
    }

    pub fn functions(&self) -> &[UserFunction] {
        &self.functions
    }

    pub fn function(&self, id: FunctionId) -> Option<&UserFunction> {
        self.functions.get(id.index())
    }

    pub fn accept<V: ExpressionVisitor + ?Sized>(&self, visitor: &mut V) {
        accept(visitor, &self.arena, self.root);
    }

    pub fn dump(&self) -> String {
        self.dump_expr(self.root)
    }

    pub fn dump_expr(&self, id: ExprId) -> String {
        ExpressionDumper::new(&self.arena).dump(id)
    }
}
