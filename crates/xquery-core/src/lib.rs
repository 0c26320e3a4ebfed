//! Expression tree, static analysis and evaluation core of a native XML
//! query engine.
//!
//! Trees are built with [`QueryBuilder`], analyzed once with
//! [`Query::analyze`] and evaluated any number of times against a
//! [`DynamicContext`].
pub(crate) mod analyze;
pub mod cardinality;
pub mod collation;
pub mod consts;
pub mod context;
pub mod dependency;
pub mod dump;
pub mod error;
pub mod eval;
pub mod expr;
pub mod functions;
pub mod profiler;
pub mod query;
pub mod runtime;
pub mod selector;
pub mod store;
pub mod types;
pub mod value;
pub mod visitor;

pub use cardinality::Cardinality;
pub use context::{AnalyzeContext, ContextFlags, ContextId};
pub use dependency::Dependency;
pub use error::{Error, ErrorCode, ErrorKind, Location};
pub use eval::Evaluator;
pub use expr::{ExprId, ExprKind, ExprNode, FlworBuilder, Param, QueryBuilder};
pub use functions::{CallContext, FunctionRegistry, NativeFunction, default_function_registry};
pub use profiler::{NoProfiler, ProfileRecord, Profiler, RecordingProfiler, TracingProfiler};
pub use query::Query;
pub use runtime::{
    DynamicContext, DynamicContextBuilder, StaticContext, StaticContextBuilder, XQueryVersion,
};
pub use store::{Document, NodeId, NodeKind, Store};
pub use types::{ItemType, SequenceType};
pub use value::{AtomicValue, ExpandedName, FunctionItem, Item, NodeProxy, NodeSet, Sequence};
pub use visitor::{ExpressionVisitor, LocationStepCollector, VariableReferenceCollector};
