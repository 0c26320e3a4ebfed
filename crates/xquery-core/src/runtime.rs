//! Static and dynamic evaluation contexts.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::collation::CollationRegistry;
use crate::consts::{CODEPOINT_URI, FN_NS};
use crate::functions::{FunctionRegistry, default_function_registry};
use crate::profiler::{NoProfiler, Profiler};
use crate::store::Store;
use crate::value::{ExpandedName, Item, Sequence};

/// Language level the query was written against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum XQueryVersion {
    V1_0,
    V3_0,
    #[default]
    V3_1,
}

#[derive(Clone)]
pub struct StaticContext {
    pub version: XQueryVersion,
    pub default_function_namespace: Option<String>,
    pub default_collation: String,
    pub in_scope_variables: HashSet<ExpandedName>,
    pub functions: Arc<FunctionRegistry>,
    /// Lets a where clause directly after a for clause filter the whole
    /// input set at once.
    pub where_fast_track: bool,
}

impl Default for StaticContext {
    fn default() -> Self {
        Self {
            version: XQueryVersion::default(),
            default_function_namespace: Some(FN_NS.to_string()),
            default_collation: CODEPOINT_URI.to_string(),
            in_scope_variables: HashSet::new(),
            functions: Arc::new(default_function_registry()),
            where_fast_track: true,
        }
    }
}

impl std::fmt::Debug for StaticContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticContext")
            .field("version", &self.version)
            .field("default_function_namespace", &self.default_function_namespace)
            .field("default_collation", &self.default_collation)
            .field("in_scope_variables", &self.in_scope_variables)
            .field("where_fast_track", &self.where_fast_track)
            .finish_non_exhaustive()
    }
}

/// Builder for [`StaticContext`].
///
/// The static context is captured by [`crate::Query::analyze`]; changing it
/// afterwards has no effect on an analyzed query.
pub struct StaticContextBuilder {
    ctx: StaticContext,
}

impl Default for StaticContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: StaticContext::default(),
        }
    }

    pub fn with_version(mut self, version: XQueryVersion) -> Self {
        self.ctx.version = version;
        self
    }

    pub fn with_default_function_namespace(mut self, uri: impl Into<String>) -> Self {
        self.ctx.default_function_namespace = Some(uri.into());
        self
    }

    pub fn with_default_collation(mut self, uri: impl Into<String>) -> Self {
        self.ctx.default_collation = uri.into();
        self
    }

    /// Declares an external variable that may be referenced without a
    /// local binding.
    pub fn with_variable(mut self, name: &str) -> Self {
        self.ctx.in_scope_variables.insert(ExpandedName::parse(name));
        self
    }

    pub fn with_functions(mut self, reg: Arc<FunctionRegistry>) -> Self {
        self.ctx.functions = reg;
        self
    }

    pub fn with_where_fast_track(mut self, enabled: bool) -> Self {
        self.ctx.where_fast_track = enabled;
        self
    }

    pub fn build(self) -> StaticContext {
        self.ctx
    }
}

#[derive(Clone)]
pub struct DynamicContext {
    pub context_item: Option<Item>,
    pub variables: HashMap<ExpandedName, Sequence>,
    pub store: Arc<Store>,
    pub collations: Arc<CollationRegistry>,
    pub profiler: Arc<dyn Profiler>,
}

impl Default for DynamicContext {
    fn default() -> Self {
        Self {
            context_item: None,
            variables: HashMap::new(),
            store: Arc::new(Store::new()),
            collations: Arc::new(CollationRegistry::default()),
            profiler: Arc::new(NoProfiler),
        }
    }
}

impl DynamicContext {
    pub fn variable(&self, name: &ExpandedName) -> Option<&Sequence> {
        self.variables.get(name)
    }
}

pub struct DynamicContextBuilder {
    ctx: DynamicContext,
}

impl Default for DynamicContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: DynamicContext::default(),
        }
    }

    pub fn with_context_item(mut self, item: impl Into<Item>) -> Self {
        self.ctx.context_item = Some(item.into());
        self
    }

    pub fn with_variable(mut self, name: &str, value: impl Into<Sequence>) -> Self {
        self.ctx
            .variables
            .insert(ExpandedName::parse(name), value.into());
        self
    }

    pub fn with_store(mut self, store: Arc<Store>) -> Self {
        self.ctx.store = store;
        self
    }

    pub fn with_collations(mut self, reg: Arc<CollationRegistry>) -> Self {
        self.ctx.collations = reg;
        self
    }

    pub fn with_profiler(mut self, profiler: Arc<dyn Profiler>) -> Self {
        self.ctx.profiler = profiler;
        self
    }

    pub fn build(self) -> DynamicContext {
        self.ctx
    }
}
