//! Pluggable sink for evaluation events.
use std::sync::{Mutex, PoisonError};

use crate::dependency::Dependency;
use crate::expr::ExprId;

/// Receives start/end events for every evaluated expression plus free-form
/// messages at optimization decisions. Callers check [`Profiler::is_enabled`]
/// before building event data.
pub trait Profiler: Send + Sync {
    fn is_enabled(&self) -> bool;

    fn start(&self, expr: ExprId, name: &'static str);

    /// `items` is the result length, `None` if evaluation failed.
    fn end(&self, expr: ExprId, name: &'static str, items: Option<usize>);

    fn message(&self, expr: ExprId, text: &str);

    fn dependencies(&self, _expr: ExprId, _deps: Dependency) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoProfiler;

impl Profiler for NoProfiler {
    fn is_enabled(&self) -> bool {
        false
    }
    fn start(&self, _expr: ExprId, _name: &'static str) {}
    fn end(&self, _expr: ExprId, _name: &'static str, _items: Option<usize>) {}
    fn message(&self, _expr: ExprId, _text: &str) {}
}

/// Forwards events to `tracing` at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProfiler;

impl Profiler for TracingProfiler {
    fn is_enabled(&self) -> bool {
        tracing::enabled!(tracing::Level::TRACE)
    }

    fn start(&self, expr: ExprId, name: &'static str) {
        tracing::trace!(%expr, name, "start");
    }

    fn end(&self, expr: ExprId, name: &'static str, items: Option<usize>) {
        match items {
            Some(items) => tracing::trace!(%expr, name, items, "end"),
            None => tracing::trace!(%expr, name, "failed"),
        }
    }

    fn message(&self, expr: ExprId, text: &str) {
        tracing::trace!(%expr, text);
    }

    fn dependencies(&self, expr: ExprId, deps: Dependency) {
        tracing::trace!(%expr, deps = ?deps.names());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileRecord {
    Start {
        expr: ExprId,
        name: &'static str,
    },
    End {
        expr: ExprId,
        name: &'static str,
        items: Option<usize>,
    },
    Message {
        expr: ExprId,
        text: String,
    },
    Dependencies {
        expr: ExprId,
        deps: Dependency,
    },
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingProfiler {
    records: Mutex<Vec<ProfileRecord>>,
}

impl RecordingProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ProfileRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                ProfileRecord::Message { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Number of times evaluation of `expr` started.
    pub fn starts(&self, expr: ExprId) -> usize {
        self.records()
            .iter()
            .filter(|r| matches!(r, ProfileRecord::Start { expr: e, .. } if *e == expr))
            .count()
    }

    fn push(&self, record: ProfileRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

impl Profiler for RecordingProfiler {
    fn is_enabled(&self) -> bool {
        true
    }

    fn start(&self, expr: ExprId, name: &'static str) {
        self.push(ProfileRecord::Start { expr, name });
    }

    fn end(&self, expr: ExprId, name: &'static str, items: Option<usize>) {
        self.push(ProfileRecord::End { expr, name, items });
    }

    fn message(&self, expr: ExprId, text: &str) {
        self.push(ProfileRecord::Message {
            expr,
            text: text.to_string(),
        });
    }

    fn dependencies(&self, expr: ExprId, deps: Dependency) {
        self.push(ProfileRecord::Dependencies { expr, deps });
    }
}
