//! Evaluation-scoped mutable state, kept apart from the compiled tree.
//!
//! Everything a node needs to remember while it runs (variable bindings,
//! focus, order-by and group-by buffers, counters, where-clause fast-track
//! flags, spawned closures, cached bindings) is stored here, keyed by the
//! node's id. Per-node entries are stacks so the same node can be active at
//! several recursion depths.
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::expr::ExprId;
use crate::expr::flwor::{GroupTuple, OrderTuple};
use crate::store::{DocId, ListenerId, UpdateListener};
use crate::value::{ExpandedName, FunctionItem, Sequence};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Focus {
    pub position: usize,
    pub size: usize,
}

/// Flips its flag as soon as one of the watched documents is replaced.
pub(crate) struct InvalidateOnUpdate {
    docs: Vec<DocId>,
    valid: Arc<AtomicBool>,
}

impl InvalidateOnUpdate {
    pub fn new(docs: Vec<DocId>, valid: Arc<AtomicBool>) -> Self {
        Self { docs, valid }
    }
}

impl UpdateListener for InvalidateOnUpdate {
    fn document_updated(&self, doc: DocId) {
        if self.docs.contains(&doc) {
            tracing::debug!(%doc, "cached binding invalidated");
            self.valid.store(false, Ordering::Release);
        }
    }
}

pub(crate) struct CachedBinding {
    pub value: Sequence,
    pub valid: Arc<AtomicBool>,
    pub listener: ListenerId,
}

impl CachedBinding {
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}

/// Stack lengths recorded when a FLWOR expression opened its frames.
#[derive(Debug, Clone, Copy)]
pub(crate) enum FrameMark {
    Order(ExprId, usize),
    Group(ExprId, usize),
    Counter(ExprId, usize),
}

#[derive(Default)]
pub(crate) struct EvalState {
    locals: Vec<(ExpandedName, Sequence)>,
    floors: Vec<usize>,
    focus: Vec<Focus>,
    order_buffers: HashMap<ExprId, Vec<Vec<OrderTuple>>>,
    group_buffers: HashMap<ExprId, Vec<Vec<GroupTuple>>>,
    counters: HashMap<ExprId, Vec<i64>>,
    fast_track: HashMap<ExprId, Vec<bool>>,
    spawned: HashMap<ExprId, Vec<Arc<FunctionItem>>>,
    cached: HashMap<ExprId, CachedBinding>,
}

impl EvalState {
    pub fn push_local(&mut self, name: ExpandedName, value: Sequence) {
        self.locals.push((name, value));
    }

    pub fn locals_len(&self) -> usize {
        self.locals.len()
    }

    pub fn truncate_locals(&mut self, len: usize) {
        self.locals.truncate(len);
    }

    fn floor(&self) -> usize {
        self.floors.last().copied().unwrap_or(0)
    }

    pub fn lookup_local(&self, name: &ExpandedName) -> Option<&Sequence> {
        self.locals[self.floor()..]
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Bindings visible in the current function frame, outermost first.
    pub fn visible_locals(&self) -> Vec<(ExpandedName, Sequence)> {
        self.locals[self.floor()..].to_vec()
    }

    /// Starts a function frame: bindings below it become invisible.
    pub fn push_floor(&mut self) -> usize {
        let len = self.locals.len();
        self.floors.push(len);
        len
    }

    pub fn pop_floor(&mut self, len: usize) {
        self.floors.pop();
        self.locals.truncate(len);
    }

    pub fn push_focus(&mut self, focus: Focus) {
        self.focus.push(focus);
    }

    pub fn pop_focus(&mut self) {
        self.focus.pop();
    }

    pub fn focus(&self) -> Option<Focus> {
        self.focus.last().copied()
    }

    pub fn open_order_frame(&mut self, id: ExprId) -> FrameMark {
        let stack = self.order_buffers.entry(id).or_default();
        let mark = FrameMark::Order(id, stack.len());
        stack.push(Vec::new());
        mark
    }

    pub fn open_group_frame(&mut self, id: ExprId) -> FrameMark {
        let stack = self.group_buffers.entry(id).or_default();
        let mark = FrameMark::Group(id, stack.len());
        stack.push(Vec::new());
        mark
    }

    pub fn open_counter_frame(&mut self, id: ExprId) -> FrameMark {
        let stack = self.counters.entry(id).or_default();
        let mark = FrameMark::Counter(id, stack.len());
        stack.push(0);
        mark
    }

    pub fn close_frames(&mut self, marks: &[FrameMark]) {
        for mark in marks.iter().rev() {
            match *mark {
                FrameMark::Order(id, len) => {
                    if let Some(s) = self.order_buffers.get_mut(&id) {
                        s.truncate(len);
                    }
                }
                FrameMark::Group(id, len) => {
                    if let Some(s) = self.group_buffers.get_mut(&id) {
                        s.truncate(len);
                    }
                }
                FrameMark::Counter(id, len) => {
                    if let Some(s) = self.counters.get_mut(&id) {
                        s.truncate(len);
                    }
                }
            }
        }
    }

    pub fn order_buffer(&mut self, id: ExprId) -> Option<&mut Vec<OrderTuple>> {
        self.order_buffers.get_mut(&id).and_then(|s| s.last_mut())
    }

    pub fn group_buffer(&mut self, id: ExprId) -> Option<&mut Vec<GroupTuple>> {
        self.group_buffers.get_mut(&id).and_then(|s| s.last_mut())
    }

    /// Increments and returns the innermost counter of a count clause.
    pub fn next_count(&mut self, id: ExprId) -> Option<i64> {
        let c = self.counters.get_mut(&id)?.last_mut()?;
        *c += 1;
        Some(*c)
    }

    pub fn push_fast_track(&mut self, id: ExprId, active: bool) {
        self.fast_track.entry(id).or_default().push(active);
    }

    pub fn pop_fast_track(&mut self, id: ExprId) {
        if let Some(s) = self.fast_track.get_mut(&id) {
            s.pop();
        }
    }

    pub fn fast_track(&self, id: ExprId) -> bool {
        self.fast_track
            .get(&id)
            .and_then(|s| s.last())
            .copied()
            .unwrap_or(false)
    }

    pub fn record_spawned(&mut self, id: ExprId, f: Arc<FunctionItem>) {
        self.spawned.entry(id).or_default().push(f);
    }

    pub fn spawned_count(&self) -> usize {
        self.spawned.values().map(Vec::len).sum()
    }

    pub fn cached(&self, id: ExprId) -> Option<&Sequence> {
        self.cached
            .get(&id)
            .filter(|c| c.is_valid())
            .map(|c| &c.value)
    }

    /// Stores a binding, returning the listener of the one it replaces.
    pub fn set_cached(&mut self, id: ExprId, binding: CachedBinding) -> Option<ListenerId> {
        self.cached.insert(id, binding).map(|old| old.listener)
    }

    pub fn cached_count(&self) -> usize {
        self.cached.len()
    }

    /// Drops bindings, focus, buffers and flags left behind by an
    /// evaluation. Cached bindings survive.
    pub fn clear_transient(&mut self) {
        self.locals.clear();
        self.floors.clear();
        self.focus.clear();
        self.order_buffers.clear();
        self.group_buffers.clear();
        self.counters.clear();
        self.fast_track.clear();
    }

    /// Resets the state for re-evaluation. Spawned closures are always
    /// released; cached bindings only when `post_optimization` is false, in
    /// which case their listeners are returned for unsubscription.
    pub fn reset(&mut self, post_optimization: bool) -> Vec<ListenerId> {
        self.clear_transient();
        self.spawned.clear();
        if post_optimization {
            return Vec::new();
        }
        self.cached.drain().map(|(_, c)| c.listener).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floors_hide_caller_bindings() {
        let mut s = EvalState::default();
        let x = ExpandedName::local("x");
        s.push_local(x.clone(), Sequence::integer(1));
        let mark = s.push_floor();
        assert!(s.lookup_local(&x).is_none());
        s.push_local(x.clone(), Sequence::integer(2));
        assert_eq!(s.lookup_local(&x), Some(&Sequence::integer(2)));
        s.pop_floor(mark);
        assert_eq!(s.lookup_local(&x), Some(&Sequence::integer(1)));
    }

    #[test]
    fn frames_nest_per_node() {
        let mut s = EvalState::default();
        let id = ExprId::new(3);
        let outer = s.open_counter_frame(id);
        assert_eq!(s.next_count(id), Some(1));
        let inner = s.open_counter_frame(id);
        assert_eq!(s.next_count(id), Some(1));
        s.close_frames(&[inner]);
        assert_eq!(s.next_count(id), Some(2));
        s.close_frames(&[outer]);
        assert_eq!(s.next_count(id), None);
    }

    #[test]
    fn fast_track_flags_stack() {
        let mut s = EvalState::default();
        let id = ExprId::new(1);
        assert!(!s.fast_track(id));
        s.push_fast_track(id, true);
        s.push_fast_track(id, false);
        assert!(!s.fast_track(id));
        s.pop_fast_track(id);
        assert!(s.fast_track(id));
    }
}
