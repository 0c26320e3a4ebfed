use std::sync::Arc;

use proptest::prelude::*;
use rstest::rstest;
use xquery_core::expr::{Axis, FastTrackShape, FlworBuilder, NodeTest};
use xquery_core::store::elem;
use xquery_core::{
    DynamicContextBuilder, ExprId, ExprKind, Param, Query, QueryBuilder, RecordingProfiler,
    Sequence, StaticContextBuilder, Store,
};

const NOTE: &str = "where clause fast track: condition evaluated once";

/// Items with an optional `t` child and an optional `k` attribute.
fn items_doc(spec: &[(bool, bool)]) -> Arc<Store> {
    let store = Arc::new(Store::new());
    let root = elem("r").children(spec.iter().enumerate().map(|(i, &(child, attr))| {
        let mut e = elem("e").text(&i.to_string());
        if attr {
            e = e.attr("k", "1");
        }
        if child {
            e = e.child(elem("t").text("!"));
        }
        e
    }));
    store.add_document("items.xml", root);
    store
}

fn items(b: &mut QueryBuilder) -> ExprId {
    let uri = b.literal("items.xml");
    let doc = b.call("doc", vec![uri]);
    let r = b.child("r");
    let e = b.child("e");
    b.path(vec![doc, r, e])
}

/// for $x in doc("items.xml")/r/e where $x/t return $x
fn path_query() -> (Query, ExprId) {
    let mut b = QueryBuilder::new();
    let input = items(&mut b);
    let x = b.var("x");
    let t = b.child("t");
    let cond = b.path(vec![x, t]);
    let ret = b.var("x");
    let first = b.flwor(FlworBuilder::new().for_var("x", input).where_cond(cond), ret);
    (b.finish(first), first)
}

/// for $x in doc("items.xml")/r/e where $x[@k] return $x
fn filter_query() -> (Query, ExprId) {
    let mut b = QueryBuilder::new();
    let input = items(&mut b);
    let x = b.var("x");
    let k = b.attribute("k");
    let pred = b.predicate(k);
    let cond = b.filter(x, vec![pred]);
    let ret = b.var("x");
    let first = b.flwor(FlworBuilder::new().for_var("x", input).where_cond(cond), ret);
    (b.finish(first), first)
}

fn where_shape(q: &Query, for_id: ExprId) -> Option<FastTrackShape> {
    let Some(ExprKind::For(f)) = q.node(for_id).map(|n| n.kind()) else {
        panic!("expected a for clause");
    };
    match q.node(f.return_expr).map(|n| n.kind()) {
        Some(ExprKind::Where(w)) => w.fast_track,
        other => panic!("expected a where clause, got {other:?}"),
    }
}

fn evaluate(
    mut q: Query,
    store: &Arc<Store>,
    fast_track: bool,
) -> (Sequence, Vec<String>) {
    q.analyze(
        StaticContextBuilder::new()
            .with_where_fast_track(fast_track)
            .build(),
    )
    .unwrap();
    let profiler = Arc::new(RecordingProfiler::new());
    let dynamic = DynamicContextBuilder::new()
        .with_store(store.clone())
        .with_profiler(profiler.clone())
        .build();
    let out = q.evaluate(&dynamic).unwrap();
    (out, profiler.messages())
}

fn texts(seq: &Sequence) -> Vec<String> {
    seq.iter().map(|i| i.string_value().unwrap()).collect()
}

#[rstest]
fn path_condition_is_fast_tracked() {
    let store = items_doc(&[(true, false), (false, false), (true, true)]);
    let (mut q, first) = path_query();
    q.analyze(StaticContextBuilder::new().build()).unwrap();
    assert_eq!(where_shape(&q, first), Some(FastTrackShape::Path));

    let (q, _) = path_query();
    let (out, messages) = evaluate(q, &store, true);
    assert_eq!(texts(&out), vec!["0!", "2!"]);
    assert!(messages.iter().any(|m| m == NOTE));
}

#[rstest]
fn filter_condition_is_fast_tracked() {
    let store = items_doc(&[(false, true), (false, false), (true, true)]);
    let (mut q, first) = filter_query();
    q.analyze(StaticContextBuilder::new().build()).unwrap();
    assert_eq!(where_shape(&q, first), Some(FastTrackShape::Filter));

    let (q, _) = filter_query();
    let (out, messages) = evaluate(q, &store, true);
    assert_eq!(texts(&out), vec!["0", "2!"]);
    assert!(messages.iter().any(|m| m == NOTE));
}

#[rstest]
fn disabled_fast_track_evaluates_per_binding() {
    let store = items_doc(&[(true, false), (false, false)]);
    let (mut q, first) = path_query();
    q.analyze(
        StaticContextBuilder::new()
            .with_where_fast_track(false)
            .build(),
    )
    .unwrap();
    assert_eq!(where_shape(&q, first), None);

    let (q, _) = path_query();
    let (out, messages) = evaluate(q, &store, false);
    assert_eq!(texts(&out), vec!["0!"]);
    assert!(!messages.iter().any(|m| m == NOTE));
}

#[rstest]
fn position_variable_blocks_fast_track() {
    let mut b = QueryBuilder::new();
    let input = items(&mut b);
    let x = b.var("x");
    let t = b.child("t");
    let cond = b.path(vec![x, t]);
    let ret = b.var("i");
    let first = b.flwor(
        FlworBuilder::new().for_at("x", "i", input).where_cond(cond),
        ret,
    );
    let mut q = b.finish(first);
    q.analyze(StaticContextBuilder::new().build()).unwrap();
    assert_eq!(where_shape(&q, first), None);
}

#[rstest]
fn second_reference_to_the_variable_blocks_fast_track() {
    // where $x/t and $x
    let mut b = QueryBuilder::new();
    let input = items(&mut b);
    let x = b.var("x");
    let t = b.child("t");
    let path = b.path(vec![x, t]);
    let x2 = b.var("x");
    let cond = b.and(path, x2);
    let ret = b.var("x");
    let first = b.flwor(FlworBuilder::new().for_var("x", input).where_cond(cond), ret);
    let mut q = b.finish(first);
    q.analyze(StaticContextBuilder::new().build()).unwrap();
    assert_eq!(where_shape(&q, first), None);
}

proptest! {
    #[test]
    fn fast_track_does_not_change_results(
        spec in proptest::collection::vec((any::<bool>(), any::<bool>()), 1..16),
        filter in any::<bool>(),
    ) {
        let store = items_doc(&spec);
        let query = || if filter { filter_query().0 } else { path_query().0 };
        let (fast, _) = evaluate(query(), &store, true);
        let (slow, _) = evaluate(query(), &store, false);
        prop_assert_eq!(texts(&fast), texts(&slow));
        prop_assert_eq!(fast, slow);
    }
}

/// declare function local:walk($s, $deep) {
///   for $x in $s where $x/t
///   return ($x, if ($deep) then local:walk(($x, $x/..), false()) else ())
/// };
/// local:walk(doc("items.xml")/r/e, true())
fn recursive_query() -> Query {
    let mut b = QueryBuilder::new();
    let s = b.var("s");
    let x = b.var("x");
    let t = b.child("t");
    let cond = b.path(vec![x, t]);
    let deep = b.var("deep");
    let x_self = b.var("x");
    let x_base = b.var("x");
    let up = b.step(Axis::Parent, NodeTest::AnyKind);
    let parent = b.path(vec![x_base, up]);
    let pair = b.sequence(vec![x_self, parent]);
    let no = b.call("false", vec![]);
    let inner = b.call("local:walk", vec![pair, no]);
    let nothing = b.empty();
    let branch = b.if_then_else(deep, inner, nothing);
    let x_ret = b.var("x");
    let ret = b.sequence(vec![x_ret, branch]);
    let body = b.flwor(FlworBuilder::new().for_var("x", s).where_cond(cond), ret);
    b.declare_function(
        "local:walk",
        vec![Param::new("s"), Param::new("deep")],
        None,
        body,
    );
    let input = items(&mut b);
    let yes = b.call("true", vec![]);
    let root = b.call("local:walk", vec![input, yes]);
    b.finish(root)
}

#[rstest]
#[case(true)]
#[case(false)]
fn recursive_activation_evaluates_its_own_condition(#[case] fast_track: bool) {
    // the inner call sees `r`, which has no t child
    let store = items_doc(&[(true, false), (false, false)]);
    let (out, _) = evaluate(recursive_query(), &store, fast_track);
    assert_eq!(texts(&out), vec!["0!", "0!"]);
}
