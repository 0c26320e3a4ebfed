use std::sync::Arc;

use rstest::rstest;
use xquery_core::expr::{Axis, FlworBuilder, NodeTest, PredicateMode};
use xquery_core::store::elem;
use xquery_core::value::ComparisonOp;
use xquery_core::{
    DynamicContextBuilder, Error, ErrorCode, ExprId, ExprKind, Location, Query, QueryBuilder,
    RecordingProfiler, Sequence, StaticContext, StaticContextBuilder, Store,
};

fn library() -> Arc<Store> {
    let store = Arc::new(Store::new());
    store.add_document(
        "lib.xml",
        elem("lib")
            .child(
                elem("book")
                    .attr("id", "b1")
                    .child(elem("title").text("Alpha"))
                    .child(elem("author").text("Ann")),
            )
            .child(elem("book").attr("id", "b2").child(elem("title").text("Beta")))
            .child(elem("book").attr("id", "b3").child(elem("author").text("Bob")))
            .child(elem("journal").attr("id", "j1").child(elem("title").text("Gamma"))),
    );
    store
}

/// `doc("lib.xml")/lib/book[pred]`
fn books_matching(b: &mut QueryBuilder, pred_expr: ExprId) -> ExprId {
    let pred = b.predicate(pred_expr);
    let uri = b.literal("lib.xml");
    let doc = b.call("doc", vec![uri]);
    let lib = b.child("lib");
    let book = b.step_with(Axis::Child, NodeTest::Name("book".into()), vec![pred]);
    b.path(vec![doc, lib, book])
}

fn run(b: QueryBuilder, root: ExprId, store: &Arc<Store>) -> Result<Sequence, Error> {
    let mut q = b.finish(root);
    q.analyze(StaticContext::default())?;
    q.evaluate(&DynamicContextBuilder::new().with_store(store.clone()).build())
}

fn strings(seq: &Sequence) -> Vec<String> {
    seq.iter().map(|i| i.string_value().unwrap()).collect()
}

#[rstest]
fn numeric_predicate_selects_by_position() {
    let store = library();
    let mut b = QueryBuilder::new();
    let two = b.literal(2_i64);
    let root = books_matching(&mut b, two);
    assert_eq!(strings(&run(b, root, &store).unwrap()), vec!["Beta"]);
}

#[rstest]
#[case(0)]
#[case(4)]
fn out_of_range_position_selects_nothing(#[case] pos: i64) {
    let store = library();
    let mut b = QueryBuilder::new();
    let p = b.literal(pos);
    let root = books_matching(&mut b, p);
    assert!(run(b, root, &store).unwrap().is_empty());
}

#[rstest]
fn reverse_axis_counts_positions_from_the_context_node() {
    // doc("lib.xml")/lib/book[3]/preceding-sibling::book[1]
    let store = library();
    let mut b = QueryBuilder::new();
    let three = b.literal(3_i64);
    let pos3 = b.predicate(three);
    let one = b.literal(1_i64);
    let pos1 = b.predicate(one);
    let uri = b.literal("lib.xml");
    let doc = b.call("doc", vec![uri]);
    let lib = b.child("lib");
    let book = b.step_with(Axis::Child, NodeTest::Name("book".into()), vec![pos3]);
    let prev = b.step_with(
        Axis::PrecedingSibling,
        NodeTest::Name("book".into()),
        vec![pos1],
    );
    let root = b.path(vec![doc, lib, book, prev]);
    assert_eq!(strings(&run(b, root, &store).unwrap()), vec!["Beta"]);
}

#[rstest]
fn boolean_predicate_compares_attributes() {
    let store = library();
    let mut b = QueryBuilder::new();
    let id = b.attribute("id");
    let b2 = b.literal("b2");
    let cmp = b.general_comparison(ComparisonOp::Eq, id, b2);
    let root = books_matching(&mut b, cmp);
    assert_eq!(strings(&run(b, root, &store).unwrap()), vec!["Beta"]);
}

#[rstest]
fn predicate_sees_position_and_size() {
    // book[position() = last()]
    let store = library();
    let mut b = QueryBuilder::new();
    let pos = b.call("position", vec![]);
    let last = b.call("last", vec![]);
    let cmp = b.general_comparison(ComparisonOp::Eq, pos, last);
    let root = books_matching(&mut b, cmp);
    assert_eq!(strings(&run(b, root, &store).unwrap()), vec!["Bob"]);
}

#[rstest]
fn node_predicate_runs_once_over_the_context_set() {
    let store = library();
    let mut b = QueryBuilder::new();
    let author = b.child("author");
    let root = books_matching(&mut b, author);
    let mut q = b.finish(root);
    q.analyze(StaticContext::default()).unwrap();
    assert_eq!(last_predicate_mode(&q, root), PredicateMode::Node);
    let profiler = Arc::new(RecordingProfiler::new());
    let dynamic = DynamicContextBuilder::new()
        .with_store(store)
        .with_profiler(profiler.clone())
        .build();
    let out = q.evaluate(&dynamic).unwrap();
    assert_eq!(strings(&out), vec!["AlphaAnn", "Bob"]);
    assert_eq!(profiler.starts(author), 1);
    assert!(
        profiler
            .messages()
            .iter()
            .any(|m| m == "node predicate evaluated once over the context set")
    );
}

#[rstest]
fn descendant_axis_returns_document_order_without_duplicates() {
    // doc("lib.xml")/descendant::title
    let store = library();
    let mut b = QueryBuilder::new();
    let uri = b.literal("lib.xml");
    let doc = b.call("doc", vec![uri]);
    let titles = b.descendant("title");
    let root = b.path(vec![doc, titles]);
    assert_eq!(
        strings(&run(b, root, &store).unwrap()),
        vec!["Alpha", "Beta", "Gamma"]
    );
}

#[rstest]
fn intermediate_atomic_step_is_rejected() {
    let store = library();
    let mut b = QueryBuilder::new();
    let ints = b.integers(&[1, 2]);
    b.set_location(ints, 4, 2);
    let a = b.child("a");
    let root = b.path(vec![ints, a]);
    let err = run(b, root, &store).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0019);
    assert_eq!(err.location, Some(Location::new(4, 2)));
}

#[rstest]
fn axis_step_on_atomic_context_item_is_rejected() {
    let mut b = QueryBuilder::new();
    let a = b.child("a");
    b.set_location(a, 3, 7);
    let mut q = b.finish(a);
    q.analyze(StaticContext::default()).unwrap();
    let dynamic = DynamicContextBuilder::new().with_context_item(1_i64).build();
    let err = q.evaluate(&dynamic).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0020);
    assert_eq!(err.location, Some(Location::new(3, 7)));
    assert!(err.to_string().ends_with("[at line 3, column 7]"));
}

#[rstest]
fn missing_context_item_is_a_dynamic_error() {
    let mut b = QueryBuilder::new();
    let a = b.child("a");
    let mut q = b.finish(a);
    q.analyze(StaticContext::default()).unwrap();
    let err = q.evaluate(&DynamicContextBuilder::new().build()).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPDY0002);
}

#[rstest]
fn undeclared_variable_is_a_static_error_with_location() {
    let mut b = QueryBuilder::new();
    let v = b.var("nope");
    b.set_location(v, 2, 5);
    let mut q = b.finish(v);
    let err = q.analyze(StaticContext::default()).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0008);
    assert_eq!(err.location, Some(Location::new(2, 5)));
}

#[rstest]
fn external_variables_come_from_the_dynamic_context() {
    let mut b = QueryBuilder::new();
    let v = b.var("limit");
    let mut q = b.finish(v);
    q.analyze(StaticContextBuilder::new().with_variable("limit").build())
        .unwrap();
    let dynamic = DynamicContextBuilder::new()
        .with_variable("limit", Sequence::integer(7))
        .build();
    assert_eq!(q.evaluate(&dynamic).unwrap(), Sequence::integer(7));
}

#[rstest]
fn missing_document_is_reported() {
    let store = library();
    let mut b = QueryBuilder::new();
    let uri = b.literal("missing.xml");
    let root = b.call("doc", vec![uri]);
    let err = run(b, root, &store).unwrap_err();
    assert_eq!(err.code, ErrorCode::FODC0002);
}

#[rstest]
fn constant_for_input_is_cached_until_its_document_changes() {
    let store = library();
    let doc_id = store
        .document_by_uri("lib.xml")
        .map(|d| d.id())
        .unwrap();

    // for $b in doc("lib.xml")/lib/book return $b
    let mut b = QueryBuilder::new();
    let uri = b.literal("lib.xml");
    let doc = b.call("doc", vec![uri]);
    let lib = b.child("lib");
    let book = b.child("book");
    let input = b.path(vec![doc, lib, book]);
    let ret = b.var("b");
    let root = b.flwor(FlworBuilder::new().for_var("b", input), ret);
    let mut q = b.finish(root);
    q.analyze(StaticContext::default()).unwrap();

    let profiler = Arc::new(RecordingProfiler::new());
    let dynamic = DynamicContextBuilder::new()
        .with_store(store.clone())
        .with_profiler(profiler.clone())
        .build();
    let mut evaluator = q.evaluator(&dynamic).unwrap();
    assert_eq!(evaluator.evaluate().unwrap().len(), 3);
    assert_eq!(evaluator.cached_bindings(), 1);
    assert_eq!(store.listener_count(), 1);

    // served from the cache: the input path is not evaluated again
    let before = profiler.starts(input);
    assert_eq!(evaluator.evaluate().unwrap().len(), 3);
    assert_eq!(profiler.starts(input), before);

    store
        .replace_document(
            doc_id,
            elem("lib").child(elem("book").child(elem("title").text("Delta"))),
        )
        .unwrap();
    let out = evaluator.evaluate().unwrap();
    assert_eq!(strings(&out), vec!["Delta"]);
    assert_eq!(store.listener_count(), 1);

    evaluator.reset_state(false);
    assert_eq!(evaluator.cached_bindings(), 0);
    assert_eq!(store.listener_count(), 0);
}

/// Mode of the first predicate on the last step of `path`.
fn last_predicate_mode(q: &Query, path: ExprId) -> PredicateMode {
    let Some(ExprKind::Path(p)) = q.node(path).map(|n| n.kind()) else {
        panic!("expected a path");
    };
    let step = p.steps.last().and_then(|&s| q.node(s)).map(|n| n.kind());
    let Some(ExprKind::Step(s)) = step else {
        panic!("expected a step, got {step:?}");
    };
    match q.node(s.predicates[0]).map(|n| n.kind()) {
        Some(ExprKind::Predicate(p)) => p.mode,
        other => panic!("expected a predicate, got {other:?}"),
    }
}

#[rstest]
#[case("journal", &["AlphaAnn", "Beta", "Bob"])]
#[case("missing", &[])]
fn predicate_on_a_bound_variable_applies_to_every_node(
    #[case] name: &str,
    #[case] expected: &[&str],
) {
    // let $v := doc("lib.xml")/lib return doc("lib.xml")/lib/book[$v/<name>]
    let store = library();
    let mut b = QueryBuilder::new();
    let uri = b.literal("lib.xml");
    let doc = b.call("doc", vec![uri]);
    let lib = b.child("lib");
    let bound = b.path(vec![doc, lib]);
    let v = b.var("v");
    let step = b.child(name);
    let cond = b.path(vec![v, step]);
    let root_path = books_matching(&mut b, cond);
    let root = b.flwor(FlworBuilder::new().let_var("v", bound), root_path);
    let mut q = b.finish(root);
    q.analyze(StaticContext::default()).unwrap();
    let pred_mode = last_predicate_mode(&q, root_path);
    assert_eq!(pred_mode, PredicateMode::Boolean);
    let out = q
        .evaluate(&DynamicContextBuilder::new().with_store(store).build())
        .unwrap();
    assert_eq!(strings(&out), expected);
}

#[rstest]
fn predicate_on_another_document_path_is_not_correlated() {
    // doc("lib.xml")/lib/book[doc("lib.xml")/lib/journal]
    let store = library();
    let mut b = QueryBuilder::new();
    let uri = b.literal("lib.xml");
    let doc = b.call("doc", vec![uri]);
    let lib = b.child("lib");
    let journal = b.child("journal");
    let cond = b.path(vec![doc, lib, journal]);
    let root = books_matching(&mut b, cond);
    assert_eq!(
        strings(&run(b, root, &store).unwrap()),
        vec!["AlphaAnn", "Beta", "Bob"]
    );
}
