use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rstest::rstest;
use xquery_core::expr::{ArithOp, FlworBuilder};
use xquery_core::value::ComparisonOp;
use xquery_core::{
    DynamicContextBuilder, Error, ErrorCode, ExpandedName, ExprId, Item, ItemType, Param,
    QueryBuilder, Sequence, SequenceType, StaticContext, StaticContextBuilder, XQueryVersion,
    default_function_registry,
};

fn ints(v: &[i64]) -> Sequence {
    Sequence::from_items(v.iter().map(|i| Item::from(*i)).collect())
}

fn run_with(b: QueryBuilder, root: ExprId, sc: StaticContext) -> Result<Sequence, Error> {
    let mut q = b.finish(root);
    q.analyze(sc)?;
    q.evaluate(&DynamicContextBuilder::new().build())
}

fn run(b: QueryBuilder, root: ExprId) -> Result<Sequence, Error> {
    run_with(b, root, StaticContext::default())
}

/// `local:add($a, $b) { $a + $b }`
fn declare_add(b: &mut QueryBuilder) {
    let a = b.var("a");
    let bb = b.var("b");
    let body = b.arithmetic(ArithOp::Add, a, bb);
    b.declare_function("local:add", vec![Param::new("a"), Param::new("b")], None, body);
}

#[rstest]
fn partial_application_evaluates_bound_arguments_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut reg = default_function_registry();
    reg.register_fn(ExpandedName::local("two"), 0, move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Sequence::integer(2))
    });

    // let $f := local:add(?, two()) return ($f(3), $f(10))
    let mut b = QueryBuilder::new();
    declare_add(&mut b);
    let two = b.call("two", vec![]);
    let partial = b.partial_call("local:add", vec![None, Some(two)]);
    let f1 = b.var("f");
    let three = b.literal(3_i64);
    let first = b.dynamic_call(f1, vec![Some(three)]);
    let f2 = b.var("f");
    let ten = b.literal(10_i64);
    let second = b.dynamic_call(f2, vec![Some(ten)]);
    let ret = b.sequence(vec![first, second]);
    let root = b.flwor(FlworBuilder::new().let_var("f", partial), ret);

    let sc = StaticContextBuilder::new()
        .with_functions(Arc::new(reg))
        .build();
    assert_eq!(run_with(b, root, sc).unwrap(), ints(&[5, 12]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[rstest]
fn partial_application_has_the_placeholder_arity() {
    // local:add(1, ?)(1, 2) is an arity error
    let mut b = QueryBuilder::new();
    declare_add(&mut b);
    let one = b.literal(1_i64);
    let partial = b.partial_call("local:add", vec![Some(one), None]);
    let x = b.literal(1_i64);
    let y = b.literal(2_i64);
    let root = b.dynamic_call(partial, vec![Some(x), Some(y)]);
    let err = run(b, root).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);
}

#[rstest]
fn each_inline_function_evaluation_captures_its_own_bindings() {
    // for $f in (for $x in (1, 2) return function() { $x }) return $f()
    let mut b = QueryBuilder::new();
    let xs = b.integers(&[1, 2]);
    let x = b.var("x");
    let inline = b.inline_function(vec![], None, x);
    let closures = b.flwor(FlworBuilder::new().for_var("x", xs), inline);
    let f = b.var("f");
    let call = b.dynamic_call(f, vec![]);
    let root = b.flwor(FlworBuilder::new().for_var("f", closures), call);
    let mut q = b.finish(root);
    q.analyze(StaticContext::default()).unwrap();

    let dynamic = DynamicContextBuilder::new().build();
    let mut evaluator = q.evaluator(&dynamic).unwrap();
    assert_eq!(evaluator.evaluate().unwrap(), ints(&[1, 2]));
    assert_eq!(evaluator.spawned_closures(), 2);
    evaluator.reset_state(true);
    assert_eq!(evaluator.spawned_closures(), 0);
}

#[rstest]
fn inline_function_with_parameters() {
    // let $inc := function($n as xs:integer) { $n + 1 } return $inc(41)
    let mut b = QueryBuilder::new();
    let n = b.var("n");
    let one = b.literal(1_i64);
    let body = b.arithmetic(ArithOp::Add, n, one);
    let inline = b.inline_function(
        vec![Param::typed("n", SequenceType::one(ItemType::Integer))],
        Some(SequenceType::one(ItemType::Integer)),
        body,
    );
    let inc = b.var("inc");
    let arg = b.literal(41_i64);
    let call = b.dynamic_call(inc, vec![Some(arg)]);
    let root = b.flwor(FlworBuilder::new().let_var("inc", inline), call);
    assert_eq!(run(b, root).unwrap(), ints(&[42]));
}

#[rstest]
fn parameter_type_errors_name_the_parameter() {
    let mut b = QueryBuilder::new();
    let n = b.var("n");
    let one = b.literal(1_i64);
    let body = b.arithmetic(ArithOp::Add, n, one);
    b.declare_function(
        "local:inc",
        vec![Param::typed("n", SequenceType::one(ItemType::Integer))],
        None,
        body,
    );
    let arg = b.literal("one");
    let root = b.call("local:inc", vec![arg]);
    let err = run(b, root).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);
    assert_eq!(
        err.message,
        "checking function parameter 1 in call local:inc#1"
    );
    assert!(err.source.is_some());
}

#[rstest]
fn return_type_is_checked() {
    let mut b = QueryBuilder::new();
    let body = b.literal("text");
    b.declare_function(
        "local:num",
        vec![],
        Some(SequenceType::one(ItemType::Integer)),
        body,
    );
    let root = b.call("local:num", vec![]);
    let err = run(b, root).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);
    assert!(err.message.starts_with("return value of local:num#0"));
}

#[rstest]
#[case(1, 1)]
#[case(5, 120)]
fn declared_functions_may_recurse(#[case] n: i64, #[case] expected: i64) {
    // local:fact($n) { if ($n le 1) then 1 else $n * local:fact($n - 1) }
    let mut b = QueryBuilder::new();
    let n1 = b.var("n");
    let one = b.literal(1_i64);
    let test = b.value_comparison(ComparisonOp::Le, n1, one);
    let base = b.literal(1_i64);
    let n2 = b.var("n");
    let n3 = b.var("n");
    let one_again = b.literal(1_i64);
    let dec = b.arithmetic(ArithOp::Sub, n3, one_again);
    let rec = b.call("local:fact", vec![dec]);
    let mul = b.arithmetic(ArithOp::Mul, n2, rec);
    let body = b.if_then_else(test, base, mul);
    b.declare_function("local:fact", vec![Param::new("n")], None, body);
    let arg = b.literal(n);
    let root = b.call("local:fact", vec![arg]);
    assert_eq!(run(b, root).unwrap(), ints(&[expected]));
}

#[rstest]
fn function_bodies_do_not_see_caller_locals() {
    // declare function local:peek() { $x }; let $x := 1 return local:peek()
    let mut b = QueryBuilder::new();
    let x = b.var("x");
    b.declare_function("local:peek", vec![], None, x);
    let one = b.literal(1_i64);
    let call = b.call("local:peek", vec![]);
    let root = b.flwor(FlworBuilder::new().let_var("x", one), call);
    let err = run(b, root).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0008);
    assert!(err.is_static());
}

#[rstest]
fn builtin_function_reference() {
    // fn:count#1((1, 2, 3))
    let mut b = QueryBuilder::new();
    let r = b.function_ref("count", 1);
    let arg = b.integers(&[1, 2, 3]);
    let root = b.dynamic_call(r, vec![Some(arg)]);
    assert_eq!(run(b, root).unwrap(), ints(&[3]));
}

#[rstest]
fn unknown_function_reference_fails_when_evaluated() {
    let mut b = QueryBuilder::new();
    let r = b.function_ref("local:nope", 1);
    let mut q = b.finish(r);
    q.analyze(StaticContext::default()).unwrap();
    let err = q.evaluate(&DynamicContextBuilder::new().build()).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0017);
    assert!(!err.is_static());
}

#[rstest]
fn unknown_static_call_fails_analysis() {
    let mut b = QueryBuilder::new();
    let root = b.call("local:nope", vec![]);
    let mut q = b.finish(root);
    let err = q.analyze(StaticContext::default()).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0017);
    assert!(err.is_static());
    assert!(!q.is_analyzed());
}

#[rstest]
fn calling_a_non_function_is_a_type_error() {
    let mut b = QueryBuilder::new();
    let callee = b.literal(1_i64);
    let root = b.dynamic_call(callee, vec![]);
    let err = run(b, root).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);
}

#[rstest]
fn higher_order_features_need_version_3() {
    let v1 = StaticContextBuilder::new()
        .with_version(XQueryVersion::V1_0)
        .build();
    let mut b = QueryBuilder::new();
    let body = b.literal(1_i64);
    let root = b.inline_function(vec![], None, body);
    let err = run_with(b, root, v1.clone()).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0003);

    let mut b = QueryBuilder::new();
    let root = b.function_ref("count", 1);
    let err = run_with(b, root, v1).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0003);
}
