use proptest::prelude::*;
use rstest::rstest;
use xquery_core::expr::FlworBuilder;
use xquery_core::{
    Cardinality, Dependency, QueryBuilder, StaticContext, StaticContextBuilder,
    VariableReferenceCollector,
};

fn cardinality() -> impl Strategy<Value = Cardinality> {
    proptest::sample::select(Cardinality::ALL.to_vec())
}

proptest! {
    #[test]
    fn join_is_an_upper_bound(a in cardinality(), b in cardinality()) {
        let j = a.join(b);
        prop_assert!(a.is_sub_cardinality_of(j));
        prop_assert!(b.is_sub_cardinality_of(j));
        prop_assert_eq!(j, b.join(a));
        prop_assert_eq!(a.join(a), a);
    }

    #[test]
    fn join_keeps_every_admitted_count(a in cardinality(), b in cardinality(), n in 0usize..5) {
        if a.matches_count(n) || b.matches_count(n) {
            prop_assert!(a.join(b).matches_count(n));
        }
    }

    #[test]
    fn concat_and_repeat_admit_the_resulting_counts(x in 0usize..5, y in 0usize..5) {
        let a = Cardinality::from_count(x);
        let b = Cardinality::from_count(y);
        prop_assert!(a.concat(b).matches_count(x + y));
        prop_assert!(a.repeat(b).matches_count(x * y));
    }

    #[test]
    fn bits_round_trip_for_every_element(c in cardinality()) {
        prop_assert_eq!(Cardinality::from_bits(c.bits()), c);
    }
}

#[rstest]
#[case(0b000, Cardinality::Empty)]
#[case(0b101, Cardinality::ZeroOrMore)]
fn degenerate_bit_sets_normalize(#[case] bits: u8, #[case] expected: Cardinality) {
    assert_eq!(Cardinality::from_bits(bits), expected);
}

#[rstest]
fn flwor_dependencies_are_local_variables_only() {
    // let $x := 1 return $x + $ext
    let mut b = QueryBuilder::new();
    let one = b.literal(1_i64);
    let x = b.var("x");
    let ext = b.var("ext");
    let sum = b.arithmetic(xquery_core::expr::ArithOp::Add, x, ext);
    let root = b.flwor(FlworBuilder::new().let_var("x", one), sum);
    let mut q = b.finish(root);
    q.analyze(StaticContextBuilder::new().with_variable("ext").build())
        .unwrap();

    let deps = |id| q.node(id).map(|n| n.dependencies()).unwrap();
    assert_eq!(deps(one), Dependency::NONE);
    assert_eq!(deps(x), Dependency::LOCAL_VARS);
    assert_eq!(deps(ext), Dependency::CONTEXT_VARS);
    assert_eq!(deps(root), Dependency::LOCAL_VARS | Dependency::CONTEXT_VARS);
    assert!(!deps(root).depends_on_context_item());

    let mut refs = VariableReferenceCollector::new();
    q.accept(&mut refs);
    assert_eq!(refs.names().len(), 2);
}

#[rstest]
fn dump_shows_analysis_results() {
    let mut b = QueryBuilder::new();
    let input = b.integers(&[1, 2]);
    let ret = b.var("x");
    let root = b.flwor(FlworBuilder::new().for_var("x", input), ret);
    let mut q = b.finish(root);
    q.analyze(StaticContext::default()).unwrap();
    let dump = q.dump();
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("ForClause#2 $x [deps: LOCAL_VARS;"));
    assert!(lines[1].starts_with("  Literal#0 (1, 2) [deps: none;"));
    assert!(lines[2].starts_with("  VariableReference#1 $x [deps: LOCAL_VARS;"));
}
