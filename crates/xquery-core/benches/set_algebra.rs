use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use xquery_core::store::elem;
use xquery_core::{
    DynamicContextBuilder, Item, NodeId, NodeProxy, NodeSet, QueryBuilder, Sequence,
    StaticContextBuilder, Store,
};

fn picks(doc: &Arc<xquery_core::Document>, n: u32, step: u32) -> NodeSet {
    NodeSet::from_nodes(
        (1..=n)
            .filter(|i| i % step == 0)
            .map(|i| NodeProxy::new(doc.clone(), NodeId::from_levels(&[1, i]))),
    )
}

fn benchmark_node_set_algebra(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_set_algebra");
    for size in [100_u32, 1_000, 10_000] {
        let store = Store::new();
        let doc = store.add_document("flat.xml", elem("r").children((0..size).map(|_| elem("e"))));
        let evens = picks(&doc, size, 2);
        let thirds = picks(&doc, size, 3);

        group.bench_with_input(BenchmarkId::new("union", size), &size, |b, _| {
            b.iter(|| black_box(evens.union(&thirds)));
        });
        group.bench_with_input(BenchmarkId::new("intersection", size), &size, |b, _| {
            b.iter(|| black_box(evens.intersection(&thirds)));
        });
        group.bench_with_input(BenchmarkId::new("except", size), &size, |b, _| {
            b.iter(|| black_box(evens.except(&thirds)));
        });
    }
    group.finish();
}

fn benchmark_union_expression(c: &mut Criterion) {
    let mut group = c.benchmark_group("union_expression");
    for size in [100_u32, 1_000] {
        let store = Arc::new(Store::new());
        let doc = store.add_document("flat.xml", elem("r").children((0..size).map(|_| elem("e"))));
        let evens = picks(&doc, size, 2);
        let thirds = picks(&doc, size, 3);

        let mut b = QueryBuilder::new();
        let l = b.var("l");
        let r = b.var("r");
        let root = b.union(l, r);
        let mut query = b.finish(root);
        query
            .analyze(
                StaticContextBuilder::new()
                    .with_variable("l")
                    .with_variable("r")
                    .build(),
            )
            .unwrap();

        // persistent node sets take the merge path
        let structural = DynamicContextBuilder::new()
            .with_store(store.clone())
            .with_variable("l", Sequence::Nodes(evens.clone()))
            .with_variable("r", Sequence::Nodes(thirds.clone()))
            .build();
        // plain item sequences are sorted and deduplicated
        let generic = DynamicContextBuilder::new()
            .with_store(store.clone())
            .with_variable(
                "l",
                Sequence::from_items(evens.iter().cloned().map(Item::Node).collect()),
            )
            .with_variable(
                "r",
                Sequence::from_items(thirds.iter().cloned().map(Item::Node).collect()),
            )
            .build();

        group.bench_with_input(BenchmarkId::new("structural", size), &size, |b, _| {
            b.iter(|| black_box(query.evaluate(&structural).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("generic", size), &size, |b, _| {
            b.iter(|| black_box(query.evaluate(&generic).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_node_set_algebra, benchmark_union_expression);
criterion_main!(benches);
