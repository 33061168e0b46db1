use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pgrest::{Filter, FilterOp, FilterSet, parse_select};

/// `id, col0, ..., rel0:table0(a, b, nested0(c)), ...`
fn build_select(columns: usize, joins: usize) -> String {
    let mut parts = vec!["id".to_string()];
    parts.extend((0..columns).map(|i| format!("col{i}")));
    parts.extend((0..joins).map(|i| format!("rel{i}:table{i}!table{i}_fkey(a, b, nested{i}(c))")));
    parts.join(", ")
}

fn bench_parse_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select/parse");

    for (columns, joins) in [(1, 0), (10, 1), (10, 5), (50, 10)] {
        let select = build_select(columns, joins);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{columns}c_{joins}j")),
            &select,
            |b, select| {
                b.iter(|| black_box(parse_select(select)));
            },
        );
    }

    group.finish();
}

fn bench_build_where(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter/build_where");

    for n in [1, 5, 20, 100] {
        let mut set = FilterSet::new();
        for i in 0..n {
            set.push(Filter::new(format!("col{i}"), FilterOp::Eq, i));
        }
        set.push_or("status.eq.active,and(age.gte.18,age.lt.65)");
        set.push_not("deleted_at", "is", serde_json::Value::Null);
        group.bench_with_input(BenchmarkId::from_parameter(n), &set, |b, set| {
            b.iter(|| black_box(set.build_where(1, "english")));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse_select, bench_build_where);
criterion_main!(benches);
