use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use fluentsql::{BulkInsert, Dialect, RetrieveQb, SqlQb, SqlValue, retrieve};

/// A SELECT over `t` with `n` equality conditions:
/// SELECT * FROM t WHERE col0 = ? AND col1 = ? ...
fn build_retrieve(n: usize) -> RetrieveQb {
    (0..n).fold(retrieve("t"), |qb, i| qb.eq(format!("col{i}"), i as i64))
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql_builder/render");

    for n in [1, 5, 10, 50, 100] {
        let qb = build_retrieve(n);
        group.bench_with_input(BenchmarkId::new("literal", n), &qb, |b, qb| {
            b.iter(|| black_box(qb.build()));
        });
        group.bench_with_input(BenchmarkId::new("prepared", n), &qb, |b, qb| {
            b.iter(|| black_box(qb.build_prepared_for(Dialect::Postgres)));
        });
    }

    group.finish();
}

fn bench_build_and_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql_builder/build_and_render");

    for n in [1, 5, 10, 50, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| black_box(build_retrieve(n).paging(3, 20).build_prepared()));
        });
    }

    group.finish();
}

fn bench_in_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql_builder/in_list");

    for n in [5, 20, 100, 500] {
        let values: Vec<i64> = (0..n).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &values, |b, values| {
            b.iter(|| {
                let qb = retrieve("t").in_values("id", values.iter().copied());
                black_box(qb.build_prepared())
            });
        });
    }

    group.finish();
}

fn bench_bulk_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql_builder/bulk_plan");

    for n in [100, 1_000, 10_000] {
        let bulk = BulkInsert::new("events", ["id", "kind", "payload"])
            .rows((0..n).map(|i| {
                vec![
                    SqlValue::from(i as i64),
                    SqlValue::from("click"),
                    SqlValue::from(format!("{{\"seq\":{i}}}")),
                ]
            }))
            .byte_budget(64 * 1024);
        group.bench_with_input(BenchmarkId::from_parameter(n), &bulk, |b, bulk| {
            b.iter(|| black_box(bulk.plan()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_render,
    bench_build_and_render,
    bench_in_list,
    bench_bulk_plan
);
criterion_main!(benches);
