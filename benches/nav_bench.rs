//! Criterion benchmarks for the navigation engine.
//!
//! Measures the compile-once / run-many split: path compilation cost,
//! compiled select and transform over flat and nested structures, and a
//! recursive walker sweep.
//!
//! Run:
//!   cargo bench
//!   cargo bench -- select     # one group
//!   cargo bench -- transform  # one group

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use deepnav::navigators::{collect_one, filterer, pred, srange, walker, ALL};
use deepnav::{compile_paths, path, select, transform, val, NativeFn, Result, Value};

// ── Data builders ─────────────────────────────────────────────────────────────

/// Flat vector of ints: [0, 1, ..., n-1].
fn numbers(n: usize) -> Value {
    Value::vector((0..n as i64).map(Value::from).collect())
}

/// n product records: {"id", "name", "price", "stock"}.
fn products(n: usize) -> Value {
    let records: Vec<Value> = (0..n as i64)
        .map(|i| {
            val!({
                "id": (Value::from(i)),
                "name": (Value::from(format!("product {i}"))),
                "price": (Value::from(10 + i * 2)),
                "stock": (Value::from(i % 7))
            })
        })
        .collect();
    val!({"products": (Value::vector(records))})
}

/// A binary tree of nested vectors with ints at the leaves, depth d.
fn int_tree(depth: usize) -> Value {
    if depth == 0 {
        val!(7)
    } else {
        Value::vector(vec![int_tree(depth - 1), int_tree(depth - 1)])
    }
}

fn number_pred() -> NativeFn {
    NativeFn::pred("number?", |v| v.as_int().is_some())
}

fn inc(_vals: &[Value], v: &Value) -> Result<Value> {
    Ok(val!(v.as_int().unwrap() + 1))
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile/key_all_key", |b| {
        b.iter(|| compile_paths(path!["products", ALL, "price"]).unwrap())
    });

    c.bench_function("compile/with_inner_paths", |b| {
        b.iter(|| {
            compile_paths(path![
                "products",
                filterer(path![pred(number_pred())]),
                ALL
            ])
            .unwrap()
        })
    });
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");
    for n in [10usize, 100, 1000] {
        let data = products(n);
        let compiled = compile_paths(path!["products", ALL, "price"]).unwrap();
        group.bench_with_input(BenchmarkId::new("prices", n), &data, |b, data| {
            b.iter(|| select(&compiled, black_box(data)).unwrap())
        });
    }
    group.finish();
}

fn bench_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform");
    for n in [10usize, 100, 1000] {
        let data = products(n);
        let compiled = compile_paths(path!["products", ALL, "price"]).unwrap();
        group.bench_with_input(BenchmarkId::new("bump_prices", n), &data, |b, data| {
            b.iter(|| transform(&compiled, inc, black_box(data)).unwrap())
        });
    }

    let data = numbers(1000);
    let compiled = compile_paths(path![srange(100, 900), ALL]).unwrap();
    group.bench_with_input(BenchmarkId::new("srange_window", 1000), &data, |b, data| {
        b.iter(|| transform(&compiled, inc, black_box(data)).unwrap())
    });
    group.finish();
}

fn bench_walker(c: &mut Criterion) {
    let mut group = c.benchmark_group("walker");
    for depth in [6usize, 10] {
        let data = int_tree(depth);
        let compiled = compile_paths(path![walker(number_pred())]).unwrap();
        group.bench_with_input(BenchmarkId::new("sweep", depth), &data, |b, data| {
            b.iter(|| transform(&compiled, inc, black_box(data)).unwrap())
        });
    }
    group.finish();
}

fn bench_collectors(c: &mut Criterion) {
    let data = products(100);
    let compiled = compile_paths(path!["products", ALL, collect_one(path!["id"]), "price"]).unwrap();
    c.bench_function("collectors/id_plus_price", |b| {
        b.iter(|| {
            transform(
                &compiled,
                |vals: &[Value], v: &Value| {
                    Ok(val!(vals[0].as_int().unwrap() + v.as_int().unwrap()))
                },
                black_box(&data),
            )
            .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_compile,
    bench_select,
    bench_transform,
    bench_walker,
    bench_collectors
);
criterion_main!(benches);
