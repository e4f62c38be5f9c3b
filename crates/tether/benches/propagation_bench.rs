//! Benchmarks for binding propagation and binder rebuilds.
//!
//! Run with: `cargo bench --package tether --bench propagation_bench`

use std::rc::Rc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tether::prelude::*;

// =============================================================================
// Helpers
// =============================================================================

/// A chain of `len` cells, each bound two-way to the next.
fn chain(len: usize) -> (Vec<Observable<i64>>, BindingScope) {
    let cells: Vec<Observable<i64>> = (0..len).map(|_| Observable::new(0)).collect();
    let mut scope = BindingScope::new();
    for pair in cells.windows(2) {
        scope
            .establish(Side::observable(&pair[0]).to(&Side::observable(&pair[1])))
            .expect("cells share a value type");
    }
    (cells, scope)
}

struct Mirror {
    cell: Observable<i64>,
}

impl Bindable<ContextWrapper<i64>> for Mirror {
    fn on_context_attach(
        &self,
        context: &ContextWrapper<i64>,
        _binder: &Binder<ContextWrapper<i64>>,
    ) -> Result<Vec<SharedBinding>, BindError> {
        let binding = Side::observable(&self.cell)
            .to(&context.side()?)
            .flow(Flow::OneWay)
            .establish_shared()?;
        Ok(vec![binding])
    }
}

// =============================================================================
// Propagation
// =============================================================================

fn bench_two_way_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("binding/two_way_write");

    for &len in &[2usize, 8, 64] {
        let (cells, _scope) = chain(len);
        let mut next = 0_i64;
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("chain", len), &len, |b, _| {
            b.iter(|| {
                next += 1;
                cells[0].set(black_box(next)).expect("propagation");
                black_box(cells[len - 1].get())
            })
        });
    }

    group.finish();
}

fn bench_adapted_write(c: &mut Criterion) {
    let a = Observable::new(0_i64);
    let b = Observable::new(String::new());
    let mut scope = BindingScope::new();
    scope
        .establish(
            Side::observable(&a)
                .to(&Side::observable(&b))
                .adapt_ab(|n: i64| n.to_string())
                .adapt_ba(|s: String| s.parse().unwrap_or_default()),
        )
        .expect("adapters supplied");

    let mut next = 0_i64;
    c.bench_function("binding/adapted_write", |bench| {
        bench.iter(|| {
            next += 1;
            a.set(black_box(next)).expect("propagation");
            black_box(b.with(String::len))
        })
    });
}

// =============================================================================
// Binder rebuild
// =============================================================================

fn bench_context_replacement(c: &mut Criterion) {
    let mut group = c.benchmark_group("binder/context_replacement");

    for &consumers in &[1usize, 16, 128] {
        let context = ContextWrapper::new(0_i64);
        let binder = Binder::new(context.clone());
        for _ in 0..consumers {
            let mirror = Rc::new(Mirror {
                cell: Observable::new(0),
            });
            binder.attach(mirror).expect("attach");
        }
        binder.run(true).expect("run");

        let mut next = 0_i64;
        group.throughput(Throughput::Elements(consumers as u64));
        group.bench_with_input(
            BenchmarkId::new("consumers", consumers),
            &consumers,
            |b, _| {
                b.iter(|| {
                    next += 1;
                    black_box(context.set(next).expect("rebuild"))
                })
            },
        );
        binder.destroy();
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_two_way_write,
    bench_adapted_write,
    bench_context_replacement
);
criterion_main!(benches);
