//! Benchmarks for atom resolution through scopes.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use syncscope_core::{Atom, AtomStore, ScopeContext, ScopeProvider, Store, SyncPair};

/// Build `depth` nested scopes aliasing a chain of primitive atoms.
fn nested_scopes(store: &Store, depth: usize) -> (Vec<ScopeProvider>, ScopeContext, Vec<Atom>) {
    let atoms: Vec<Atom> = (0..=depth).map(|_| Atom::primitive(0)).collect();
    let mut providers = Vec::with_capacity(depth);
    let mut context = ScopeContext::root(Arc::new(store.clone()));

    for level in 0..depth {
        let provider = ScopeProvider::new();
        let pair = SyncPair::new(atoms[level].clone(), atoms[level + 1].clone()).unwrap();
        context = provider.activate(&context, &[pair]).unwrap();
        providers.push(provider);
    }

    (providers, context, atoms)
}

/// Resolving an atom the scope knows nothing about.
fn bench_unrelated_resolve(c: &mut Criterion) {
    let store = Store::new();
    let (providers, _, _) = nested_scopes(&store, 1);
    let handle = providers[0].handle().unwrap();
    let unrelated = Atom::primitive(1);

    c.bench_function("resolve_unrelated_primitive", |b| {
        b.iter(|| black_box(handle.resolve(black_box(&unrelated))));
    });
}

/// Reading a derived atom through increasingly deep scope nesting.
fn bench_nested_derived_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_derived_get");

    for depth in [1, 4, 16] {
        let store = Store::new();
        let (_providers, context, atoms) = nested_scopes(&store, depth);
        let innermost = atoms[depth].clone();
        let derived = Atom::derived(move |get| {
            Ok(json!(get.get(&innermost)?.as_i64().unwrap_or(0) * 2))
        });

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| black_box(context.store().get(&derived).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_unrelated_resolve, bench_nested_derived_get);
criterion_main!(benches);
