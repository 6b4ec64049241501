use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mocker_builder::{Mocker, SymbolRegistry, Target, TargetDescriptor, TargetResolver, Value};
use std::sync::Arc;

#[allow(dead_code)]
struct Batman;

/// Benchmark path resolution for each descriptor kind
fn bench_path_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_resolution");

    let descriptors = [
        ("class_member", TargetDescriptor::new(Target::class::<Batman>()).method("eat")),
        ("class_at", TargetDescriptor::new(Target::class_at("pkg.mod", "C")).attribute("_x")),
        ("module", TargetDescriptor::new(Target::module("app::heroes")).attribute("VERSION")),
        ("string_path", TargetDescriptor::new(Target::path("app.heroes.Batman.eat"))),
    ];

    for (name, descriptor) in descriptors.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), descriptor, |b, descriptor| {
            b.iter(|| TargetResolver::resolve_path(black_box(descriptor)))
        });
    }

    group.finish();
}

/// Benchmark a full patch and teardown cycle
fn bench_patch_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("patch_lifecycle");

    let symbols = Arc::new(SymbolRegistry::new());
    symbols
        .register_class("app.Hero")
        .unwrap()
        .register_routine("app.Hero.run", |_| Ok(Value::from("running")))
        .unwrap();

    group.bench_function("patch_and_teardown", |b| {
        b.iter(|| {
            let mocker = Mocker::new(Arc::clone(&symbols));
            mocker
                .patch(
                    TargetDescriptor::new(Target::path("app.Hero.run"))
                        .return_value("walking")
                        .configure("return_value.speed", 3),
                )
                .unwrap();
            mocker.teardown().unwrap()
        })
    });

    for depth in [1usize, 8, 32] {
        group.bench_with_input(BenchmarkId::new("stacked_call", depth), &depth, |b, &depth| {
            let mocker = Mocker::new(Arc::clone(&symbols));
            for _ in 0..depth {
                mocker.patch(Target::path("app.Hero.run")).unwrap();
            }
            b.iter(|| symbols.call(black_box("app.Hero.run"), &[]))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_path_resolution, bench_patch_lifecycle);
criterion_main!(benches);
