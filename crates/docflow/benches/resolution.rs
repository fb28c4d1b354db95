//! Resolution benchmarks: building and resolving a document, and updates
//! that should touch little or nothing.

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use docflow::{CoreConfig, DocumentCore, SerializedComponent, UpdateOptions, Value};
use std::hint::black_box;

fn document(length: usize) -> SerializedComponent {
    SerializedComponent::new("document")
        .child(SerializedComponent::new("number").named("n").text("37/3"))
        .child(SerializedComponent::new("number").named("k"))
        .child(
            SerializedComponent::new("sequence")
                .named("s")
                .attr("length", length as f64),
        )
        .child(
            SerializedComponent::new("repeat")
                .named("r")
                .attr("for", "$s")
                .child(SerializedComponent::new("math").text("v^2")),
        )
        .child(
            SerializedComponent::new("polygon")
                .named("p")
                .attr("rigid", true)
                .attr("vertices", "(1,1), (-1,1), (-1,-1), (1,-1)"),
        )
}

fn benchmark_initial_resolution(c: &mut Criterion) {
    let config = CoreConfig::default();
    for length in [10, 100] {
        let root = document(length);
        c.bench_function(&format!("build_and_resolve_{length}"), |b| {
            b.iter(|| {
                let mut core = DocumentCore::with_config(&root, &config).unwrap();
                black_box(core.resolve_renderer_state().unwrap())
            });
        });
    }
}

fn benchmark_updates(c: &mut Criterion) {
    let config = CoreConfig::default();
    let root = document(100);
    let mut core = DocumentCore::with_config(&root, &config).unwrap();
    core.resolve_renderer_state().unwrap();
    core.request_value("k", "value", Value::Number(5.0), &UpdateOptions::default())
        .unwrap();

    c.bench_function("no_op_update", |b| {
        b.iter(|| {
            black_box(
                core.request_value("k", "value", Value::Number(5.0), &UpdateOptions::transient())
                    .unwrap(),
            )
        });
    });

    c.bench_function("rigid_drag", |b| {
        let mut step = 0.0;
        b.iter(|| {
            step += 0.01;
            black_box(
                core.request_value("p", "vertex1_1", Value::Number(1.0 + step), &UpdateOptions::transient())
                    .unwrap(),
            )
        });
    });

    c.bench_function("grow_repeat", |b| {
        b.iter_batched(
            || DocumentCore::with_config(&root, &config).unwrap(),
            |mut core| {
                black_box(
                    core.request_value("s", "length", Value::Number(101.0), &UpdateOptions::default())
                        .unwrap(),
                )
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, benchmark_initial_resolution, benchmark_updates);
criterion_main!(benches);
