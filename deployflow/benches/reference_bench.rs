//! Benchmarks for reference parsing and retry classification.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use deployflow::client::{RetryClient, RetryPolicy};
use deployflow::core::{DeploymentConfig, ImageReference, RolloutInstance, RolloutPhase};
use deployflow::errors::ClusterError;
use deployflow::utils::WaitBudget;

const PINNED: &str = "registry.local:5000/demo/frontend:latest@sha256:\
                      9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

fn parsing_benchmark(c: &mut Criterion) {
    c.bench_function("image_reference_pinned", |b| {
        b.iter(|| black_box(PINNED).parse::<ImageReference>())
    });

    c.bench_function("image_reference_short", |b| {
        b.iter(|| black_box("frontend").parse::<ImageReference>())
    });

    c.bench_function("wait_budget", |b| {
        b.iter(|| WaitBudget::parse(black_box("15min")))
    });
}

fn retry_benchmark(c: &mut Criterion) {
    let client = RetryClient::new(RetryPolicy::new());
    let errors = [
        ClusterError::from_status(404, "not found"),
        ClusterError::from_status(409, "conflict"),
        ClusterError::from_status(503, "unavailable"),
    ];

    c.bench_function("retry_decide", |b| {
        b.iter(|| {
            for error in &errors {
                black_box(client.decide(black_box(2), error));
            }
        })
    });
}

fn snapshot_benchmark(c: &mut Criterion) {
    let image: ImageReference = PINNED.parse().expect("valid reference");
    let mut parent = DeploymentConfig::new("demo", "frontend", 3)
        .with_config_trigger()
        .with_image_trigger("frontend:latest".parse().expect("valid reference"));
    parent.record_image_change("frontend:latest", &image);
    let rollout = RolloutInstance::from_parent(&parent, RolloutPhase::Complete).expect("snapshot encodes");

    c.bench_function("previous_digest", |b| {
        b.iter(|| {
            black_box(&rollout)
                .parent_snapshot()
                .ok()
                .and_then(|dc| dc.image_hex_for("frontend:latest"))
        })
    });
}

criterion_group!(benches, parsing_benchmark, retry_benchmark, snapshot_benchmark);
criterion_main!(benches);
