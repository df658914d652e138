//! Performance benchmarks for stitch-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use stitch_engine::{compute_diff, ChildRecord, ProjectionRules, ProposedItem};

fn build_original(count: usize) -> Vec<ChildRecord> {
    (0..count)
        .map(|i| {
            ChildRecord::new(
                format!("c-{i}"),
                "p-1",
                (i + 1) as u32,
                json!({"sku": format!("sku-{i}"), "qty": i}),
            )
        })
        .collect()
}

fn bench_compute_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_diff");
    let rules = ProjectionRules::default();

    for size in [10usize, 100, 1000] {
        let original = build_original(size);

        // Identity: everything unchanged
        let identity: Vec<ProposedItem> = original
            .iter()
            .map(|r| ProposedItem::existing(r.id.clone(), r.payload.clone()))
            .collect();
        group.bench_with_input(BenchmarkId::new("identity", size), &size, |b, _| {
            b.iter(|| compute_diff(black_box(&original), black_box(&identity), &rules))
        });

        // Reversal: every record needs its order moved
        let reversed: Vec<ProposedItem> = original
            .iter()
            .rev()
            .map(|r| ProposedItem::existing(r.id.clone(), r.payload.clone()))
            .collect();
        group.bench_with_input(BenchmarkId::new("reversed", size), &size, |b, _| {
            b.iter(|| compute_diff(black_box(&original), black_box(&reversed), &rules))
        });

        // Churn: half replaced with new items
        let churn: Vec<ProposedItem> = original
            .iter()
            .enumerate()
            .map(|(i, r)| {
                if i % 2 == 0 {
                    ProposedItem::new(json!({"sku": format!("new-{i}"), "qty": i}))
                } else {
                    ProposedItem::existing(r.id.clone(), r.payload.clone())
                }
            })
            .collect();
        group.bench_with_input(BenchmarkId::new("churn", size), &size, |b, _| {
            b.iter(|| compute_diff(black_box(&original), black_box(&churn), &rules))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compute_diff);
criterion_main!(benches);
