//! Benchmark for coin selection over large candidate sets

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use txforge::builder::selection::{SelectionMode, Selector};
use txforge::types::{SpendableOutput, TransactionId};

fn candidate_set(count: usize) -> Vec<SpendableOutput> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[..8].copy_from_slice(&(i as u64).to_be_bytes());
            SpendableOutput {
                transaction_id: TransactionId::new(seed),
                index: (i % 4) as u32,
                // Spread amounts and heights so every mode sorts for real
                amount: 1_000 + ((i as u64 * 7_919) % 500_000_000),
                script_bytes: vec![0x20; 34],
                confirmation_height: (i as u64 * 13) % 1_000_000,
                is_coinbase: i % 17 == 0,
            }
        })
        .collect()
}

fn bench_selection_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("selection");

    for count in [100, 1_000, 10_000].iter() {
        let candidates = candidate_set(*count);
        let target = 2_000_000_000u64;

        for mode in [SelectionMode::Auto, SelectionMode::LargestFirst, SelectionMode::SmallestFirst]
        {
            group.bench_with_input(
                BenchmarkId::new(mode.as_str(), count),
                &candidates,
                |b, candidates| {
                    b.iter(|| {
                        let mut selector =
                            Selector::new(mode, black_box(candidates.clone()), 84);
                        selector.extend_to(black_box(target));
                        black_box(selector.plan(target))
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_selection_modes);
criterion_main!(benches);
