use super::XorShift64;
use criterion::{black_box, Criterion};
use vmpool::VirtualArena;

const LIVE_BYTES: usize = 1024 * 1024 * 4; // 4MB live set
const OPS: usize = 10_000;

/// Fragmentation churn: variable-size blocks replaced at random. The arena
/// never frees, so it runs each round in a fresh reset.
pub fn run(c: &mut Criterion) {
    let mut group = c.benchmark_group("shbench");

    group.bench_function("heap_churn", |b| {
        b.iter(|| {
            let mut rng = XorShift64::new(0x1234_5678);
            let mut live = Vec::new();
            let mut current_bytes = 0;

            while current_bytes < LIVE_BYTES {
                let size = rng.gen_range(16, 8192);
                live.push(vec![0u8; size]);
                current_bytes += size;
            }

            for _ in 0..OPS {
                let idx = rng.gen_range(0, live.len());
                live[idx] = vec![0u8; rng.gen_range(16, 8192)];
                black_box(&live[idx]);
            }

            black_box(live);
        })
    });

    group.bench_function("arena_churn", |b| {
        let mut arena = VirtualArena::new(256 << 20, 1 << 20).unwrap();
        b.iter(|| {
            {
                let mut rng = XorShift64::new(0x1234_5678);
                let mut live: Vec<&mut [u8]> = Vec::new();
                let mut current_bytes = 0;

                while current_bytes < LIVE_BYTES {
                    let size = rng.gen_range(16, 8192);
                    live.push(arena.alloc_zeroed_slice(size).unwrap());
                    current_bytes += size;
                }

                for _ in 0..OPS {
                    let idx = rng.gen_range(0, live.len());
                    let size = rng.gen_range(16, 8192);
                    live[idx] = arena.alloc_zeroed_slice(size).unwrap();
                    black_box(&live[idx]);
                }
                black_box(live.len());
            }
            arena.reset().unwrap();
        })
    });

    group.finish();
}
