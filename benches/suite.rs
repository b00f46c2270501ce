//! Classic allocator workloads, each run on vmpool (`pool_*`/`arena_*`) and
//! on the global allocator (`box_*`/`system_*`/`heap_*`).
//!
//! `cargo xtask bench` runs this once per `alloc-*` feature and pairs the rows
//! by case name.

use criterion::{criterion_group, criterion_main, Criterion};

mod workloads;

macro_rules! global_allocator {
    ($($feature:literal => $alloc:path),* $(,)?) => {
        $(
            #[cfg(feature = $feature)]
            #[global_allocator]
            static GLOBAL: $alloc = $alloc;
        )*

        /// Name of the heap the `box`/`system`/`heap` rows ran on.
        fn heap_name() -> &'static str {
            $(
                if cfg!(feature = $feature) {
                    return $feature;
                }
            )*
            "alloc-system"
        }
    };
}

global_allocator! {
    "alloc-mimalloc" => mimalloc::MiMalloc,
    "alloc-snmalloc" => snmalloc_rs::SnMalloc,
    "alloc-jemalloc" => jemallocator::Jemalloc,
}

fn bench_main(c: &mut Criterion) {
    eprintln!("heap rows on {}", heap_name());
    workloads::micro::run(c);
    workloads::larson::run(c);
    workloads::threadtest::run(c);
    workloads::shbench::run(c);
}

criterion_group!(benches, bench_main);
criterion_main!(benches);
