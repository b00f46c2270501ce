use criterion::{black_box, Criterion};
use std::alloc::Layout;
use vmpool::{GenerationalPool, RawAlloc, SystemAlloc, VirtualArena};

pub fn run(c: &mut Criterion) {
    bench_alloc_small(c);
    bench_alloc_medium(c);
    bench_alloc_free_cycle(c);
}

fn bench_alloc_small(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro_small");
    group.warm_up_time(std::time::Duration::from_millis(500));
    group.measurement_time(std::time::Duration::from_secs(1));
    group.sample_size(10);

    let layout = Layout::new::<u128>();

    group.bench_function("system_16b", |b| {
        let mut sys = SystemAlloc;
        b.iter(|| unsafe {
            let p = sys.allocate(black_box(layout)).unwrap();
            sys.deallocate(p, layout);
        })
    });

    group.bench_function("pool_16b", |b| {
        let mut pool: GenerationalPool<u128> = GenerationalPool::new(1 << 16, 256).unwrap();
        b.iter(|| {
            let id = pool.insert(black_box(10)).unwrap();
            pool.deallocate(id).unwrap();
        })
    });

    group.finish();
}

fn bench_alloc_medium(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro_medium");

    group.bench_function("system_1kb_x1000", |b| {
        let mut sys = SystemAlloc;
        let layout = Layout::from_size_align(1024, 8).unwrap();
        let mut blocks = Vec::with_capacity(1000);
        b.iter(|| {
            for _ in 0..1000 {
                blocks.push(sys.allocate(layout).unwrap());
            }
            for p in blocks.drain(..) {
                unsafe { sys.deallocate(p, layout) };
            }
        })
    });

    group.bench_function("arena_1kb_x1000", |b| {
        let mut arena = VirtualArena::new(64 << 20, 64 << 10).unwrap();
        b.iter(|| {
            for _ in 0..1000 {
                black_box(arena.alloc_raw(1024, 8).unwrap());
            }
            arena.reset().unwrap();
        })
    });

    group.finish();
}

fn bench_alloc_free_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("micro_cycle");

    group.bench_function("pool_fill_drain_1000", |b| {
        let mut pool: GenerationalPool<[u64; 4]> = GenerationalPool::new(4096, 256).unwrap();
        let mut ids = Vec::with_capacity(1000);
        b.iter(|| {
            for i in 0..1000u64 {
                ids.push(pool.insert([i; 4]).unwrap());
            }
            for id in ids.drain(..) {
                pool.deallocate(id).unwrap();
            }
        })
    });

    group.bench_function("box_fill_drain_1000", |b| {
        let mut boxes = Vec::with_capacity(1000);
        b.iter(|| {
            for i in 0..1000u64 {
                boxes.push(Box::new([i; 4]));
            }
            boxes.clear();
        })
    });

    group.finish();
}
