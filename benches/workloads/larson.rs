use super::XorShift64;
use criterion::{black_box, Criterion, Throughput};
use std::thread;
use vmpool::{ElementId, GenerationalPool};

const OPS_PER_THREAD: usize = 50_000;
const OBJECTS_PER_THREAD: usize = 1000;

type Object = [u8; 128];

pub fn run(c: &mut Criterion) {
    let mut group = c.benchmark_group("larson");

    // Each thread owns its pool; nothing is shared.
    let threads = [1, 2, 4, 8];

    for &t in &threads {
        group.throughput(Throughput::Elements((OPS_PER_THREAD * t) as u64));

        group.bench_function(format!("pool_{}_threads", t), |b| {
            b.iter(|| {
                let handles: Vec<_> = (0..t)
                    .map(|i| {
                        thread::spawn(move || {
                            let mut rng = XorShift64::new((i as u64 + 1) * 0xdead_beef);
                            let mut pool: GenerationalPool<Object> =
                                GenerationalPool::new(OBJECTS_PER_THREAD as u32 * 2, 256).unwrap();
                            let mut objects: Vec<ElementId> =
                                (0..OBJECTS_PER_THREAD).map(|_| pool.insert([0; 128]).unwrap()).collect();

                            for _ in 0..OPS_PER_THREAD {
                                let idx = rng.gen_range(0, OBJECTS_PER_THREAD);
                                pool.deallocate(objects[idx]).unwrap();
                                let (id, obj) = pool.allocate_zeroed().unwrap();
                                obj[0] = idx as u8;
                                objects[idx] = id;
                                black_box(&pool[id]);
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
            })
        });

        group.bench_function(format!("box_{}_threads", t), |b| {
            b.iter(|| {
                let handles: Vec<_> = (0..t)
                    .map(|i| {
                        thread::spawn(move || {
                            let mut rng = XorShift64::new((i as u64 + 1) * 0xdead_beef);
                            let mut objects: Vec<Box<Object>> =
                                (0..OBJECTS_PER_THREAD).map(|_| Box::new([0; 128])).collect();

                            for _ in 0..OPS_PER_THREAD {
                                let idx = rng.gen_range(0, OBJECTS_PER_THREAD);
                                let mut obj = Box::new([0; 128]);
                                obj[0] = idx as u8;
                                objects[idx] = obj;
                                black_box(&objects[idx]);
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
            })
        });
    }
    group.finish();
}
