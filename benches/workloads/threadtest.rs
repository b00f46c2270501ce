use criterion::{black_box, Criterion, Throughput};
use std::sync::mpsc;
use std::thread;
use vmpool::GenerationalPool;

const OPS: usize = 50_000;

/// Producer/consumer pairs. Pools are not shared, so the consumer receives
/// handles and returns them to the producer, which owns the pool and frees.
pub fn run(c: &mut Criterion) {
    let mut group = c.benchmark_group("threadtest_prod_cons");

    for t in [2, 4, 8] {
        let pairs = t / 2;
        group.throughput(Throughput::Elements((OPS * pairs) as u64));

        group.bench_function(format!("pool_{}_threads", t), |b| {
            b.iter(|| {
                let mut handles = Vec::with_capacity(t);

                for _ in 0..pairs {
                    let (tx, rx) = mpsc::sync_channel(1024);
                    let (done_tx, done_rx) = mpsc::channel();

                    // Producer
                    handles.push(thread::spawn(move || {
                        let mut pool: GenerationalPool<usize> = GenerationalPool::new(1 << 16, 1024).unwrap();
                        for i in 0..OPS {
                            while let Ok(id) = done_rx.try_recv() {
                                pool.deallocate(id).unwrap();
                            }
                            let id = pool.insert(i).unwrap();
                            if tx.send(id).is_err() {
                                break;
                            }
                        }
                        drop(tx);
                        for id in done_rx {
                            pool.deallocate(id).unwrap();
                        }
                        assert!(pool.is_empty());
                    }));

                    // Consumer
                    handles.push(thread::spawn(move || {
                        while let Ok(id) = rx.recv() {
                            black_box(id);
                            if done_tx.send(id).is_err() {
                                break;
                            }
                        }
                    }));
                }

                for h in handles {
                    h.join().unwrap();
                }
            })
        });

        group.bench_function(format!("box_{}_threads", t), |b| {
            b.iter(|| {
                let mut handles = Vec::with_capacity(t);

                for _ in 0..pairs {
                    let (tx, rx) = mpsc::sync_channel(1024);

                    handles.push(thread::spawn(move || {
                        for i in 0..OPS {
                            if tx.send(Box::new(i)).is_err() {
                                break;
                            }
                        }
                    }));

                    // Receiving and dropping is a remote free
                    handles.push(thread::spawn(move || {
                        while let Ok(val) = rx.recv() {
                            black_box(val);
                        }
                    }));
                }

                for h in handles {
                    h.join().unwrap();
                }
            })
        });
    }
    group.finish();
}
