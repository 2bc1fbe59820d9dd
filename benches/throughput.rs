use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ringshm::{OpenFlags, Queue};
use std::thread;

const MSG_PER_RUN: u64 = 1_000_000;

fn unique_name(tag: &str) -> String {
    let pid = std::process::id();
    let counter = std::sync::atomic::AtomicU64::new(0);
    let n = counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    format!("/ringshm_bench_{tag}_{pid}_{n}")
}

fn bench_spsc_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc");
    group.throughput(Throughput::Elements(MSG_PER_RUN));

    group.bench_function("push_pop_4byte", |b| {
        b.iter(|| {
            let name = unique_name("spsc");
            let producer =
                Queue::open(&name, 4096, 64, OpenFlags::CREATE | OpenFlags::PRODUCER).unwrap();

            let producer_name = name.clone();
            let producer_handle = thread::spawn(move || {
                let q = Queue::open(&producer_name, 0, 0, OpenFlags::PRODUCER).unwrap();
                let mut sent = 0u32;
                while (sent as u64) < MSG_PER_RUN {
                    if q.push(&sent.to_ne_bytes()).is_ok() {
                        sent += 1;
                    } else {
                        std::hint::spin_loop();
                    }
                }
            });
            drop(producer);

            let consumer = Queue::open(&name, 0, 0, OpenFlags::CONSUMER).unwrap();
            let mut buf = [0u8; 64];
            let mut received = 0u64;
            while received < MSG_PER_RUN {
                match consumer.pop(&mut buf) {
                    Ok(n) => {
                        black_box(&buf[..n]);
                        received += 1;
                    }
                    Err(_) => std::hint::spin_loop(),
                }
            }

            producer_handle.join().unwrap();
            drop(consumer);
            Queue::unlink(&name).unwrap();
        });
    });

    group.finish();
}

fn bench_reserve_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("zero_copy");
    group.throughput(Throughput::Elements(MSG_PER_RUN));

    group.bench_function("reserve_commit_32byte", |b| {
        b.iter(|| {
            let name = unique_name("reserve");
            let mut producer =
                Queue::open(&name, 4096, 64, OpenFlags::CREATE | OpenFlags::PRODUCER).unwrap();
            let consumer_name = name.clone();
            let consumer_handle = thread::spawn(move || {
                let consumer = Queue::open(&consumer_name, 0, 0, OpenFlags::CONSUMER).unwrap();
                let mut buf = [0u8; 64];
                let mut received = 0u64;
                while received < MSG_PER_RUN {
                    match consumer.pop(&mut buf) {
                        Ok(n) => {
                            black_box(&buf[..n]);
                            received += 1;
                        }
                        Err(_) => std::hint::spin_loop(),
                    }
                }
            });

            let mut sent = 0u64;
            while sent < MSG_PER_RUN {
                if let Ok(mut r) = producer.reserve(32) {
                    r.as_mut_slice()[..8].copy_from_slice(&sent.to_ne_bytes());
                    r.commit_n(32);
                    sent += 1;
                } else {
                    std::hint::spin_loop();
                }
            }

            consumer_handle.join().unwrap();
            drop(producer);
            Queue::unlink(&name).unwrap();
        });
    });

    group.finish();
}

fn bench_consumer_groups(c: &mut Criterion) {
    let mut group = c.benchmark_group("consumer_groups");
    let msgs = 200_000u64;

    for num_groups in [1, 4, 16].iter() {
        group.throughput(Throughput::Elements(msgs * *num_groups as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{num_groups}_groups")),
            num_groups,
            |b, &n| {
                b.iter(|| {
                    let name = unique_name("groups");
                    let producer =
                        Queue::open(&name, 4096, 64, OpenFlags::CREATE | OpenFlags::PRODUCER)
                            .unwrap();
                    let groups: Vec<_> = (0..n).map(|_| producer.create_group(0).unwrap()).collect();

                    for i in 0..msgs {
                        while producer.push(&(i as u32).to_ne_bytes()).is_err() {
                            std::hint::spin_loop();
                        }
                        for g in &groups {
                            let mut buf = [0u8; 64];
                            while g.pop(&mut buf).is_err() {
                                std::hint::spin_loop();
                            }
                            black_box(&buf);
                        }
                    }

                    drop(groups);
                    drop(producer);
                    Queue::unlink(&name).unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_spsc_push_pop, bench_reserve_commit, bench_consumer_groups);
criterion_main!(benches);
