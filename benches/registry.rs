//! Benchmarks for refcount-registry.
//!
//! Run with: cargo bench

use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use refcount_registry::{ObjectRegistry, ObjectType, RegistryConfig};

fn running(config: RegistryConfig) -> ObjectRegistry {
    let registry = ObjectRegistry::new(config);
    registry.init().expect("fresh registry");
    registry
}

fn bench_lifecycle(c: &mut Criterion) {
    let registry = running(RegistryConfig::default());

    let mut group = c.benchmark_group("lifecycle");

    group.bench_function("allocate_release_u64", |b| {
        b.iter(|| {
            let object = registry
                .allocate(ObjectType::Generic, "bench", black_box(7u64), None)
                .unwrap();
            registry.release(object).unwrap();
        })
    });

    group.bench_function("allocate_release_1kb", |b| {
        b.iter(|| {
            let object = registry
                .allocate(ObjectType::Channel, "SCCP/100-00000001", [0u8; 1024], None)
                .unwrap();
            registry.release(object).unwrap();
        })
    });

    group.finish();
}

fn bench_retain_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("retain_release");
    group.throughput(Throughput::Elements(1000));

    // Directory load changes the bucket scan length
    for live in [0usize, 563, 4 * 563] {
        let registry = running(RegistryConfig::default());
        let filler: Vec<_> = (0..live)
            .map(|i| registry.allocate(ObjectType::Line, "filler", i, None).unwrap())
            .collect();
        let object = registry.allocate(ObjectType::Device, "target", 0u32, None).unwrap();

        group.bench_with_input(BenchmarkId::new("pairs_1000x", live), &live, |b, _| {
            b.iter(|| {
                for _ in 0..1000 {
                    registry.retain(black_box(object)).unwrap();
                    registry.release(object).unwrap();
                }
            })
        });

        registry.release(object).unwrap();
        for filler in filler {
            registry.release(filler).unwrap();
        }
    }

    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended");

    for threads in [2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::new("shared_object", threads), &threads, |b, &threads| {
            let registry = Arc::new(running(RegistryConfig::default()));
            let object = registry.allocate(ObjectType::Channel, "shared", 0u64, None).unwrap();

            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let registry = registry.clone();
                        thread::spawn(move || {
                            for _ in 0..1000 {
                                registry.retain(object).unwrap();
                                registry.release(object).unwrap();
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });

            registry.release(object).unwrap();
        });
    }

    group.finish();
}

fn bench_replace(c: &mut Criterion) {
    let registry = running(RegistryConfig::default());
    let a = registry.allocate(ObjectType::Line, "a", 1u32, None).unwrap();
    let b_obj = registry.allocate(ObjectType::Line, "b", 2u32, None).unwrap();
    let mut slot = Some(a);
    registry.retain(a).unwrap();

    c.bench_function("replace_swap", |b| {
        b.iter(|| {
            let next = if slot == Some(a) { b_obj } else { a };
            registry.replace(&mut slot, Some(next)).unwrap();
        })
    });

    registry.clear(&mut slot).unwrap();
    registry.release(a).unwrap();
    registry.release(b_obj).unwrap();
}

criterion_group!(
    benches,
    bench_lifecycle,
    bench_retain_release,
    bench_contended,
    bench_replace
);
criterion_main!(benches);
