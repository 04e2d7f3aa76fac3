//! Multi-threaded stress tests: refcount balance and exactly-once destruction.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use refcount_registry::{AuditEvent, ObjectRef, ObjectRegistry, ObjectType, RegistryConfig, RegistryError};

struct Counted {
    destructed: Arc<AtomicUsize>,
}

fn count_destruction(_registry: &ObjectRegistry, payload: &mut dyn Any) {
    if let Some(counted) = payload.downcast_mut::<Counted>() {
        counted.destructed.fetch_add(1, Ordering::SeqCst);
    }
}

fn running(config: RegistryConfig) -> Arc<ObjectRegistry> {
    let registry = Arc::new(ObjectRegistry::new(config));
    registry.init().unwrap();
    registry
}

fn counted(registry: &ObjectRegistry, object_type: ObjectType, destructed: &Arc<AtomicUsize>) -> ObjectRef<Counted> {
    registry
        .allocate(
            object_type,
            "stress",
            Counted { destructed: destructed.clone() },
            Some(count_destruction),
        )
        .unwrap()
}

fn refcount<T>(registry: &ObjectRegistry, object: ObjectRef<T>) -> Option<usize> {
    registry
        .entries()
        .into_iter()
        .find(|e| e.payload_address == object.address())
        .map(|e| e.refcount)
}

#[test]
fn test_retain_release_storm_is_balanced() {
    const THREADS: usize = 8;
    const PAIRS: usize = 2_000;

    let registry = running(RegistryConfig::default());
    let destructed = Arc::new(AtomicUsize::new(0));
    let object = counted(&registry, ObjectType::Channel, &destructed);
    registry.retain(object).unwrap();
    assert_eq!(refcount(&registry, object), Some(2));

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..PAIRS {
                    registry.retain(object).unwrap();
                    registry.release(object).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(refcount(&registry, object), Some(2));
    assert_eq!(destructed.load(Ordering::SeqCst), 0, "destroyed mid-storm");

    registry.release(object).unwrap();
    registry.release(object).unwrap();
    assert_eq!(destructed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_audited_storm_keeps_every_record() {
    const THREADS: usize = 8;
    const PAIRS: usize = 2_000;

    let mut config = RegistryConfig::default()
        .with_memory_audit()
        .with_audit_flush_threshold(16);
    config.audit_memory_capacity = 1 + 2 * THREADS * PAIRS;

    let registry = running(config);
    let destructed = Arc::new(AtomicUsize::new(0));
    let object = counted(&registry, ObjectType::Channel, &destructed);

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..PAIRS {
                    registry.retain(object).unwrap();
                    registry.release(object).unwrap();
                }
            })
        })
        .collect();

    let panicked = handles
        .into_iter()
        .map(|h| h.join())
        .filter(Result::is_err)
        .count();
    assert_eq!(panicked, 0);

    let records = registry.drain_audit();
    assert_eq!(records.len(), 1 + 2 * THREADS * PAIRS);
    assert_eq!(records[0].event, AuditEvent::Constructed);

    let changed: Vec<_> = records
        .iter()
        .filter(|r| r.event == AuditEvent::Changed)
        .collect();
    assert_eq!(changed.len(), 2 * THREADS * PAIRS);
    assert_eq!(changed.iter().map(|r| r.delta).sum::<isize>(), 0);

    // Nothing left queued once drained
    assert!(registry.drain_audit().is_empty());
    assert_eq!(refcount(&registry, object), Some(1));
    registry.release(object).unwrap();
}

#[test]
fn test_concurrent_final_releases_destroy_once() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 200;

    let registry = running(RegistryConfig::default());

    for _ in 0..ROUNDS {
        let destructed = Arc::new(AtomicUsize::new(0));
        let object = counted(&registry, ObjectType::Line, &destructed);
        for _ in 1..THREADS {
            registry.retain(object).unwrap();
        }

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    registry.release(object)
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(destructed.load(Ordering::SeqCst), 1);
    }

    let stats = registry.stats();
    assert_eq!(stats.destructions, ROUNDS as u64);
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.invalid_references, 0);
}

#[test]
fn test_extra_releases_never_double_destroy() {
    const THREADS: usize = 8;

    let registry = running(RegistryConfig::default());
    let destructed = Arc::new(AtomicUsize::new(0));
    let object = counted(&registry, ObjectType::Device, &destructed);
    registry.retain(object).unwrap();

    // Two valid releases, the rest must be rejected
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                registry.release(object).is_ok()
            })
        })
        .collect();

    let succeeded = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(succeeded, 2);
    assert_eq!(destructed.load(Ordering::SeqCst), 1);
    assert_eq!(registry.stats().invalid_references, (THREADS - 2) as u64);
}

#[test]
fn test_concurrent_churn_across_buckets() {
    const THREADS: usize = 6;
    const OBJECTS: usize = 500;

    // Few buckets so creation and cleanup race constantly
    let registry = running(RegistryConfig::default().with_bucket_count(7));
    let destructed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let registry = registry.clone();
            let destructed = destructed.clone();
            thread::spawn(move || {
                let object_type = ObjectType::DRAIN_ORDER[t % ObjectType::COUNT];
                for _ in 0..OBJECTS {
                    let object = counted(&registry, object_type, &destructed);
                    registry.retain(object).unwrap();
                    let mut slot = None;
                    registry.replace(&mut slot, Some(object)).unwrap();
                    registry.release(object).unwrap();
                    registry.release(object).unwrap();
                    registry.clear(&mut slot).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let stats = registry.stats();
    assert_eq!(destructed.load(Ordering::SeqCst), THREADS * OBJECTS);
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.live_objects, 0);
    assert_eq!(stats.allocated_bytes, 0);
    assert_eq!(stats.buckets_in_use, 0);
}

#[test]
fn test_shutdown_races_with_workers() {
    const THREADS: usize = 4;

    let registry = running(RegistryConfig::default().with_bucket_count(13));
    let destructed = Arc::new(AtomicUsize::new(0));
    let allocated = Arc::new(AtomicUsize::new(0));
    let stop = Arc::new(AtomicBool::new(false));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let registry = registry.clone();
            let destructed = destructed.clone();
            let allocated = allocated.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut held = Vec::new();
                let mut round = 0usize;
                while !stop.load(Ordering::Relaxed) {
                    round += 1;
                    let object = match registry.allocate(
                        ObjectType::Channel,
                        "worker",
                        Counted { destructed: destructed.clone() },
                        Some(count_destruction),
                    ) {
                        Ok(object) => object,
                        Err(RegistryError::NotRunning(_)) => break,
                        Err(err) => panic!("unexpected error: {}", err),
                    };
                    allocated.fetch_add(1, Ordering::SeqCst);

                    // Keep every other object alive so shutdown has work
                    if round % 2 == 0 {
                        held.push(object);
                    } else if registry.release(object).is_err() {
                        break;
                    }
                }
            })
        })
        .collect();

    while allocated.load(Ordering::SeqCst) < 200 {
        thread::yield_now();
    }
    let report = registry.shutdown();
    stop.store(true, Ordering::Relaxed);

    for handle in handles {
        handle.join().unwrap();
    }

    // Every object was destroyed exactly once, by a release or by the drain
    assert_eq!(destructed.load(Ordering::SeqCst), allocated.load(Ordering::SeqCst));
    assert!(report.forced > 0);
    assert_eq!(registry.stats().live_objects, 0);
    assert_eq!(registry.stats().allocated_bytes, 0);
}
