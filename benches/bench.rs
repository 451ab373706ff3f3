use criterion::{black_box, criterion_group, criterion_main, Criterion};
use crossbeam_utils::thread;
use keylock::{KeyLock, SyncKeyLock};
#[cfg(feature = "tokio")]
use keylock::{AsyncKeyLock, TokioKeyLock};
use std::sync::{Arc, Mutex};

pub fn single_thread_lock_unlock(c: &mut Criterion) {
    let mut g = c.benchmark_group("single thread lock unlock");
    g.bench_function("std Mutex", |b| {
        let mutex = Mutex::new(());
        b.iter(|| {
            let _g = mutex.lock().unwrap();
        })
    });
    g.bench_function("SyncKeyLock (same key)", |b| {
        let table = SyncKeyLock::new();
        b.iter(|| {
            let _g = table.lock(black_box(3));
        })
    });
    g.bench_function("SyncKeyLock acquire/release (same key)", |b| {
        let table = SyncKeyLock::new();
        b.iter(|| {
            table.acquire(black_box(3));
            table.release(&3).unwrap();
        })
    });
    #[cfg(feature = "tokio")]
    g.bench_function("TokioKeyLock (same key)", |b| {
        let table = TokioKeyLock::new();
        b.iter(|| {
            let _g = table.lock(black_box(3));
        })
    });
    g.bench_function("SyncKeyLock (different key)", |b| {
        let table = SyncKeyLock::new();
        let mut i = 0;
        b.iter(|| {
            i += 1;
            let _g = table.lock(black_box(i));
        })
    });
    #[cfg(feature = "tokio")]
    g.bench_function("TokioKeyLock (different key)", |b| {
        let table = TokioKeyLock::new();
        let mut i = 0;
        b.iter(|| {
            i += 1;
            let _g = table.lock(black_box(i));
        })
    });
    g.finish();
}

fn spawn_threads(num: usize, func: impl Fn(usize) + Send + Sync) {
    thread::scope(|s| {
        for thread_index in 0..num {
            let func = &func;
            s.spawn(move |_| func(thread_index));
        }
    })
    .unwrap();
}

pub fn multi_thread_lock_unlock(c: &mut Criterion) {
    const NUM_THREADS: usize = 500;
    const NUM_LOCKS_PER_THREAD: usize = 1000;

    let mut g = c.benchmark_group("multi thread lock unlock");
    g.bench_function("std Mutex", |b| {
        let mutex = Arc::new(Mutex::new(()));
        b.iter(move || {
            spawn_threads(NUM_THREADS, |_| {
                for _ in 0..NUM_LOCKS_PER_THREAD {
                    let _g = mutex.lock().unwrap();
                }
            });
        })
    });
    g.bench_function("SyncKeyLock (same key)", |b| {
        let table = SyncKeyLock::new();
        b.iter(move || {
            spawn_threads(NUM_THREADS, |_| {
                for _ in 0..NUM_LOCKS_PER_THREAD {
                    let _g = table.lock(black_box(3));
                }
            });
        })
    });
    #[cfg(feature = "tokio")]
    g.bench_function("TokioKeyLock (same key)", |b| {
        let table = TokioKeyLock::new();
        b.iter(move || {
            spawn_threads(NUM_THREADS, |_| {
                for _ in 0..NUM_LOCKS_PER_THREAD {
                    let _g = table.lock(black_box(3));
                }
            });
        })
    });
    g.bench_function("SyncKeyLock (different key)", |b| {
        let table = SyncKeyLock::new();
        b.iter(move || {
            spawn_threads(NUM_THREADS, |thread_index| {
                for _ in 0..NUM_LOCKS_PER_THREAD {
                    let _g = table.lock(black_box(thread_index));
                }
            });
        })
    });
    #[cfg(feature = "tokio")]
    g.bench_function("TokioKeyLock (different key)", |b| {
        let table = TokioKeyLock::new();
        b.iter(move || {
            spawn_threads(NUM_THREADS, |thread_index| {
                for _ in 0..NUM_LOCKS_PER_THREAD {
                    let _g = table.lock(black_box(thread_index));
                }
            });
        })
    });
    g.finish();
}

#[cfg(feature = "tokio")]
pub fn async_lock_unlock(c: &mut Criterion) {
    const NUM_TASKS: usize = 500;
    const NUM_LOCKS_PER_TASK: usize = 100;

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut g = c.benchmark_group("async lock unlock");
    g.bench_function("TokioKeyLock (same key)", |b| {
        let table = Arc::new(TokioKeyLock::new());
        b.iter(|| {
            runtime.block_on(async {
                let tasks: Vec<_> = (0..NUM_TASKS)
                    .map(|_| {
                        let table = Arc::clone(&table);
                        tokio::spawn(async move {
                            for _ in 0..NUM_LOCKS_PER_TASK {
                                let _g = table.lock_async(black_box(3)).await;
                            }
                        })
                    })
                    .collect();
                for task in tasks {
                    task.await.unwrap();
                }
            })
        })
    });
    g.finish();
}

#[cfg(not(feature = "tokio"))]
criterion_group!(benches, single_thread_lock_unlock, multi_thread_lock_unlock);
#[cfg(feature = "tokio")]
criterion_group!(
    benches,
    single_thread_lock_unlock,
    multi_thread_lock_unlock,
    async_lock_unlock
);
criterion_main!(benches);
