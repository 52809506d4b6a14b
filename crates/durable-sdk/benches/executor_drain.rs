//! Benchmarks the single-threaded cooperative task executor (`workflow::
//! TaskExecutor`) under the two shapes real workflow code produces: a flat
//! batch of tasks that each complete on their first poll (the common case
//! for dispatching a signal/query handler), and a handful of tasks that
//! re-queue themselves a fixed number of times before completing (the
//! shape a workflow awaiting several timers/activities in sequence takes).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use durable_sdk::workflow::TaskExecutor;

struct YieldNTimes {
    remaining: usize,
}

impl Future for YieldNTimes {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.remaining == 0 {
            Poll::Ready(())
        } else {
            self.remaining -= 1;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

fn bench_drain_flat_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("executor_drain_flat_batch");
    for task_count in [10usize, 100, 1_000] {
        group.bench_function(format!("{task_count}_tasks"), |b| {
            b.iter_batched(
                || {
                    let mut executor = TaskExecutor::new();
                    for _ in 0..task_count {
                        executor.spawn(async {});
                    }
                    executor
                },
                |mut executor| {
                    executor.drain().unwrap();
                    black_box(executor.is_quiescent());
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_drain_self_waking_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("executor_drain_self_waking_chain");
    for yields in [10usize, 100, 1_000] {
        group.bench_function(format!("{yields}_yields"), |b| {
            b.iter_batched(
                || {
                    let mut executor = TaskExecutor::new();
                    executor.spawn(YieldNTimes { remaining: yields });
                    executor
                },
                |mut executor| {
                    executor.drain().unwrap();
                    black_box(executor.is_quiescent());
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_spawn(c: &mut Criterion) {
    c.bench_function("executor_spawn_single_task", |b| {
        b.iter_batched(
            TaskExecutor::new,
            |mut executor| {
                black_box(executor.spawn(async {}));
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_drain_flat_batch, bench_drain_self_waking_chain, bench_spawn);
criterion_main!(benches);
