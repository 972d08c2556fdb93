use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use datasource::{
    CallerThreadExecutor, DataSource, DataSourceRef, DataSubscriber,
    FirstAvailableDataSourceSupplier, IncreasingQualityDataSourceSupplier, SimpleDataSource,
    Supplier,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

struct Counter(AtomicUsize);

impl DataSubscriber<u64> for Counter {
    fn on_new_result(&self, _data_source: &DataSourceRef<u64>) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn on_failure(&self, _data_source: &DataSourceRef<u64>) {}

    fn on_cancellation(&self, _data_source: &DataSourceRef<u64>) {}
}

/// Benchmark one intermediate result fanned out to a varying number of subscribers
fn bench_fan_out_varying_subscribers(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for subscriber_count in [1, 8, 64, 512].iter() {
        group.throughput(Throughput::Elements(*subscriber_count as u64));
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscriber_count),
            subscriber_count,
            |b, &subscriber_count| {
                let source = SimpleDataSource::<u64>::create();
                let counter = Arc::new(Counter(AtomicUsize::new(0)));
                for _ in 0..subscriber_count {
                    source.subscribe(counter.clone(), Arc::new(CallerThreadExecutor));
                }

                let mut value = 0;
                b.iter(|| {
                    value += 1;
                    source.set_result(black_box(value), false);
                });
            },
        );
    }
    group.finish();
}

/// Benchmark concurrent producers updating one source (high contention)
fn bench_concurrent_set_result(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_set_result");

    for thread_count in [2, 4, 8].iter() {
        group.throughput(Throughput::Elements(*thread_count as u64 * 1000));
        group.bench_with_input(
            BenchmarkId::from_parameter(thread_count),
            thread_count,
            |b, &thread_count| {
                b.iter(|| {
                    let source = SimpleDataSource::<u64>::create();
                    source.subscribe(
                        Arc::new(Counter(AtomicUsize::new(0))),
                        Arc::new(CallerThreadExecutor),
                    );

                    let mut handles_vec = vec![];

                    for _ in 0..thread_count {
                        let source_clone = Arc::clone(&source);
                        let join_handle = thread::spawn(move || {
                            for i in 0..1000 {
                                source_clone.set_result(black_box(i), false);
                                source_clone.set_progress(black_box(0.5));
                            }
                        });
                        handles_vec.push(join_handle);
                    }

                    for join_handle in handles_vec {
                        join_handle.join().unwrap();
                    }
                    source.close();
                });
            },
        );
    }
    group.finish();
}

fn leaves(count: usize) -> Vec<Arc<dyn Supplier<u64>>> {
    (0..count)
        .map(|i| {
            Arc::new(move || {
                let leaf = SimpleDataSource::<u64>::create();
                leaf.set_result(i as u64, true);
                leaf as DataSourceRef<u64>
            }) as Arc<dyn Supplier<u64>>
        })
        .collect()
}

/// Benchmark building a combinator whose children finish synchronously
fn bench_combinator_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("combinator_resolution");

    for child_count in [1, 4, 16].iter() {
        let first_available = FirstAvailableDataSourceSupplier::new(leaves(*child_count)).unwrap();
        group.bench_with_input(
            BenchmarkId::new("first_available", child_count),
            child_count,
            |b, _| {
                b.iter(|| {
                    let source = first_available.get();
                    black_box(source.result());
                    source.close();
                });
            },
        );

        let increasing_quality = IncreasingQualityDataSourceSupplier::builder()
            .suppliers(leaves(*child_count))
            .build()
            .unwrap();
        group.bench_with_input(
            BenchmarkId::new("increasing_quality", child_count),
            child_count,
            |b, _| {
                b.iter(|| {
                    let source = increasing_quality.get();
                    black_box(source.result());
                    source.close();
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_fan_out_varying_subscribers,
    bench_concurrent_set_result,
    bench_combinator_resolution,
);
criterion_main!(benches);
