//! Performance benchmarks for aggregation and fan-out

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use matchboard::aggregator::force_serialize;
use matchboard::broadcast::Broadcaster;
use matchboard::types::{ClientStatus, Snapshot};
use matchboard::FieldAggregator;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn bench_runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

fn expected_document(producers: usize) -> String {
    let fields: BTreeMap<String, usize> = (0..producers)
        .map(|i| (format!("field_{:04}", i), i))
        .collect();
    serde_json::to_string(&fields).unwrap()
}

/// Wait until the aggregator emits `expected`
async fn wait_for(snapshots: &mut mpsc::UnboundedReceiver<String>, expected: &str) {
    while let Some(snapshot) = snapshots.recv().await {
        if snapshot == expected {
            return;
        }
    }
    panic!("aggregator stopped before emitting the expected document");
}

fn bench_serialization(c: &mut Criterion) {
    let mut clients = BTreeMap::new();
    for i in 0..50 {
        clients.insert(
            format!("fakeplayer_{}", i),
            ClientStatus::new("Searching for a match", i),
        );
    }

    c.bench_function("force_serialize_50_clients", |b| {
        b.iter(|| force_serialize(black_box(&clients)))
    });
}

fn bench_sequential_updates(c: &mut Criterion) {
    let rt = bench_runtime();
    let mut group = c.benchmark_group("sequential_updates");

    for updates in [10u32, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(updates), &updates, |b, &updates| {
            b.to_async(&rt).iter(|| async move {
                let cancel = CancellationToken::new();
                let (tx, mut rx) = mpsc::unbounded_channel();
                let aggregator = FieldAggregator::new(cancel.clone(), tx);

                let field = aggregator.for_field("n");
                for n in 1..=updates {
                    field.set(&n).await;
                }

                wait_for(&mut rx, &format!("{{\"n\":{}}}", updates)).await;
                cancel.cancel();
            })
        });
    }

    group.finish();
}

fn bench_concurrent_producers(c: &mut Criterion) {
    let rt = bench_runtime();
    let mut group = c.benchmark_group("concurrent_producers");
    group.measurement_time(Duration::from_secs(10));

    for producers in [10usize, 100, 500] {
        let expected = expected_document(producers);

        group.bench_with_input(
            BenchmarkId::from_parameter(producers),
            &producers,
            |b, &producers| {
                let expected = expected.clone();
                b.to_async(&rt).iter(|| {
                    let expected = expected.clone();
                    async move {
                        let cancel = CancellationToken::new();
                        let (tx, mut rx) = mpsc::unbounded_channel();
                        let aggregator = FieldAggregator::new(cancel.clone(), tx);

                        let mut tasks = Vec::with_capacity(producers);
                        for i in 0..producers {
                            let field = aggregator.for_field(format!("field_{:04}", i));
                            tasks.push(tokio::spawn(async move { field.set(&i).await }));
                        }
                        for task in tasks {
                            task.await.unwrap();
                        }

                        wait_for(&mut rx, &expected).await;
                        cancel.cancel();
                    }
                })
            },
        );
    }

    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let rt = bench_runtime();
    let mut group = c.benchmark_group("fan_out");

    for subscribers in [1usize, 10, 100] {
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, &subscribers| {
                b.to_async(&rt).iter(|| async move {
                    let (publisher, broadcaster) =
                        Broadcaster::<Snapshot>::new(Duration::from_millis(100));
                    let cancel = CancellationToken::new();

                    let mut streams = Vec::with_capacity(subscribers);
                    for _ in 0..subscribers {
                        streams.push(broadcaster.watch(cancel.clone()).await);
                    }

                    for n in 0..100 {
                        publisher
                            .publish_latest(Snapshot::from(n.to_string()))
                            .await
                            .unwrap();
                    }

                    // Every subscriber ends up on the last value
                    for mut stream in streams {
                        while let Some(value) = stream.recv().await {
                            if value.as_deref() == Some("99") {
                                break;
                            }
                        }
                    }
                    cancel.cancel();
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_serialization,
    bench_sequential_updates,
    bench_concurrent_producers,
    bench_fan_out
);
criterion_main!(benches);
