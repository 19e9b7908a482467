use std::sync::Arc;

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use queuesync::{
    core::cache::{Fetch, ResourceCache},
    entry::QueueEntry,
    remote::TransportResult,
    stats::{GameRecord, aggregate},
    types::{EntryId, Resource},
};

struct Fixed(Vec<QueueEntry>);

#[async_trait]
impl Fetch<QueueEntry> for Fixed {
    async fn fetch(&self) -> TransportResult<Vec<QueueEntry>> {
        Ok(self.0.clone())
    }
}

fn record(i: u64) -> GameRecord {
    let (home, away) = if i % 2 == 0 { ("white", "black") } else { ("black", "white") };
    let result = if i % 3 == 0 { "win" } else { "resigned" };
    GameRecord::new(json!({
        home: {"username": "gandalf868", "result": result, "rating": 2000},
        away: {"username": format!("c{i}"), "rating": 1000 + i % 1500},
        "accuracies": {home: 80.0, away: 70.0}
    }))
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    for n in [100u64, 1_000, 10_000] {
        let records: Vec<GameRecord> = (0..n).map(record).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &records, |b, records| {
            b.iter(|| aggregate(records, "gandalf868"));
        });
    }
    group.finish();
}

fn bench_optimistic_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");

    let mut group = c.benchmark_group("apply_rollback");
    for n in [100u64, 1_000, 10_000] {
        let entries: Vec<QueueEntry> = (0..n)
            .map(|i| QueueEntry::waiting(i, format!("chat{i}"), format!("knight{i}")))
            .collect();
        let cache = ResourceCache::new(Resource::Queue, Arc::new(Fixed(entries)));
        rt.block_on(cache.get()).expect("fetch");

        let target = EntryId::from(n / 2);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let mut token = cache
                    .apply_optimistic(|v| v.into_iter().filter(|e| e.id != target).collect());
                cache.rollback(&mut token);
                rt.block_on(cache.commit(token)).expect("commit");
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_aggregate, bench_optimistic_cycle);
criterion_main!(benches);
