use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Duration, TimeZone, Utc};
use invledger_auth::Principal;
use invledger_core::{AdminId, Clock, ManualClock, ProductId};
use invledger_events::NoopNotificationSink;
use invledger_infra::{CreateProduct, LedgerConfig, LedgerServices};
use std::sync::Arc;
use tokio::runtime::Runtime;

struct Fixture {
    services: LedgerServices,
    admin: Principal,
    product: ProductId,
    clock: Arc<ManualClock>,
}

fn fixture(rt: &Runtime, history: usize) -> Fixture {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
    let services = LedgerServices::in_memory(
        &LedgerConfig::default(),
        Arc::new(NoopNotificationSink),
        clock.clone(),
    );
    let admin = Principal::admin(AdminId::new());

    let product = rt.block_on(async {
        let category = services
            .catalog
            .register_category(&admin, "Bench")
            .await
            .unwrap();
        let id = services
            .catalog
            .create_product(
                &admin,
                CreateProduct {
                    name: "Widget".to_string(),
                    category_id: category.id,
                    initial_stock: 1_000_000,
                    threshold: Some(0),
                },
            )
            .await
            .unwrap()
            .product
            .id_typed();
        for i in 0..history {
            clock.advance(Duration::minutes(10));
            let delta = if i % 2 == 0 { 3 } else { -2 };
            services.mutator.apply_delta(&admin, id, delta, None).await.unwrap();
        }
        id
    });

    Fixture {
        services,
        admin,
        product,
        clock,
    }
}

fn bench_mutation_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("mutation_latency");

    group.bench_function("apply_delta_with_history", |b| {
        let f = fixture(&rt, 100);
        b.iter(|| {
            rt.block_on(f.services.mutator.apply_delta(&f.admin, f.product, black_box(1), None))
                .unwrap();
        });
    });

    group.finish();
}

fn bench_replay_throughput(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("replay_throughput");

    for history in [10usize, 100, 1_000, 10_000] {
        let f = fixture(&rt, history);
        let now = f.clock.now();
        group.throughput(Throughput::Elements(history as u64 + 1));

        group.bench_with_input(BenchmarkId::new("stock_at_date", history), &history, |b, _| {
            b.iter(|| {
                black_box(
                    rt.block_on(f.services.reconstructor.stock_at_date(f.product, now))
                        .unwrap(),
                )
            });
        });

        group.bench_with_input(BenchmarkId::new("verify_replay", history), &history, |b, _| {
            b.iter(|| black_box(rt.block_on(f.services.reconstructor.verify_replay(f.product)).unwrap()));
        });
    }

    group.finish();
}

fn bench_snapshot_shortcut(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("snapshot_shortcut");

    for history in [1_000usize, 10_000] {
        let f = fixture(&rt, history);
        rt.block_on(f.services.reconstructor.take_snapshot(f.product)).unwrap();
        let now = f.clock.now();

        group.bench_with_input(BenchmarkId::new("stock_at_date", history), &history, |b, _| {
            b.iter(|| {
                black_box(
                    rt.block_on(f.services.reconstructor.stock_at_date(f.product, now))
                        .unwrap(),
                )
            });
        });
    }

    group.finish();
}

fn bench_average_stock(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let f = fixture(&rt, 5_000);
    let to = f.clock.now();

    let mut group = c.benchmark_group("average_stock");
    for days in [1i64, 7, 30] {
        let from = to - Duration::days(days - 1);
        group.bench_with_input(BenchmarkId::new("window_days", days), &days, |b, _| {
            b.iter(|| black_box(rt.block_on(f.services.reconstructor.average_stock(f.product, from, to)).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_mutation_latency,
    bench_replay_throughput,
    bench_snapshot_shortcut,
    bench_average_stock
);
criterion_main!(benches);
