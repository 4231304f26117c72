use chrono::{Days, NaiveDate};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use ferric_storage::basis::BasisFunctions;
use ferric_storage::engines::DEFAULT_BASIS;
use ferric_storage::prelude::*;
use std::hint::black_box;

// Storage valuation benchmarks
// Goals:
// - Intrinsic on a year of daily periods should stay well under a second at 100 grid points
// - LSMC cost should scale linearly in paths
// - Basis evaluation should not allocate

fn valuation_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date")
}

fn benchmark_storage(days: u64) -> CmdtyStorage {
    let today = valuation_date();
    let start = today.checked_add_days(Days::new(5)).expect("valid date");
    let end = start.checked_add_days(Days::new(days)).expect("valid date");
    CmdtyStorage::builder()
        .active_period(TimePeriod::day(start), TimePeriod::day(end))
        .constant_limits(0.0, 100_000.0, 130.0, 260.0)
        .unit_costs(0.01, 0.01)
        .build()
        .expect("benchmark storage should be valid")
}

fn benchmark_market(days: usize) -> StorageMarket {
    let prices: Vec<f64> = (0..days + 10)
        .map(|d| 20.0 + 3.0 * (d as f64 * std::f64::consts::TAU / 365.0).cos())
        .collect();
    StorageMarket::builder()
        .valuation_date(valuation_date())
        .forward_curve(TimeSeries::new(TimePeriod::day(valuation_date()), prices))
        .flat_rate(0.03)
        .build()
        .expect("benchmark market should be valid")
}

fn bench_intrinsic_grid(c: &mut Criterion) {
    let storage = benchmark_storage(365);
    let market = benchmark_market(365);
    let mut group = c.benchmark_group("intrinsic_grid_points");

    for points in [25usize, 50, 100].iter() {
        let engine = IntrinsicEngine::new(IntrinsicSettings::new(*points).expect("valid settings"));
        group.bench_with_input(BenchmarkId::from_parameter(points), points, |b, _| {
            b.iter(|| {
                let npv = engine
                    .value(black_box(&storage), black_box(&market), 0.0)
                    .expect("valuation should succeed")
                    .npv;
                black_box(npv)
            })
        });
    }

    group.finish();
}

fn bench_lsmc_paths(c: &mut Criterion) {
    let storage = benchmark_storage(60);
    let market = benchmark_market(60);
    let model = ThreeFactorSeasonal::new(45.0, 0.8, 0.15, 0.1);
    let mut group = c.benchmark_group("lsmc_paths");
    group.sample_size(10);

    for paths in [250usize, 500, 1_000].iter() {
        let settings = LsmcSettings::new(*paths, 50)
            .expect("valid settings")
            .with_seed(42);
        let engine = LsmcEngine::three_factor(model, settings).expect("valid engine");
        group.bench_with_input(BenchmarkId::from_parameter(paths), paths, |b, _| {
            b.iter(|| {
                let npv = engine
                    .value(black_box(&storage), black_box(&market), 0.0)
                    .expect("valuation should succeed")
                    .npv;
                black_box(npv)
            })
        });
    }

    group.finish();
}

fn bench_basis_evaluation(c: &mut Criterion) {
    let basis = BasisFunctions::parse(DEFAULT_BASIS, &["s", "x_st", "x_sw", "x_lt"])
        .expect("default basis should compile");
    let state = [21.5, 0.12, -0.03, 0.05];
    let mut out = vec![0.0; basis.len()];
    c.bench_function("basis_default_evaluate", |b| {
        b.iter(|| {
            basis.evaluate_into(black_box(&state), &mut out);
            black_box(out[basis.len() - 1])
        })
    });
}

criterion_group!(
    benches,
    bench_intrinsic_grid,
    bench_lsmc_paths,
    bench_basis_evaluation
);
criterion_main!(benches);
