use approx::assert_relative_eq;
use chrono::NaiveDate;
use ferric_storage::prelude::*;

fn day(d: u32) -> TimePeriod {
    TimePeriod::day(NaiveDate::from_ymd_opt(2024, 6, d).unwrap())
}

/// Rates and capacity are multiples of the grid spacing on every period.
fn storage() -> CmdtyStorage {
    CmdtyStorage::builder()
        .active_period(day(3), day(13))
        .constant_limits(0.0, 200.0, 100.0, 100.0)
        .unit_costs(0.02, 0.02)
        .build()
        .unwrap()
}

fn market() -> StorageMarket {
    let prices = vec![
        30.0, 30.0, 29.0, 28.5, 29.5, 31.0, 32.0, 31.5, 30.0, 29.0, 30.5, 32.5, 33.0,
    ];
    StorageMarket::builder()
        .valuation_date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
        .forward_curve(TimeSeries::new(day(1), prices))
        .flat_rate(0.03)
        .build()
        .unwrap()
}

#[test]
fn tree_value_is_at_least_intrinsic() {
    let engine = TrinomialEngine::new(
        OneFactorMeanReverting::new(12.0, 0.7),
        TrinomialSettings::new(11).unwrap().with_seed(2),
    )
    .unwrap();
    let result = engine.value(&storage(), &market(), 0.0).unwrap();
    let intrinsic = IntrinsicEngine::new(IntrinsicSettings::new(11).unwrap())
        .value(&storage(), &market(), 0.0)
        .unwrap();
    assert_relative_eq!(result.intrinsic_npv, intrinsic.npv, max_relative = 1e-12);
    assert!(result.npv >= intrinsic.npv - 1e-9 * intrinsic.npv.abs());
    assert!(result.extrinsic_npv > 0.0);
    assert!(result.diagnostics.get("tree_width").unwrap() >= 3.0);
}

#[test]
fn value_grows_with_volatility() {
    let value = |vol: f64| {
        TrinomialEngine::new(
            OneFactorMeanReverting::new(12.0, vol),
            TrinomialSettings::new(11).unwrap().with_seed(2),
        )
        .unwrap()
        .value(&storage(), &market(), 0.0)
        .unwrap()
        .npv
    };
    let low = value(0.2);
    let high = value(0.8);
    assert!(high > low);
}

#[test]
fn sampled_profiles_stay_feasible() {
    let engine = TrinomialEngine::new(
        OneFactorMeanReverting::new(8.0, 0.6),
        TrinomialSettings::new(11)
            .unwrap()
            .with_seed(11)
            .with_profile_paths(400)
            .unwrap(),
    )
    .unwrap();
    let result = engine.value(&storage(), &market(), 0.0).unwrap();
    assert_eq!(result.diagnostics.get("num_paths"), Some(400.0));
    assert_eq!(result.decision_profile.len(), 10);
    for inventory in result.inventory_profile.values() {
        assert!(*inventory >= -1e-9 && *inventory <= 200.0 + 1e-9);
    }
    let again = engine.value(&storage(), &market(), 0.0).unwrap();
    assert_eq!(result, again);
}
