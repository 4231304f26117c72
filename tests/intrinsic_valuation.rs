use approx::assert_relative_eq;
use chrono::{Days, NaiveDate};
use ferric_storage::prelude::*;

fn day(date: NaiveDate) -> TimePeriod {
    TimePeriod::day(date)
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn year_long_storage_on_flat_curve_is_worth_at_least_nothing() {
    let today = ymd(2024, 3, 1);
    let start = today.checked_add_days(Days::new(5)).unwrap();
    let end = today.checked_add_days(Days::new(380)).unwrap();
    let storage = CmdtyStorage::builder()
        .active_period(day(start), day(end))
        .constant_limits(0.0, 100_000.0, 130.0, 260.0)
        .unit_costs(1.1, 1.3)
        .build()
        .unwrap();
    let market = StorageMarket::builder()
        .valuation_date(today)
        .forward_curve(TimeSeries::new(day(today), vec![20.0; 381]))
        .flat_rate(0.025)
        .build()
        .unwrap();

    let result = IntrinsicEngine::new(IntrinsicSettings::new(50).unwrap())
        .value(&storage, &market, 0.0)
        .unwrap();
    assert!(result.npv >= 0.0);
    assert_eq!(result.decision_profile.start(), day(start));
    assert_eq!(result.decision_profile.len(), 375);
    assert!(result.decision_profile.values().iter().all(|v| *v == 0.0));
}

#[test]
fn seasonal_spread_is_captured_with_ratchets() {
    let start = ymd(2019, 8, 28);
    let storage = CmdtyStorage::builder()
        .active_period(day(start), day(ymd(2019, 9, 25)))
        .ratchets(vec![Ratchet::new(
            day(start),
            vec![
                InventoryRatePoint::new(0.0, -150.0, 255.2),
                InventoryRatePoint::new(2000.0, -200.0, 175.0),
            ],
        )])
        .unit_costs(0.01, 0.01)
        .build()
        .unwrap();
    let prices: Vec<f64> = (0..29).map(|d| if d < 14 { 2.0 } else { 4.0 }).collect();
    let market = StorageMarket::builder()
        .valuation_date(ymd(2019, 8, 27))
        .forward_curve(TimeSeries::new(day(start), prices))
        .build()
        .unwrap();

    let result = IntrinsicEngine::new(IntrinsicSettings::new(41).unwrap())
        .value_intrinsic(&storage, &market, 0.0)
        .unwrap();
    assert!(result.npv > 0.0);
    let profile = result.profile.values();
    let last = profile.last().unwrap();
    assert_eq!(last.closing_inventory, 0.0);
    assert!(profile.iter().all(|p| p.inventory >= -1e-9 && p.inventory <= 2000.0 + 1e-9));
    let injected: f64 = profile.iter().map(|p| p.inject_withdraw_volume.max(0.0)).sum();
    assert!(injected > 0.0);
    for (period, p) in result.profile.iter() {
        let range = storage.inject_withdraw_range(period, p.inventory);
        assert!(p.inject_withdraw_volume >= range.min_rate - 1e-9);
        assert!(p.inject_withdraw_volume <= range.max_rate + 1e-9);
    }
}

#[test]
fn intrinsic_value_equals_replay_of_its_own_decisions() {
    let storage = CmdtyStorage::builder()
        .active_period(day(ymd(2024, 1, 2)), day(ymd(2024, 1, 12)))
        .constant_limits(0.0, 200.0, 100.0, 100.0)
        .unit_costs(0.1, 0.05)
        .build()
        .unwrap();
    let prices = vec![10.0, 9.0, 8.5, 8.0, 9.0, 10.5, 12.0, 11.0, 10.0, 12.5, 11.5, 11.0];
    let market = StorageMarket::builder()
        .valuation_date(ymd(2024, 1, 1))
        .forward_curve(TimeSeries::new(day(ymd(2024, 1, 1)), prices.clone()))
        .flat_rate(0.04)
        .build()
        .unwrap();

    let result = IntrinsicEngine::new(IntrinsicSettings::new(11).unwrap())
        .value_intrinsic(&storage, &market, 0.0)
        .unwrap();
    let discounter = market.discounter();
    let mut replayed = 0.0;
    for (period, p) in result.profile.iter() {
        let price = *market.forward_curve().get(period).unwrap();
        let cost = if p.inject_withdraw_volume >= 0.0 { 0.1 } else { 0.05 };
        let cashflow = -p.inject_withdraw_volume * price - cost * p.inject_withdraw_volume.abs();
        let df = discounter.settlement_discount_factor(period).unwrap();
        replayed += cashflow * df;
        assert_relative_eq!(p.period_pv, cashflow * df, epsilon = 1e-9);
    }
    assert_relative_eq!(replayed, result.npv, epsilon = 1e-8);
    assert!(result.npv > 0.0);
}

/// Rates of 260/130 against grid spacings of roughly 1000, so the schedule leaves the grid.
#[test]
fn off_grid_schedule_is_valued_by_its_own_cashflows() {
    let today = ymd(2024, 3, 1);
    let start = today.checked_add_days(Days::new(5)).unwrap();
    let end = today.checked_add_days(Days::new(380)).unwrap();
    let storage = CmdtyStorage::builder()
        .active_period(day(start), day(end))
        .constant_limits(0.0, 100_000.0, 130.0, 260.0)
        .unit_costs(1.1, 1.3)
        .build()
        .unwrap();
    let prices: Vec<f64> = (0..381)
        .map(|d| 20.0 + 6.0 * (d as f64 * std::f64::consts::TAU / 365.0).cos())
        .collect();
    let market = StorageMarket::builder()
        .valuation_date(today)
        .forward_curve(TimeSeries::new(day(today), prices))
        .flat_rate(0.025)
        .build()
        .unwrap();

    let result = IntrinsicEngine::new(IntrinsicSettings::new(100).unwrap())
        .value_intrinsic(&storage, &market, 1456.0)
        .unwrap();
    let profile = result.profile.values();
    assert_eq!(profile.last().unwrap().closing_inventory, 0.0);

    let discounter = market.discounter();
    let mut replayed = result.terminal_pv;
    for (period, p) in result.profile.iter() {
        let price = *market.forward_curve().get(period).unwrap();
        let volume = p.inject_withdraw_volume;
        let cost = if volume >= 0.0 { 1.1 } else { 1.3 };
        let df = discounter.settlement_discount_factor(period).unwrap();
        replayed += (-volume * price - cost * volume.abs()) * df;
    }
    assert!(result.npv > 0.0);
    assert_relative_eq!(replayed, result.npv, max_relative = 1e-10);

    let engine_result = IntrinsicEngine::new(IntrinsicSettings::new(100).unwrap())
        .value(&storage, &market, 1456.0)
        .unwrap();
    assert_eq!(engine_result.npv, result.npv);
}

#[test]
fn deltas_match_bumped_forward_curve() {
    let storage = CmdtyStorage::builder()
        .active_period(day(ymd(2024, 1, 2)), day(ymd(2024, 1, 8)))
        .constant_limits(0.0, 100.0, 20.0, 10.0)
        .build()
        .unwrap();
    let prices = vec![5.0, 5.0, 4.0, 6.0, 9.0, 7.0, 8.0, 8.0];
    let market_with = |prices: Vec<f64>| {
        StorageMarket::builder()
            .valuation_date(ymd(2024, 1, 1))
            .forward_curve(TimeSeries::new(day(ymd(2024, 1, 1)), prices))
            .flat_rate(0.05)
            .build()
            .unwrap()
    };
    let engine = IntrinsicEngine::new(IntrinsicSettings::new(11).unwrap());
    let base = engine.value(&storage, &market_with(prices.clone()), 0.0).unwrap();

    let bump = 1e-4;
    for (i, delta) in base.deltas.values().iter().enumerate() {
        let mut bumped = prices.clone();
        bumped[i + 1] += bump;
        let up = engine.value(&storage, &market_with(bumped), 0.0).unwrap();
        assert_relative_eq!((up.npv - base.npv) / bump, *delta, epsilon = 1e-6);
    }
}

#[test]
fn monthly_curve_for_daily_storage_is_rejected() {
    let storage = CmdtyStorage::builder()
        .active_period(day(ymd(2024, 1, 2)), day(ymd(2024, 1, 8)))
        .constant_limits(0.0, 100.0, 20.0, 10.0)
        .build()
        .unwrap();
    let market = StorageMarket::builder()
        .valuation_date(ymd(2024, 1, 1))
        .forward_curve(TimeSeries::new(TimePeriod::month(2024, 1).unwrap(), vec![5.0; 3]))
        .build()
        .unwrap();
    let err = IntrinsicEngine::default().value(&storage, &market, 0.0).unwrap_err();
    assert!(matches!(err, ValuationError::FrequencyMismatch { .. }));
}

#[test]
fn monthly_storage_values_seasonal_spread() {
    let jan = TimePeriod::month(2025, 1).unwrap();
    let storage = CmdtyStorage::builder()
        .active_period(TimePeriod::month(2024, 6).unwrap(), jan)
        .constant_limits(0.0, 300.0, 300.0, 100.0)
        .build()
        .unwrap();
    let curve = TimeSeries::new(
        TimePeriod::month(2024, 5).unwrap(),
        vec![30.0, 28.0, 29.0, 30.0, 32.0, 35.0, 40.0, 45.0, 44.0],
    );
    let market = StorageMarket::builder()
        .valuation_date(ymd(2024, 5, 15))
        .forward_curve(curve)
        .build()
        .unwrap();
    let result = IntrinsicEngine::new(IntrinsicSettings::new(31).unwrap())
        .value_intrinsic(&storage, &market, 0.0)
        .unwrap();
    // Buy 100 each in June, July and August, sell all 300 in December.
    assert_relative_eq!(result.npv, 300.0 * 45.0 - 100.0 * (28.0 + 29.0 + 30.0), epsilon = 1e-8);
    assert_eq!(result.profile.values().last().unwrap().closing_inventory, 0.0);
}
