use chrono::NaiveDate;
use ferric_storage::prelude::*;
use serde::Serialize;
use serde::de::DeserializeOwned;

fn roundtrip<T>(value: &T) -> T
where
    T: Serialize + DeserializeOwned,
{
    let json = serde_json::to_string(value).unwrap();
    serde_json::from_str(&json).unwrap()
}

fn day(d: u32) -> TimePeriod {
    TimePeriod::day(NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
}

#[test]
fn settings_roundtrip() {
    let intrinsic = IntrinsicSettings::new(40).unwrap().with_tolerance(1e-8).unwrap();
    assert_eq!(roundtrip(&intrinsic), intrinsic);

    let lsmc = LsmcSettings::new(500, 60)
        .unwrap()
        .with_seed(12)
        .with_basis("1 + s + x_st**2");
    assert_eq!(roundtrip(&lsmc), lsmc);

    let tree = TrinomialSettings::new(30).unwrap().with_seed(3);
    assert_eq!(roundtrip(&tree), tree);
}

#[test]
fn models_roundtrip_and_revalidate() {
    let three = ThreeFactorSeasonal::new(45.0, 0.8, 0.2, 0.1);
    assert_eq!(roundtrip(&three), three);

    let model = MultiFactorModel::new(
        vec![
            Factor::new("a", 2.0, FactorVol::Constant(0.5)),
            Factor::new("b", 0.0, FactorVol::Curve(TimeSeries::new(day(1), vec![0.2; 5]))),
        ],
        vec![vec![1.0, -0.4], vec![-0.4, 1.0]],
    )
    .unwrap();
    assert_eq!(roundtrip(&model), model);

    let mut value = serde_json::to_value(&model).unwrap();
    value["correlation"][0][1] = serde_json::json!(0.9);
    assert!(serde_json::from_value::<MultiFactorModel>(value).is_err());
}

#[test]
fn time_types_and_ratchets_roundtrip() {
    let series = TimeSeries::new(TimePeriod::month(2024, 3).unwrap(), vec![1.5, 2.5, 3.5]);
    assert_eq!(roundtrip(&series), series);

    let ratchet = Ratchet::new(
        day(1),
        vec![
            InventoryRatePoint::new(0.0, -150.0, 255.2),
            InventoryRatePoint::new(2000.0, -200.0, 175.0),
        ],
    );
    assert_eq!(roundtrip(&ratchet), ratchet);
}

#[test]
fn intrinsic_result_roundtrips() {
    let storage = CmdtyStorage::builder()
        .active_period(day(2), day(6))
        .constant_limits(0.0, 100.0, 20.0, 10.0)
        .build()
        .unwrap();
    let market = StorageMarket::builder()
        .valuation_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        .forward_curve(TimeSeries::new(day(1), vec![5.0, 5.0, 5.0, 9.0, 8.0, 8.0]))
        .build()
        .unwrap();
    let result = IntrinsicEngine::new(IntrinsicSettings::new(11).unwrap())
        .value_intrinsic(&storage, &market, 0.0)
        .unwrap();
    assert_eq!(roundtrip(&result), result);
}
