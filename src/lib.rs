//! Ferric Storage values commodity storage facilities: gas caverns, oil tanks and any other
//! asset that buys a commodity in one period, holds it subject to capacity, rate and loss
//! constraints, and sells it in a later one.
//!
//! The crate combines a period-based storage model (ratchets, cost rules, terminal values), a
//! forward curve and discounting layer, and three valuation engines sharing one decision rule:
//! intrinsic backward induction, least-squares Monte Carlo (LSMC) over a seasonal multi-factor
//! spot model, and a one-factor trinomial tree.
//!
//! References used across modules include:
//! - Boogert and de Jong (2008), *Gas storage valuation using a Monte Carlo method*.
//! - Longstaff and Schwartz (2001) for regression-based continuation values.
//! - Hull and White (1994) for the trinomial tree construction.
//!
//! Numerical considerations:
//! - Values are computed on per-period inventory grids; accuracy improves with grid points and
//!   is exact when rates and bounds align with the grid spacing.
//! - LSMC results carry Monte Carlo noise; the standard error is reported in diagnostics.
//! - Regression bases are user-supplied expressions; a singular fit falls back once to `1 + s`.
//!
//! # Feature Flags
//! - `parallel`: enables Rayon-powered path simulation and per-period work. Results do not
//!   depend on this flag.
//!
//! # Quick Start
//! Value a small storage against a forward curve:
//! ```rust
//! use chrono::NaiveDate;
//! use ferric_storage::prelude::*;
//!
//! let day = |d| TimePeriod::day(NaiveDate::from_ymd_opt(2024, 1, d).unwrap());
//! let storage = CmdtyStorage::builder()
//!     .active_period(day(2), day(6))
//!     .constant_limits(0.0, 100.0, 20.0, 10.0)
//!     .build()
//!     .unwrap();
//! let market = StorageMarket::builder()
//!     .valuation_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
//!     .forward_curve(TimeSeries::new(day(1), vec![5.0, 5.0, 5.0, 9.0, 8.0, 8.0]))
//!     .build()
//!     .unwrap();
//!
//! let engine = IntrinsicEngine::new(IntrinsicSettings::new(11).unwrap());
//! let result = engine.value(&storage, &market, 0.0).unwrap();
//! assert!((result.npv - 80.0).abs() < 1.0e-9);
//! ```
//!
//! Add extrinsic value with the three-factor seasonal model:
//! ```rust
//! use chrono::NaiveDate;
//! use ferric_storage::prelude::*;
//!
//! let day = |d| TimePeriod::day(NaiveDate::from_ymd_opt(2024, 1, d).unwrap());
//! let storage = CmdtyStorage::builder()
//!     .active_period(day(2), day(8))
//!     .constant_limits(0.0, 100.0, 20.0, 10.0)
//!     .build()
//!     .unwrap();
//! let market = StorageMarket::builder()
//!     .valuation_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
//!     .forward_curve(TimeSeries::new(day(1), vec![10.0; 8]))
//!     .flat_rate(0.02)
//!     .build()
//!     .unwrap();
//!
//! let settings = LsmcSettings::new(200, 21).unwrap().with_seed(7);
//! let model = ThreeFactorSeasonal::new(20.0, 0.8, 0.1, 0.0);
//! let engine = LsmcEngine::three_factor(model, settings).unwrap();
//! let result = engine.value(&storage, &market, 0.0).unwrap();
//! assert!(result.npv >= result.intrinsic_npv);
//! ```

pub mod basis;
pub mod core;
pub mod engines;
pub mod market;
pub mod math;
pub mod models;
pub mod rates;
pub mod storage;
pub mod time;

/// Common imports for ergonomic usage.
pub mod prelude {
    pub use crate::core::*;
    pub use crate::engines::{
        IntrinsicEngine, IntrinsicSettings, IntrinsicValuationResult, LsmcEngine, LsmcSettings,
        StorageProfile, TrinomialEngine, TrinomialSettings,
    };
    pub use crate::market::*;
    pub use crate::models::{
        Factor, FactorVol, ModelError, MultiFactorModel, OneFactorMeanReverting,
        ThreeFactorSeasonal,
    };
    pub use crate::rates::{CashflowDiscounter, InterestRates, SettlementRule};
    pub use crate::storage::*;
    pub use crate::time::{Granularity, TimePeriod, TimeSeries};
}
