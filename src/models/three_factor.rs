//! Named configurations of the multi-factor model.

use serde::{Deserialize, Serialize};

use crate::models::{Factor, FactorVol, ModelError, MultiFactorModel};

/// Spot mean-reverting factor, non-mean-reverting long-term factor and a seasonal factor whose
/// volatility follows the day of year. Factors are independent.
///
/// Regression bases see the factors as `x_st`, `x_sw` and `x_lt`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThreeFactorSeasonal {
    pub spot_mean_reversion: f64,
    pub spot_vol: f64,
    pub long_term_vol: f64,
    pub seasonal_vol: f64,
}

impl ThreeFactorSeasonal {
    pub fn new(spot_mean_reversion: f64, spot_vol: f64, long_term_vol: f64, seasonal_vol: f64) -> Self {
        Self {
            spot_mean_reversion,
            spot_vol,
            long_term_vol,
            seasonal_vol,
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if !self.spot_mean_reversion.is_finite() || self.spot_mean_reversion < 0.0 {
            return Err(ModelError::InvalidParameter(
                "spot mean reversion must be finite and >= 0".to_string(),
            ));
        }
        for (name, vol) in [
            ("spot vol", self.spot_vol),
            ("long-term vol", self.long_term_vol),
            ("seasonal vol", self.seasonal_vol),
        ] {
            if !vol.is_finite() || vol < 0.0 {
                return Err(ModelError::InvalidParameter(format!(
                    "{name} must be finite and >= 0"
                )));
            }
        }
        Ok(())
    }

    /// Equivalent general model, factors ordered `x_st`, `x_sw`, `x_lt`.
    pub fn to_multi_factor(&self) -> Result<MultiFactorModel, ModelError> {
        self.validate()?;
        MultiFactorModel::uncorrelated(vec![
            Factor::new(
                "x_st",
                self.spot_mean_reversion,
                FactorVol::Constant(self.spot_vol),
            ),
            Factor::new("x_sw", 0.0, FactorVol::Seasonal(self.seasonal_vol)),
            Factor::new("x_lt", 0.0, FactorVol::Constant(self.long_term_vol)),
        ])
    }
}

impl TryFrom<ThreeFactorSeasonal> for MultiFactorModel {
    type Error = ModelError;

    fn try_from(model: ThreeFactorSeasonal) -> Result<Self, Self::Error> {
        model.to_multi_factor()
    }
}

/// Single mean-reverting log-spot factor, exposed to bases as `x_st`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OneFactorMeanReverting {
    pub mean_reversion: f64,
    pub spot_vol: f64,
}

impl OneFactorMeanReverting {
    pub fn new(mean_reversion: f64, spot_vol: f64) -> Self {
        Self {
            mean_reversion,
            spot_vol,
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if !self.mean_reversion.is_finite() || self.mean_reversion < 0.0 {
            return Err(ModelError::InvalidParameter(
                "mean reversion must be finite and >= 0".to_string(),
            ));
        }
        if !self.spot_vol.is_finite() || self.spot_vol < 0.0 {
            return Err(ModelError::InvalidParameter(
                "spot vol must be finite and >= 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_multi_factor(&self) -> Result<MultiFactorModel, ModelError> {
        self.validate()?;
        MultiFactorModel::uncorrelated(vec![Factor::new(
            "x_st",
            self.mean_reversion,
            FactorVol::Constant(self.spot_vol),
        )])
    }
}
