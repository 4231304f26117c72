//! Piecewise-linear interpolation over sorted abscissas.
//!
//! Used for inventory-dependent ratchet rates, pillar interest-rate curves and the
//! inventory-grid value functions of the valuation engines.

/// Errors returned by interpolators.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterpolationError {
    #[error("invalid interpolation input: {0}")]
    InvalidInput(&'static str),
    #[error("interpolation query {0} is not finite")]
    NonFiniteQuery(f64),
}

pub(crate) fn validate_xy(x: &[f64], y: &[f64], min_len: usize) -> Result<(), InterpolationError> {
    if x.len() != y.len() {
        return Err(InterpolationError::InvalidInput(
            "x and y must have same length",
        ));
    }
    if x.len() < min_len {
        return Err(InterpolationError::InvalidInput(
            "not enough interpolation nodes",
        ));
    }
    if x.windows(2).any(|w| w[1] <= w[0]) {
        return Err(InterpolationError::InvalidInput(
            "x must be strictly increasing",
        ));
    }
    if x.iter().any(|v| !v.is_finite()) || y.iter().any(|v| !v.is_finite()) {
        return Err(InterpolationError::InvalidInput("x and y must be finite"));
    }
    Ok(())
}

#[inline]
pub(crate) fn linear_weights(x0: f64, x1: f64, xq: f64) -> (f64, f64) {
    let w = if (x1 - x0).abs() <= f64::EPSILON {
        0.0
    } else {
        (xq - x0) / (x1 - x0)
    };
    (1.0 - w, w)
}

/// Linear interpolation with flat extrapolation.
///
/// `x` must be sorted ascending and non-empty. A single node yields a constant. Queries that
/// hit a node return its ordinate exactly.
#[inline]
pub fn interpolate_clamped(x: &[f64], y: &[f64], xq: f64) -> f64 {
    let n = x.len();
    if n == 1 || xq <= x[0] {
        return y[0];
    }
    if xq >= x[n - 1] {
        return y[n - 1];
    }
    let i = x.partition_point(|v| *v <= xq) - 1;
    if xq == x[i] || y[i] == y[i + 1] {
        return y[i];
    }
    let (w0, w1) = linear_weights(x[i], x[i + 1], xq);
    w0 * y[i] + w1 * y[i + 1]
}

/// Piecewise-linear interpolation in `y` with flat extrapolation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LinearInterpolator {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl LinearInterpolator {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self, InterpolationError> {
        validate_xy(&x, &y, 2)?;
        Ok(Self { x, y })
    }

    /// `y(xq)`, held at the end values outside the node range.
    pub fn value(&self, xq: f64) -> Result<f64, InterpolationError> {
        if !xq.is_finite() {
            return Err(InterpolationError::NonFiniteQuery(xq));
        }
        Ok(interpolate_clamped(&self.x, &self.y, xq))
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }
}
