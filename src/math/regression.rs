//! Ordinary least squares with several right-hand sides.
//!
//! Columns are rescaled to unit root-mean-square before forming the normal equations, so the
//! rank check compares like with like even when cubic basis terms dwarf the intercept.
//! Identically zero columns are dropped and receive a zero coefficient.

use nalgebra::DMatrix;

/// Reasons a regression could not be solved.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegressionError {
    #[error("design has {rows} rows but targets have {target_rows}")]
    ShapeMismatch { rows: usize, target_rows: usize },
    #[error("design matrix is rank deficient (reciprocal condition {rcond:e})")]
    Singular { rcond: f64 },
    #[error("regression produced non-finite coefficients")]
    NonFinite,
}

/// Solves `min ||X B - Y||` for `B` (`basis × targets`).
///
/// `min_rcond` bounds the ratio of smallest to largest singular value of the scaled normal
/// matrix; below it the fit is rejected as singular.
pub fn least_squares(
    design: &DMatrix<f64>,
    targets: &DMatrix<f64>,
    min_rcond: f64,
) -> Result<DMatrix<f64>, RegressionError> {
    if design.nrows() != targets.nrows() {
        return Err(RegressionError::ShapeMismatch {
            rows: design.nrows(),
            target_rows: targets.nrows(),
        });
    }
    let n = design.nrows() as f64;
    let k = design.ncols();

    let scales: Vec<f64> = (0..k)
        .map(|j| (design.column(j).norm_squared() / n).sqrt())
        .collect();
    let active: Vec<usize> = (0..k).filter(|&j| scales[j] > 0.0).collect();
    let mut coefficients = DMatrix::zeros(k, targets.ncols());
    if active.is_empty() {
        return Ok(coefficients);
    }

    let mut scaled = DMatrix::zeros(design.nrows(), active.len());
    for (c, &j) in active.iter().enumerate() {
        scaled.set_column(c, &(design.column(j) / scales[j]));
    }

    let xt = scaled.transpose();
    let xtx = &xt * &scaled;
    let xty = &xt * targets;

    let singular_values = xtx.clone().svd(false, false).singular_values;
    let max_sv = singular_values.max();
    let min_sv = singular_values.min();
    let rcond = if max_sv > 0.0 { min_sv / max_sv } else { 0.0 };
    if !rcond.is_finite() || rcond < min_rcond {
        return Err(RegressionError::Singular { rcond });
    }

    let beta = xtx
        .cholesky()
        .ok_or(RegressionError::Singular { rcond })?
        .solve(&xty);
    if beta.iter().any(|b| !b.is_finite()) {
        return Err(RegressionError::NonFinite);
    }

    for (c, &j) in active.iter().enumerate() {
        coefficients.set_row(j, &(beta.row(c) / scales[j]));
    }
    Ok(coefficients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn recovers_exact_polynomial() {
        let xs: Vec<f64> = (0..20).map(|i| i as f64 * 0.5 - 3.0).collect();
        let design = DMatrix::from_fn(xs.len(), 3, |r, c| xs[r].powi(c as i32));
        let targets = DMatrix::from_fn(xs.len(), 2, |r, c| {
            let x = xs[r];
            if c == 0 {
                1.0 + 2.0 * x - 0.5 * x * x
            } else {
                -4.0 + x
            }
        });
        let beta = least_squares(&design, &targets, 1e-14).unwrap();
        assert_relative_eq!(beta[(0, 0)], 1.0, epsilon = 1e-9);
        assert_relative_eq!(beta[(1, 0)], 2.0, epsilon = 1e-9);
        assert_relative_eq!(beta[(2, 0)], -0.5, epsilon = 1e-9);
        assert_relative_eq!(beta[(0, 1)], -4.0, epsilon = 1e-9);
        assert_relative_eq!(beta[(1, 1)], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn zero_columns_get_zero_coefficients() {
        let design = DMatrix::from_fn(10, 3, |r, c| match c {
            0 => 1.0,
            1 => 0.0,
            _ => r as f64,
        });
        let targets = DMatrix::from_fn(10, 1, |r, _| 3.0 + r as f64);
        let beta = least_squares(&design, &targets, 1e-14).unwrap();
        assert_eq!(beta[(1, 0)], 0.0);
        assert_relative_eq!(beta[(0, 0)], 3.0, epsilon = 1e-9);
        assert_relative_eq!(beta[(2, 0)], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn collinear_columns_are_singular() {
        let design = DMatrix::from_fn(10, 2, |r, c| if c == 0 { r as f64 } else { 2.0 * r as f64 });
        let targets = DMatrix::from_element(10, 1, 1.0);
        assert!(matches!(
            least_squares(&design, &targets, 1e-12),
            Err(RegressionError::Singular { .. })
        ));
    }
}
