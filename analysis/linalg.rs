//! Small dense linear algebra helpers shared by the VIF auxiliary regressions and
//! the regression models.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::LeastSquaresSvd;
use ndarray_linalg::error::LinalgError;

/// A design matrix and response with their column means removed.
pub struct CenteredDesign {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub x_means: Array1<f64>,
    pub y_mean: f64,
}

/// Subtracts the column means of `x` and the mean of `y`.
///
/// Centering lets callers fit an unpenalized intercept separately:
/// `intercept = y_mean - x_means · beta`.
pub fn center(x: ArrayView2<f64>, y: ArrayView1<f64>) -> CenteredDesign {
    let n = x.nrows().max(1) as f64;
    let x_means = x.sum_axis(Axis(0)) / n;
    let y_mean = y.sum() / n;
    CenteredDesign {
        x: &x - &x_means,
        y: y.mapv(|v| v - y_mean),
        x_means,
        y_mean,
    }
}

/// The minimum-norm least-squares solution of `x · beta = y`, with the numerical
/// rank of `x` as reported by the SVD.
pub struct LeastSquaresFit {
    pub beta: Array1<f64>,
    pub rank: usize,
}

pub fn least_squares(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<LeastSquaresFit, LinalgError> {
    if x.ncols() == 0 {
        return Ok(LeastSquaresFit {
            beta: Array1::zeros(0),
            rank: 0,
        });
    }
    let result = x.least_squares(&y)?;
    Ok(LeastSquaresFit {
        beta: result.solution,
        rank: usize::try_from(result.rank).unwrap_or(0),
    })
}

/// Sum of squared entries.
pub fn sum_of_squares(v: ArrayView1<f64>) -> f64 {
    v.dot(&v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_center_removes_means() {
        let x = array![[1.0, 10.0], [3.0, 20.0], [5.0, 30.0]];
        let y = array![2.0, 4.0, 9.0];
        let design = center(x.view(), y.view());
        assert_abs_diff_eq!(design.x_means[0], 3.0);
        assert_abs_diff_eq!(design.x_means[1], 20.0);
        assert_abs_diff_eq!(design.y_mean, 5.0);
        assert_abs_diff_eq!(design.x.sum_axis(Axis(0))[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(design.y.sum(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_least_squares_exact_system() {
        let x = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let y = array![2.0, -1.0, 1.0];
        let fit = least_squares(x.view(), y.view()).unwrap();
        assert_eq!(fit.rank, 2);
        assert_abs_diff_eq!(fit.beta[0], 2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(fit.beta[1], -1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_least_squares_rank_deficient_is_minimum_norm() {
        // Second column duplicates the first, so the weight is split evenly.
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        let y = array![2.0, 4.0, 6.0];
        let fit = least_squares(x.view(), y.view()).unwrap();
        assert_eq!(fit.rank, 1);
        assert_abs_diff_eq!(fit.beta[0], 1.0, epsilon = 1e-8);
        assert_abs_diff_eq!(fit.beta[1], 1.0, epsilon = 1e-8);
    }
}
