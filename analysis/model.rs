//! # Regression Models
//!
//! Ordinary least squares and ridge regression behind one [`Regressor`] trait.
//! Both fit an unpenalized intercept: the design and the response are centered,
//! the slope vector is solved on the centered data, and the intercept is
//! recovered as `mean(y) - mean(x) · beta`.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use ndarray_linalg::Solve;
use ndarray_linalg::error::LinalgError;
use serde::Serialize;
use thiserror::Error;

use crate::error::ErrorKind;
use crate::linalg::{center, least_squares};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Cannot fit a model to a design with no rows.")]
    EmptyDesign,

    #[error("The design has {x_rows} rows but the response has {y_len} values.")]
    LengthMismatch { x_rows: usize, y_len: usize },

    #[error("The model was fitted on {expected} features but received {found}.")]
    FeatureCountMismatch { expected: usize, found: usize },

    #[error("The ridge penalty must be a finite, non-negative number, got {0}.")]
    InvalidAlpha(f64),

    #[error(
        "The penalized normal equations could not be solved. The design is likely degenerate: {0}"
    )]
    LinearSystemSolveFailed(#[source] LinalgError),

    #[error("The least-squares solver failed: {0}")]
    LeastSquaresFailed(#[source] LinalgError),
}

impl ModelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::InvalidAlpha(_) => ErrorKind::Configuration,
            ModelError::FeatureCountMismatch { .. } | ModelError::LengthMismatch { .. } => {
                ErrorKind::Schema
            }
            ModelError::EmptyDesign
            | ModelError::LinearSystemSolveFailed(_)
            | ModelError::LeastSquaresFailed(_) => ErrorKind::DegenerateData,
        }
    }
}

/// A linear model fitted to training data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FittedModel {
    pub name: String,
    pub intercept: f64,
    pub coefficients: Array1<f64>,
    /// Ridge penalty; 0.0 for ordinary least squares.
    pub alpha: f64,
    /// Numerical rank of the centered design, when the SVD solver was used.
    pub design_rank: Option<usize>,
}

impl FittedModel {
    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        if x.ncols() != self.coefficients.len() {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.coefficients.len(),
                found: x.ncols(),
            });
        }
        Ok(x.dot(&self.coefficients) + self.intercept)
    }

    /// Euclidean norm of the slope vector; the intercept is not included.
    pub fn coefficient_norm(&self) -> f64 {
        self.coefficients.dot(&self.coefficients).sqrt()
    }
}

/// A regression strategy that can be fitted to a design and a response.
pub trait Regressor: Send + Sync {
    fn name(&self) -> &str;

    fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<FittedModel, ModelError>;
}

fn check_design(x: &ArrayView2<f64>, y: &ArrayView1<f64>) -> Result<(), ModelError> {
    if x.nrows() == 0 {
        return Err(ModelError::EmptyDesign);
    }
    if x.nrows() != y.len() {
        return Err(ModelError::LengthMismatch {
            x_rows: x.nrows(),
            y_len: y.len(),
        });
    }
    Ok(())
}

/// Minimum-norm least squares on the centered design.
fn fit_least_squares(
    name: &str,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
) -> Result<FittedModel, ModelError> {
    let design = center(x, y);
    let fit = least_squares(design.x.view(), design.y.view())
        .map_err(ModelError::LeastSquaresFailed)?;

    if fit.rank < x.ncols() {
        log::warn!(
            "{name}: the design has rank {} but {} features; using the minimum-norm solution.",
            fit.rank,
            x.ncols()
        );
    }

    let intercept = design.y_mean - design.x_means.dot(&fit.beta);
    Ok(FittedModel {
        name: name.to_string(),
        intercept,
        coefficients: fit.beta,
        alpha: 0.0,
        design_rank: Some(fit.rank),
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrdinaryLeastSquares;

impl Regressor for OrdinaryLeastSquares {
    fn name(&self) -> &str {
        "Linear Regression"
    }

    fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<FittedModel, ModelError> {
        check_design(&x, &y)?;
        let model = fit_least_squares(self.name(), x, y)?;
        log::debug!(
            "{}: intercept {:.6}, |beta| {:.6}",
            model.name,
            model.intercept,
            model.coefficient_norm()
        );
        Ok(model)
    }
}

/// L2-penalized least squares with penalty `alpha` on the slopes only.
#[derive(Debug, Clone, Copy)]
pub struct RidgeRegression {
    alpha: f64,
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Result<Self, ModelError> {
        if !alpha.is_finite() || alpha < 0.0 {
            return Err(ModelError::InvalidAlpha(alpha));
        }
        Ok(Self { alpha })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl Regressor for RidgeRegression {
    fn name(&self) -> &str {
        "Ridge Regression"
    }

    fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<FittedModel, ModelError> {
        check_design(&x, &y)?;
        if self.alpha == 0.0 {
            return fit_least_squares(self.name(), x, y);
        }

        let design = center(x, y);
        let p = x.ncols();
        let mut gram = design.x.t().dot(&design.x);
        gram += &(Array2::<f64>::eye(p) * self.alpha);
        let rhs = design.x.t().dot(&design.y);

        let beta = if p == 0 {
            Array1::zeros(0)
        } else {
            gram.solve(&rhs).map_err(ModelError::LinearSystemSolveFailed)?
        };
        let intercept = design.y_mean - design.x_means.dot(&beta);
        log::debug!(
            "{} (alpha {}): intercept {:.6}, |beta| {:.6}",
            self.name(),
            self.alpha,
            intercept,
            beta.dot(&beta).sqrt()
        );

        Ok(FittedModel {
            name: self.name().to_string(),
            intercept,
            coefficients: beta,
            alpha: self.alpha,
            design_rank: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array, array};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn noisy_linear(n: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let noise = Normal::new(0.0, 0.1).unwrap();
        let x = Array::from_shape_fn((n, 3), |_| normal.sample(&mut rng));
        let y = x.dot(&array![2.0, -1.0, 0.5]) + 4.0 + Array::from_shape_fn(n, |_| noise.sample(&mut rng));
        (x, y)
    }

    #[test]
    fn test_ols_recovers_exact_coefficients() {
        let x = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [2.0, 1.0], [3.0, 5.0]];
        let y = x.dot(&array![3.0, -2.0]) + 1.5;
        let model = OrdinaryLeastSquares.fit(x.view(), y.view()).unwrap();

        assert_abs_diff_eq!(model.intercept, 1.5, epsilon = 1e-10);
        assert_abs_diff_eq!(model.coefficients[0], 3.0, epsilon = 1e-10);
        assert_abs_diff_eq!(model.coefficients[1], -2.0, epsilon = 1e-10);
        assert_eq!(model.design_rank, Some(2));
        assert_eq!(model.alpha, 0.0);

        let predictions = model.predict(x.view()).unwrap();
        for (p, t) in predictions.iter().zip(y.iter()) {
            assert_abs_diff_eq!(*p, *t, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_ridge_with_zero_alpha_matches_ols() {
        let (x, y) = noisy_linear(60, 1);
        let ols = OrdinaryLeastSquares.fit(x.view(), y.view()).unwrap();
        let ridge = RidgeRegression::new(0.0).unwrap().fit(x.view(), y.view()).unwrap();

        assert_abs_diff_eq!(ols.intercept, ridge.intercept, epsilon = 1e-10);
        for (a, b) in ols.coefficients.iter().zip(ridge.coefficients.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_ridge_shrinks_coefficients_monotonically() {
        let (x, y) = noisy_linear(80, 2);
        let mut previous = OrdinaryLeastSquares
            .fit(x.view(), y.view())
            .unwrap()
            .coefficient_norm();
        for alpha in [0.1, 1.0, 10.0, 100.0, 1000.0] {
            let norm = RidgeRegression::new(alpha)
                .unwrap()
                .fit(x.view(), y.view())
                .unwrap()
                .coefficient_norm();
            assert!(norm <= previous + 1e-12, "norm grew at alpha {alpha}");
            previous = norm;
        }
    }

    #[test]
    fn test_huge_alpha_leaves_only_the_intercept() {
        let (x, y) = noisy_linear(40, 3);
        let model = RidgeRegression::new(1e12).unwrap().fit(x.view(), y.view()).unwrap();
        assert!(model.coefficient_norm() < 1e-6);
        assert_abs_diff_eq!(model.intercept, y.mean().unwrap(), epsilon = 1e-4);
    }

    #[test]
    fn test_rank_deficient_ols_returns_minimum_norm_solution() {
        // Second column duplicates the first.
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];
        let model = OrdinaryLeastSquares.fit(x.view(), y.view()).unwrap();

        assert_eq!(model.design_rank, Some(1));
        assert_abs_diff_eq!(model.coefficients[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(model.coefficients[1], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(model.intercept, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_alpha_and_shapes_are_rejected() {
        for alpha in [-1.0, f64::NAN, f64::INFINITY] {
            match RidgeRegression::new(alpha) {
                Err(e @ ModelError::InvalidAlpha(_)) => {
                    assert_eq!(e.kind(), ErrorKind::Configuration)
                }
                other => panic!("Expected InvalidAlpha, got {:?}", other),
            }
        }

        let x = Array2::<f64>::zeros((0, 2));
        let y = Array1::<f64>::zeros(0);
        assert!(matches!(
            OrdinaryLeastSquares.fit(x.view(), y.view()),
            Err(ModelError::EmptyDesign)
        ));

        let x = array![[1.0], [2.0]];
        let y = array![1.0];
        assert!(matches!(
            OrdinaryLeastSquares.fit(x.view(), y.view()),
            Err(ModelError::LengthMismatch { x_rows: 2, y_len: 1 })
        ));

        let model = OrdinaryLeastSquares
            .fit(array![[1.0], [2.0], [3.0]].view(), array![1.0, 2.0, 3.0].view())
            .unwrap();
        assert!(matches!(
            model.predict(array![[1.0, 2.0]].view()),
            Err(ModelError::FeatureCountMismatch { expected: 1, found: 2 })
        ));
    }
}
