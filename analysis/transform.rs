//! # Standardization and Principal Component Analysis
//!
//! Features are standardized to zero mean and unit variance using the population
//! standard deviation (`ddof = 0`), then projected onto the leading principal
//! components of their sample covariance (`n - 1` denominator). The number of
//! components kept is the smallest `k` whose cumulative explained variance ratio
//! reaches the configured threshold.
//!
//! Eigenvector signs are not identified by the decomposition. Each component is
//! oriented so that its largest-magnitude loading is positive, which makes the
//! output reproducible, but consumers should not attach meaning to the sign.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};
use ndarray_linalg::error::LinalgError;
use ndarray_linalg::{Eigh, UPLO};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::FeatureMatrix;
use crate::error::ErrorKind;

/// Variance at or below this value counts as zero when standardizing.
pub const ZERO_VARIANCE_EPSILON: f64 = 1.0e-12;

/// What to do with a feature whose variance is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZeroVariancePolicy {
    /// Keep the column with a scale of 1.0; it standardizes to all zeros.
    #[default]
    UnitScale,
    /// Reject the matrix.
    Fail,
}

/// Which rows the scaler and PCA are fitted on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformScope {
    /// Fit on every row before the train/test split. Test rows leak into the
    /// fitted means, scales and components.
    #[default]
    FullDataset,
    /// Fit on training rows only and apply the fitted transform to test rows.
    TrainingOnly,
}

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Feature '{0}' has zero variance and the zero-variance policy is 'fail'.")]
    ZeroVariance(String),

    #[error("The variance threshold must be in (0, 1], got {0}.")]
    InvalidVarianceThreshold(f64),

    #[error("At least {required} observations are needed, but only {found} were provided.")]
    InsufficientRows { found: usize, required: usize },

    #[error("The feature matrix has no columns.")]
    EmptyMatrix,

    #[error("The standardized features carry no variance; there are no principal components.")]
    NoVariance,

    #[error("Expected {expected} feature columns, found {found}.")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Eigendecomposition of the covariance matrix failed: {0}")]
    EigendecompositionFailed(#[from] LinalgError),
}

impl TransformError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransformError::InvalidVarianceThreshold(_) => ErrorKind::Configuration,
            TransformError::DimensionMismatch { .. } => ErrorKind::Schema,
            TransformError::ZeroVariance(_)
            | TransformError::InsufficientRows { .. }
            | TransformError::EmptyMatrix
            | TransformError::NoVariance
            | TransformError::EigendecompositionFailed(_) => ErrorKind::DegenerateData,
        }
    }
}

/// Per-column centering and scaling learned from a feature matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandardScaler {
    means: Array1<f64>,
    scales: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(matrix: &FeatureMatrix, policy: ZeroVariancePolicy) -> Result<Self, TransformError> {
        let values = matrix.values();
        if values.ncols() == 0 {
            return Err(TransformError::EmptyMatrix);
        }
        if values.nrows() == 0 {
            return Err(TransformError::InsufficientRows {
                found: 0,
                required: 1,
            });
        }

        let means = values
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(values.ncols()));
        let variances = values.var_axis(Axis(0), 0.0);

        let mut scales = Array1::ones(values.ncols());
        for (j, &variance) in variances.iter().enumerate() {
            if variance > ZERO_VARIANCE_EPSILON {
                scales[j] = variance.sqrt();
                continue;
            }
            let name = &matrix.names()[j];
            match policy {
                ZeroVariancePolicy::Fail => return Err(TransformError::ZeroVariance(name.clone())),
                ZeroVariancePolicy::UnitScale => {
                    log::warn!("Feature '{name}' has zero variance; using a unit scale.");
                }
            }
        }

        Ok(Self { means, scales })
    }

    pub fn transform(&self, values: ArrayView2<f64>) -> Result<Array2<f64>, TransformError> {
        if values.ncols() != self.means.len() {
            return Err(TransformError::DimensionMismatch {
                expected: self.means.len(),
                found: values.ncols(),
            });
        }
        Ok((&values - &self.means) / &self.scales)
    }

    pub fn means(&self) -> ArrayView1<'_, f64> {
        self.means.view()
    }

    pub fn scales(&self) -> ArrayView1<'_, f64> {
        self.scales.view()
    }
}

/// Standardizes a feature matrix, returning the standardized values together
/// with the per-column means and scales used.
pub fn standardize(
    matrix: &FeatureMatrix,
    policy: ZeroVariancePolicy,
) -> Result<(Array2<f64>, Array1<f64>, Array1<f64>), TransformError> {
    let scaler = StandardScaler::fit(matrix, policy)?;
    let standardized = scaler.transform(matrix.values().view())?;
    Ok((standardized, scaler.means, scaler.scales))
}

/// A fitted principal component projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pca {
    mean: Array1<f64>,
    /// Loadings of the retained components, one column per component.
    components: Array2<f64>,
    /// Eigenvalues of the covariance matrix, in descending order.
    explained_variance: Array1<f64>,
    /// `explained_variance` divided by its sum.
    explained_variance_ratio: Array1<f64>,
}

impl Pca {
    /// Fits the projection, keeping the smallest number of components whose
    /// cumulative explained variance ratio is at least `variance_threshold`.
    pub fn fit(values: ArrayView2<f64>, variance_threshold: f64) -> Result<Self, TransformError> {
        if !(variance_threshold > 0.0 && variance_threshold <= 1.0) {
            return Err(TransformError::InvalidVarianceThreshold(variance_threshold));
        }
        let (n, p) = values.dim();
        if p == 0 {
            return Err(TransformError::EmptyMatrix);
        }
        if n < 2 {
            return Err(TransformError::InsufficientRows {
                found: n,
                required: 2,
            });
        }

        let mean = values
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(p));
        let centered = &values - &mean;
        let covariance = centered.t().dot(&centered) / (n as f64 - 1.0);

        // Eigh returns eigenvalues in ascending order.
        let (eigenvalues, eigenvectors) = covariance.eigh(UPLO::Lower)?;
        let explained_variance: Array1<f64> =
            eigenvalues.iter().rev().map(|&v| v.max(0.0)).collect();
        let total: f64 = explained_variance.sum();
        if total <= 0.0 {
            return Err(TransformError::NoVariance);
        }
        let explained_variance_ratio = &explained_variance / total;
        let k = components_for_threshold(explained_variance_ratio.view(), variance_threshold);

        let mut components = Array2::zeros((p, k));
        for (target, mut column) in components.axis_iter_mut(Axis(1)).enumerate() {
            let loading = eigenvectors.column(p - 1 - target);
            let pivot = loading
                .iter()
                .copied()
                .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
            let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
            column.assign(&loading.mapv(|v| v * sign));
        }

        log::info!(
            "PCA keeps {k} of {p} components ({:.2}% of variance, threshold {:.2}%).",
            100.0 * explained_variance_ratio.slice(s![..k]).sum(),
            100.0 * variance_threshold
        );

        Ok(Self {
            mean,
            components,
            explained_variance,
            explained_variance_ratio,
        })
    }

    pub fn transform(&self, values: ArrayView2<f64>) -> Result<Array2<f64>, TransformError> {
        if values.ncols() != self.mean.len() {
            return Err(TransformError::DimensionMismatch {
                expected: self.mean.len(),
                found: values.ncols(),
            });
        }
        Ok((&values - &self.mean).dot(&self.components))
    }

    pub fn n_components(&self) -> usize {
        self.components.ncols()
    }

    pub fn components(&self) -> ArrayView2<'_, f64> {
        self.components.view()
    }

    pub fn explained_variance(&self) -> ArrayView1<'_, f64> {
        self.explained_variance.view()
    }

    /// Ratios for every component, retained or not, in descending order.
    pub fn explained_variance_ratio(&self) -> ArrayView1<'_, f64> {
        self.explained_variance_ratio.view()
    }
}

/// Smallest prefix length whose cumulative ratio reaches `threshold`.
fn components_for_threshold(ratios: ArrayView1<f64>, threshold: f64) -> usize {
    let mut cumulative = 0.0;
    for (i, ratio) in ratios.iter().enumerate() {
        cumulative += ratio;
        if cumulative >= threshold {
            return i + 1;
        }
    }
    ratios.len()
}

/// Projects standardized features onto their leading principal components.
///
/// Returns the projection, the number of components kept, and the explained
/// variance ratio of every component in descending order.
pub fn reduce_dimensions(
    standardized: ArrayView2<f64>,
    variance_threshold: f64,
) -> Result<(Array2<f64>, usize, Array1<f64>), TransformError> {
    let pca = Pca::fit(standardized, variance_threshold)?;
    let projected = pca.transform(standardized)?;
    let k = pca.n_components();
    Ok((projected, k, pca.explained_variance_ratio))
}

/// Standardization followed by PCA, fitted once and applied to any rows with
/// the same feature layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureTransformer {
    scaler: StandardScaler,
    pca: Pca,
}

impl FeatureTransformer {
    pub fn fit(
        matrix: &FeatureMatrix,
        variance_threshold: f64,
        policy: ZeroVariancePolicy,
    ) -> Result<Self, TransformError> {
        let scaler = StandardScaler::fit(matrix, policy)?;
        let standardized = scaler.transform(matrix.values().view())?;
        let pca = Pca::fit(standardized.view(), variance_threshold)?;
        Ok(Self { scaler, pca })
    }

    pub fn transform(&self, values: ArrayView2<f64>) -> Result<Array2<f64>, TransformError> {
        let standardized = self.scaler.transform(values)?;
        self.pca.transform(standardized.view())
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn pca(&self) -> &Pca {
        &self.pca
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn named(values: Array2<f64>) -> FeatureMatrix {
        let names = (0..values.ncols()).map(|j| format!("f{j}")).collect();
        FeatureMatrix::new(names, values).unwrap()
    }

    /// Five correlated features driven by two latent factors plus noise.
    fn correlated_features(n: usize, seed: u64) -> FeatureMatrix {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let noise = Normal::new(0.0, 0.3).unwrap();
        let mut values = Array2::zeros((n, 5));
        for mut row in values.rows_mut() {
            let f1 = normal.sample(&mut rng);
            let f2 = normal.sample(&mut rng);
            row[0] = 3.0 * f1 + noise.sample(&mut rng) + 10.0;
            row[1] = f1 + noise.sample(&mut rng);
            row[2] = f2 * 5.0 + noise.sample(&mut rng);
            row[3] = f1 - f2 + noise.sample(&mut rng);
            row[4] = noise.sample(&mut rng) * 4.0;
        }
        named(values)
    }

    #[test]
    fn test_standardized_columns_have_zero_mean_unit_variance() {
        let matrix = correlated_features(200, 1);
        let (standardized, means, scales) =
            standardize(&matrix, ZeroVariancePolicy::UnitScale).unwrap();

        assert_eq!(means.len(), 5);
        assert!(scales.iter().all(|&s| s > 0.0));
        for column in standardized.axis_iter(Axis(1)) {
            assert_abs_diff_eq!(column.mean().unwrap(), 0.0, epsilon = 1e-10);
            assert_abs_diff_eq!(column.var(0.0), 1.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_zero_variance_policies() {
        let matrix = named(array![[1.0, 7.0], [2.0, 7.0], [3.0, 7.0]]);

        let (standardized, _, scales) =
            standardize(&matrix, ZeroVariancePolicy::UnitScale).unwrap();
        assert_abs_diff_eq!(scales[1], 1.0);
        assert!(standardized.column(1).iter().all(|&v| v == 0.0));

        match standardize(&matrix, ZeroVariancePolicy::Fail) {
            Err(TransformError::ZeroVariance(name)) => assert_eq!(name, "f1"),
            other => panic!("Expected ZeroVariance, got {:?}", other),
        }
    }

    #[test]
    fn test_component_count_is_monotone_in_threshold() {
        let matrix = correlated_features(300, 2);
        let (standardized, _, _) = standardize(&matrix, ZeroVariancePolicy::UnitScale).unwrap();

        let mut previous = 0;
        for threshold in [0.5, 0.8, 0.9, 0.95, 0.99, 1.0] {
            let (projected, k, ratios) = reduce_dimensions(standardized.view(), threshold).unwrap();
            assert!(k >= previous, "k decreased at threshold {threshold}");
            assert!(k >= 1 && k <= 5);
            assert_eq!(projected.ncols(), k);
            assert!(ratios.slice(s![..k]).sum() >= threshold - 1e-12 || k == 5);
            if k > 1 {
                assert!(ratios.slice(s![..k - 1]).sum() < threshold);
            }
            previous = k;
        }
    }

    #[test]
    fn test_explained_variance_ratios_are_sorted_and_sum_to_one() {
        let matrix = correlated_features(150, 3);
        let (standardized, _, _) = standardize(&matrix, ZeroVariancePolicy::UnitScale).unwrap();
        let pca = Pca::fit(standardized.view(), 0.95).unwrap();

        let ratios = pca.explained_variance_ratio();
        assert_abs_diff_eq!(ratios.sum(), 1.0, epsilon = 1e-10);
        for pair in ratios.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        // Standardized data: eigenvalues of the covariance sum to p * n / (n - 1).
        assert_abs_diff_eq!(
            pca.explained_variance().sum(),
            5.0 * 150.0 / 149.0,
            epsilon = 1e-8
        );
    }

    #[test]
    fn test_projection_is_sign_invariant_and_orthonormal() {
        let matrix = correlated_features(120, 4);
        let (standardized, _, _) = standardize(&matrix, ZeroVariancePolicy::UnitScale).unwrap();
        let pca = Pca::fit(standardized.view(), 1.0).unwrap();

        let components = pca.components();
        let gram = components.t().dot(&components);
        for i in 0..gram.nrows() {
            for j in 0..gram.ncols() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(gram[[i, j]].abs(), expected, epsilon = 1e-10);
            }
        }

        // Projected column variances equal the eigenvalues regardless of sign.
        let projected = pca.transform(standardized.view()).unwrap();
        for (j, column) in projected.axis_iter(Axis(1)).enumerate() {
            assert_abs_diff_eq!(column.var(1.0), pca.explained_variance()[j], epsilon = 1e-8);
        }
    }

    #[test]
    fn test_reduce_dimensions_is_deterministic() {
        let matrix = correlated_features(100, 5);
        let (standardized, _, _) = standardize(&matrix, ZeroVariancePolicy::UnitScale).unwrap();
        let first = reduce_dimensions(standardized.view(), 0.95).unwrap();
        let second = reduce_dimensions(standardized.view(), 0.95).unwrap();
        assert_eq!(first.1, second.1);
        assert_eq!(first.0, second.0);
    }

    #[test]
    fn test_invalid_threshold_is_rejected() {
        let standardized = array![[1.0, 0.0], [0.0, 1.0], [-1.0, -1.0]];
        for threshold in [0.0, -0.1, 1.5, f64::NAN] {
            assert!(matches!(
                Pca::fit(standardized.view(), threshold),
                Err(TransformError::InvalidVarianceThreshold(_))
            ));
        }
    }

    #[test]
    fn test_transformer_applies_training_fit_to_new_rows() {
        let matrix = correlated_features(80, 6);
        let transformer =
            FeatureTransformer::fit(&matrix, 0.9, ZeroVariancePolicy::UnitScale).unwrap();
        let k = transformer.pca().n_components();

        let fresh = correlated_features(10, 7);
        let projected = transformer.transform(fresh.values().view()).unwrap();
        assert_eq!(projected.dim(), (10, k));

        let wrong = Array2::zeros((3, 4));
        assert!(matches!(
            transformer.transform(wrong.view()),
            Err(TransformError::DimensionMismatch { expected: 5, found: 4 })
        ));
        assert_eq!(transformer.scaler().means().len(), 5);
    }
}
