//! # Multicollinearity Diagnostics
//!
//! The variance inflation factor of feature `j` is `1 / (1 - R²_j)`, where `R²_j`
//! comes from an auxiliary least-squares regression of column `j` on every other
//! column. By default ([`AuxiliaryFit::Uncentered`]) that regression has no
//! constant term and `R²_j = 1 - SS_res / Σx_j²`. [`AuxiliaryFit::WithIntercept`]
//! adds an intercept and uses the centered `R²`.
//!
//! Degenerate scores are data, not errors:
//! - a feature that is an exact linear combination of the others scores `+inf`;
//! - a feature with nothing to explain scores `NaN`. That is an all-zero column
//!   when uncentered and any constant column with an intercept.
//!
//! [`compute_vif`] is pure, so callers can iterate it. [`drop_features`] removes
//! features by name (the manual round of the reference workflow) and
//! [`eliminate_above`] repeats "drop the worst feature, recompute" while the
//! worst score exceeds a threshold.

use itertools::Itertools;
use ndarray::{Array1, Array2, Axis};
use ndarray_linalg::error::LinalgError;
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

use crate::data::FeatureMatrix;
use crate::error::ErrorKind;
use crate::linalg::{center, least_squares, sum_of_squares};

/// `1 - R²` at or below this value is treated as perfect collinearity.
pub const PERFECT_COLLINEARITY_TOLERANCE: f64 = 1.0e-12;

/// Relative variance below which a column counts as constant.
const CONSTANT_COLUMN_TOLERANCE: f64 = 1.0e-12;

/// How the auxiliary regression behind each score is fitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuxiliaryFit {
    /// No constant term, uncentered `R²`.
    #[default]
    Uncentered,
    /// An intercept plus the other columns, centered `R²`.
    WithIntercept,
}

impl AuxiliaryFit {
    pub fn from_intercept(intercept: bool) -> Self {
        if intercept {
            AuxiliaryFit::WithIntercept
        } else {
            AuxiliaryFit::Uncentered
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VifEntry {
    pub feature: String,
    pub vif: f64,
}

/// Variance inflation factors in feature order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VifReport {
    entries: Vec<VifEntry>,
}

#[derive(Error, Debug)]
pub enum CollinearityError {
    #[error("VIF needs at least {required} observations, but the matrix has {found}.")]
    InsufficientRows { found: usize, required: usize },

    #[error("The feature matrix has no columns.")]
    EmptyMatrix,

    #[error("VIF elimination threshold must be a finite value of at least 1.0, got {0}.")]
    InvalidThreshold(f64),

    #[error("Auxiliary least-squares regression for '{feature}' failed: {source}")]
    AuxiliaryRegressionFailed {
        feature: String,
        #[source]
        source: LinalgError,
    },
}

impl CollinearityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CollinearityError::InsufficientRows { .. }
            | CollinearityError::EmptyMatrix
            | CollinearityError::AuxiliaryRegressionFailed { .. } => ErrorKind::DegenerateData,
            CollinearityError::InvalidThreshold(_) => ErrorKind::Configuration,
        }
    }
}

impl VifReport {
    pub fn entries(&self) -> &[VifEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, feature: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.feature == feature)
            .map(|e| e.vif)
    }

    /// The entry with the largest score. `NaN` ranks above `+inf`, which ranks
    /// above every finite score; ties go to the earlier feature.
    pub fn worst(&self) -> Option<&VifEntry> {
        self.entries
            .iter()
            .rev()
            .max_by(|a, b| severity_order(a.vif, b.vif))
    }
}

fn severity_order(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}

impl fmt::Display for VifReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .entries
            .iter()
            .map(|e| e.feature.chars().count())
            .chain(std::iter::once("feature".len()))
            .max()
            .unwrap_or(0);
        writeln!(f, "{:<width$}  {:>12}", "feature", "VIF")?;
        for entry in &self.entries {
            writeln!(f, "{:<width$}  {:>12}", entry.feature, format_score(entry.vif))?;
        }
        Ok(())
    }
}

fn format_score(vif: f64) -> String {
    if vif.is_nan() {
        "NaN".to_string()
    } else if vif.is_infinite() {
        "inf".to_string()
    } else {
        format!("{vif:.4}")
    }
}

/// Converts an auxiliary-regression `R²` into a variance inflation factor.
pub fn variance_inflation(r_squared: f64) -> f64 {
    if r_squared.is_nan() {
        return f64::NAN;
    }
    let unexplained = 1.0 - r_squared;
    if unexplained <= PERFECT_COLLINEARITY_TOLERANCE {
        f64::INFINITY
    } else {
        1.0 / unexplained
    }
}

/// Computes the VIF of every feature. Columns are independent and evaluated in
/// parallel; the report keeps feature order.
pub fn compute_vif(
    matrix: &FeatureMatrix,
    fit: AuxiliaryFit,
) -> Result<VifReport, CollinearityError> {
    let p = matrix.n_features();
    if p == 0 {
        return Err(CollinearityError::EmptyMatrix);
    }
    if matrix.n_rows() < 2 {
        return Err(CollinearityError::InsufficientRows {
            found: matrix.n_rows(),
            required: 2,
        });
    }

    let scores = (0..p)
        .into_par_iter()
        .map(|j| {
            auxiliary_r_squared(matrix.values(), j, fit)
                .map(variance_inflation)
                .map_err(|source| CollinearityError::AuxiliaryRegressionFailed {
                    feature: matrix.names()[j].clone(),
                    source,
                })
        })
        .collect::<Result<Vec<f64>, _>>()?;

    let entries = matrix
        .names()
        .iter()
        .zip(scores)
        .map(|(feature, vif)| VifEntry {
            feature: feature.clone(),
            vif,
        })
        .collect();
    Ok(VifReport { entries })
}

/// `R²` of regressing column `target` on the others.
fn auxiliary_r_squared(
    values: &Array2<f64>,
    target: usize,
    fit: AuxiliaryFit,
) -> Result<f64, LinalgError> {
    let others: Vec<usize> = (0..values.ncols()).filter(|&j| j != target).collect();
    let regressors = values.select(Axis(1), &others);
    let (x, y) = match fit {
        AuxiliaryFit::Uncentered => (regressors, values.column(target).to_owned()),
        AuxiliaryFit::WithIntercept => {
            let design = center(regressors.view(), values.column(target));
            (design.x, design.y)
        }
    };

    let ss_tot = sum_of_squares(y.view());
    let scale = values
        .column(target)
        .iter()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if ss_tot <= CONSTANT_COLUMN_TOLERANCE * scale * scale * values.nrows() as f64 {
        return Ok(f64::NAN);
    }
    if others.is_empty() {
        return Ok(0.0);
    }

    let solution = least_squares(x.view(), y.view())?;
    let residuals = &y - &x.dot(&solution.beta);
    let ss_res = sum_of_squares(residuals.view());
    Ok(1.0 - ss_res / ss_tot)
}

/// Removes the named features. Names not present are ignored with a warning.
pub fn drop_features(matrix: &FeatureMatrix, names: &[String]) -> FeatureMatrix {
    let mut positions = Vec::with_capacity(names.len());
    for name in names {
        match matrix.position(name) {
            Some(j) => positions.push(j),
            None => log::warn!("Feature '{name}' is not in the feature matrix; nothing to drop."),
        }
    }
    matrix.without_columns(&positions)
}

/// Result of [`eliminate_above`].
#[derive(Debug, Clone)]
pub struct Elimination {
    pub matrix: FeatureMatrix,
    /// Removed features with the score that triggered each removal.
    pub removed: Vec<VifEntry>,
    /// The VIF report after the last round.
    pub report: VifReport,
}

/// Repeatedly drops the highest-VIF feature while its score exceeds `threshold`.
///
/// `+inf` and `NaN` scores always exceed the threshold. Stops after `max_rounds`
/// removals or when a single feature remains.
pub fn eliminate_above(
    matrix: &FeatureMatrix,
    threshold: f64,
    max_rounds: usize,
    fit: AuxiliaryFit,
) -> Result<Elimination, CollinearityError> {
    if !threshold.is_finite() || threshold < 1.0 {
        return Err(CollinearityError::InvalidThreshold(threshold));
    }

    let mut current = matrix.clone();
    let mut removed = Vec::new();
    let mut report = compute_vif(&current, fit)?;

    while removed.len() < max_rounds && current.n_features() > 1 {
        let Some(worst) = report.worst().cloned() else {
            break;
        };
        if !(worst.vif.is_nan() || worst.vif > threshold) {
            break;
        }
        log::info!(
            "Dropping '{}' (VIF {}) above threshold {threshold}",
            worst.feature,
            format_score(worst.vif)
        );
        let Some(position) = current.position(&worst.feature) else {
            break;
        };
        current = current.without_columns(&[position]);
        removed.push(worst);
        report = compute_vif(&current, fit)?;
    }

    Ok(Elimination {
        matrix: current,
        removed,
        report,
    })
}

/// Pearson correlation between every pair of features.
///
/// The diagonal is `1.0`; entries involving a constant column are `NaN`.
pub fn correlation_matrix(matrix: &FeatureMatrix) -> Array2<f64> {
    let values = matrix.values();
    let p = values.ncols();
    let n = values.nrows().max(1) as f64;
    let means = values.sum_axis(Axis(0)) / n;
    let centered = values - &means;
    let norms: Array1<f64> = centered
        .axis_iter(Axis(1))
        .map(|c| c.dot(&c).sqrt())
        .collect();
    let cross = centered.t().dot(&centered);

    Array2::from_shape_fn((p, p), |(i, j)| {
        if i == j {
            1.0
        } else if norms[i] == 0.0 || norms[j] == 0.0 {
            f64::NAN
        } else {
            (cross[[i, j]] / (norms[i] * norms[j])).clamp(-1.0, 1.0)
        }
    })
}

/// Feature pairs ordered by decreasing absolute correlation. Pairs with an
/// undefined (`NaN`) correlation are left out.
pub fn strongest_correlations(
    matrix: &FeatureMatrix,
    correlation: &Array2<f64>,
    limit: usize,
) -> Vec<(String, String, f64)> {
    (0..matrix.n_features())
        .tuple_combinations()
        .map(|(i, j)| (i, j, correlation[[i, j]]))
        .filter(|(_, _, r)| !r.is_nan())
        .sorted_by(|a, b| b.2.abs().total_cmp(&a.2.abs()))
        .take(limit)
        .map(|(i, j, r)| (matrix.names()[i].clone(), matrix.names()[j].clone(), r))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn matrix(names: &[&str], columns: Vec<Vec<f64>>) -> FeatureMatrix {
        let n = columns[0].len();
        let values = Array2::from_shape_fn((n, columns.len()), |(i, j)| columns[j][i]);
        FeatureMatrix::new(names.iter().map(|s| s.to_string()).collect(), values).unwrap()
    }

    /// Three mutually orthogonal, centered columns of length 8.
    fn orthogonal_matrix() -> FeatureMatrix {
        matrix(
            &["a", "b", "c"],
            vec![
                vec![1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0],
                vec![1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0, -1.0],
                vec![1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0],
            ],
        )
    }

    fn collinear_matrix() -> FeatureMatrix {
        let mut rng = StdRng::seed_from_u64(7);
        let a: Vec<f64> = (0..40).map(|_| rng.r#gen::<f64>() * 10.0).collect();
        let b: Vec<f64> = a.iter().map(|v| 2.0 * v).collect();
        let c: Vec<f64> = (0..40).map(|_| rng.r#gen::<f64>()).collect();
        matrix(&["a", "b", "c"], vec![a, b, c])
    }

    #[test]
    fn test_orthogonal_columns_have_unit_vif() {
        let report = compute_vif(&orthogonal_matrix(), AuxiliaryFit::Uncentered).unwrap();
        assert_eq!(report.len(), 3);
        for entry in report.entries() {
            assert_abs_diff_eq!(entry.vif, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_perfectly_collinear_columns_are_infinite() {
        let report = compute_vif(&collinear_matrix(), AuxiliaryFit::Uncentered).unwrap();
        let a = report.get("a").unwrap();
        let b = report.get("b").unwrap();
        assert!(a.is_infinite() || a > 1e10, "VIF(a) = {a}");
        assert!(b.is_infinite() || b > 1e10, "VIF(b) = {b}");
        assert!(report.get("c").unwrap().is_finite());
    }

    #[test]
    fn test_constant_column_scores_nan() {
        let m = matrix(
            &["x", "k"],
            vec![vec![1.0, 2.0, 4.0, 3.0], vec![5.0, 5.0, 5.0, 5.0]],
        );
        let report = compute_vif(&m, AuxiliaryFit::WithIntercept).unwrap();
        assert!(report.get("k").unwrap().is_nan());
        assert_eq!(report.worst().unwrap().feature, "k");
    }

    #[test]
    fn test_uncentered_vif_counts_the_mean() {
        // x on k without a constant: beta = 2.5, SS_res = 5, Σx² = 30, so R² = 5/6.
        // k on x: beta = 1/3, SS_res = 2/3, Σk² = 4, so R² = 5/6 as well.
        let m = matrix(
            &["x", "k"],
            vec![vec![1.0, 2.0, 3.0, 4.0], vec![1.0, 1.0, 1.0, 1.0]],
        );
        let uncentered = compute_vif(&m, AuxiliaryFit::Uncentered).unwrap();
        assert_abs_diff_eq!(uncentered.get("x").unwrap(), 6.0, epsilon = 1e-9);
        assert_abs_diff_eq!(uncentered.get("k").unwrap(), 6.0, epsilon = 1e-9);

        let centered = compute_vif(&m, AuxiliaryFit::WithIntercept).unwrap();
        assert_abs_diff_eq!(centered.get("x").unwrap(), 1.0, epsilon = 1e-9);
        assert!(centered.get("k").unwrap().is_nan());
    }

    #[test]
    fn test_all_zero_column_scores_nan_without_intercept() {
        let m = matrix(
            &["x", "z"],
            vec![vec![1.0, 2.0, 4.0, 3.0], vec![0.0, 0.0, 0.0, 0.0]],
        );
        let report = compute_vif(&m, AuxiliaryFit::Uncentered).unwrap();
        assert!(report.get("z").unwrap().is_nan());
        assert_abs_diff_eq!(report.get("x").unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_single_feature_has_unit_vif() {
        let m = matrix(&["only"], vec![vec![1.0, 2.0, 3.0]]);
        for fit in [AuxiliaryFit::Uncentered, AuxiliaryFit::WithIntercept] {
            let report = compute_vif(&m, fit).unwrap();
            assert_abs_diff_eq!(report.get("only").unwrap(), 1.0);
        }
    }

    #[test]
    fn test_compute_vif_is_repeatable() {
        let m = collinear_matrix().without_columns(&[1]);
        let fit = AuxiliaryFit::Uncentered;
        assert_eq!(compute_vif(&m, fit).unwrap(), compute_vif(&m, fit).unwrap());
    }

    #[test]
    fn test_variance_inflation_boundaries() {
        assert_abs_diff_eq!(variance_inflation(0.0), 1.0);
        assert_abs_diff_eq!(variance_inflation(0.9), 10.0, epsilon = 1e-9);
        assert!(variance_inflation(1.0).is_infinite());
        assert!(variance_inflation(f64::NAN).is_nan());
    }

    #[test]
    fn test_drop_features_by_name() {
        let m = collinear_matrix();
        let reduced = drop_features(&m, &["b".to_string(), "missing".to_string()]);
        assert_eq!(reduced.names(), &["a".to_string(), "c".to_string()]);
        let report = compute_vif(&reduced, AuxiliaryFit::Uncentered).unwrap();
        assert!(report.entries().iter().all(|e| e.vif.is_finite() && e.vif < 5.0));
    }

    #[test]
    fn test_eliminate_above_removes_one_of_the_collinear_pair() {
        let elimination =
            eliminate_above(&collinear_matrix(), 10.0, 5, AuxiliaryFit::Uncentered).unwrap();
        assert_eq!(elimination.removed.len(), 1);
        assert!(["a", "b"].contains(&elimination.removed[0].feature.as_str()));
        assert_eq!(elimination.matrix.n_features(), 2);
        assert!(elimination.report.entries().iter().all(|e| e.vif <= 10.0));
    }

    #[test]
    fn test_eliminate_above_respects_round_limit_and_threshold() {
        let none =
            eliminate_above(&collinear_matrix(), 10.0, 0, AuxiliaryFit::Uncentered).unwrap();
        assert!(none.removed.is_empty());
        assert!(matches!(
            eliminate_above(&collinear_matrix(), 0.5, 1, AuxiliaryFit::Uncentered),
            Err(CollinearityError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_correlation_matrix() {
        let m = matrix(
            &["x", "y", "z", "k"],
            vec![
                vec![1.0, 2.0, 3.0, 4.0],
                vec![2.0, 4.0, 6.0, 8.0],
                vec![4.0, 3.0, 2.0, 1.0],
                vec![1.0, 1.0, 1.0, 1.0],
            ],
        );
        let r = correlation_matrix(&m);
        assert_abs_diff_eq!(r[[0, 1]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(r[[0, 2]], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(r[[3, 3]], 1.0);
        assert!(r[[0, 3]].is_nan());

        let pairs = strongest_correlations(&m, &r, 2);
        assert_eq!(pairs.len(), 2);
        assert_abs_diff_eq!(pairs[0].2.abs(), 1.0, epsilon = 1e-12);
    }
}
