//! Goodness-of-fit metrics and k-fold cross-validation.

use ndarray::{ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::error::ErrorKind;
use crate::model::{ModelError, Regressor};
use crate::split::shuffled_indices;

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Cannot score an empty set of predictions.")]
    EmptyInput,

    #[error("Got {truth} observed values but {predicted} predictions.")]
    LengthMismatch { truth: usize, predicted: usize },

    #[error("Cross-validation needs between 2 and {n_samples} folds, got {folds}.")]
    InvalidFoldCount { folds: usize, n_samples: usize },

    #[error("Fitting fold {fold} failed: {source}")]
    FoldFitFailed {
        fold: usize,
        #[source]
        source: ModelError,
    },

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl EvaluationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvaluationError::EmptyInput | EvaluationError::LengthMismatch { .. } => {
                ErrorKind::DegenerateData
            }
            EvaluationError::InvalidFoldCount { .. } => ErrorKind::Configuration,
            EvaluationError::FoldFitFailed { source, .. } => source.kind(),
            EvaluationError::Model(source) => source.kind(),
        }
    }
}

fn check_pair(truth: ArrayView1<f64>, predicted: ArrayView1<f64>) -> Result<(), EvaluationError> {
    if truth.len() != predicted.len() {
        return Err(EvaluationError::LengthMismatch {
            truth: truth.len(),
            predicted: predicted.len(),
        });
    }
    if truth.is_empty() {
        return Err(EvaluationError::EmptyInput);
    }
    Ok(())
}

/// Coefficient of determination, `1 - SS_res / SS_tot`.
///
/// A constant response has `SS_tot = 0`; the score is then 1.0 for an exact
/// prediction and 0.0 otherwise.
pub fn r2(truth: ArrayView1<f64>, predicted: ArrayView1<f64>) -> Result<f64, EvaluationError> {
    check_pair(truth, predicted)?;
    let mean = truth.sum() / truth.len() as f64;
    let ss_res: f64 = truth
        .iter()
        .zip(predicted.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = truth.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

/// Mean squared error.
pub fn mse(truth: ArrayView1<f64>, predicted: ArrayView1<f64>) -> Result<f64, EvaluationError> {
    check_pair(truth, predicted)?;
    let ss_res: f64 = truth
        .iter()
        .zip(predicted.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    Ok(ss_res / truth.len() as f64)
}

/// How rows are assigned to cross-validation folds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FoldStrategy {
    /// Consecutive blocks of rows in file order.
    #[default]
    Contiguous,
    /// Consecutive blocks of a seeded permutation of the rows.
    Shuffled { seed: u64 },
}

/// Row indices of each fold. The first `n % k` folds hold one extra row.
pub fn fold_indices(
    n_samples: usize,
    folds: usize,
    strategy: FoldStrategy,
) -> Result<Vec<Vec<usize>>, EvaluationError> {
    if folds < 2 || folds > n_samples {
        return Err(EvaluationError::InvalidFoldCount { folds, n_samples });
    }
    let order = match strategy {
        FoldStrategy::Contiguous => (0..n_samples).collect(),
        FoldStrategy::Shuffled { seed } => shuffled_indices(n_samples, seed),
    };

    let base = n_samples / folds;
    let extra = n_samples % folds;
    let mut start = 0;
    let mut result = Vec::with_capacity(folds);
    for fold in 0..folds {
        let size = base + usize::from(fold < extra);
        result.push(order[start..start + size].to_vec());
        start += size;
    }
    Ok(result)
}

/// Out-of-fold R² for each of `folds` folds, in fold order.
///
/// Each fold is scored by a model fitted on the remaining folds. Folds are
/// fitted in parallel.
pub fn cross_validate(
    model: &dyn Regressor,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    folds: usize,
    strategy: FoldStrategy,
) -> Result<Vec<f64>, EvaluationError> {
    if x.nrows() != y.len() {
        return Err(EvaluationError::LengthMismatch {
            truth: y.len(),
            predicted: x.nrows(),
        });
    }
    let assignments = fold_indices(x.nrows(), folds, strategy)?;

    let scores = assignments
        .par_iter()
        .enumerate()
        .map(|(fold, held_out)| {
            let train: Vec<usize> = assignments
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != fold)
                .flat_map(|(_, rows)| rows.iter().copied())
                .collect();

            let fitted = model
                .fit(
                    x.select(Axis(0), &train).view(),
                    y.select(Axis(0), &train).view(),
                )
                .map_err(|source| EvaluationError::FoldFitFailed { fold, source })?;
            let predicted = fitted.predict(x.select(Axis(0), held_out).view())?;
            r2(y.select(Axis(0), held_out).view(), predicted.view())
        })
        .collect::<Result<Vec<f64>, EvaluationError>>()?;

    log::debug!("{} cross-validation R² by fold: {:?}", model.name(), scores);
    Ok(scores)
}

/// Held-out and cross-validated performance of one model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelMetrics {
    pub model: String,
    pub r2: f64,
    pub mse: f64,
    pub cv_scores: Vec<f64>,
    pub mean_cv: f64,
}

impl ModelMetrics {
    pub fn new(model: impl Into<String>, r2: f64, mse: f64, cv_scores: Vec<f64>) -> Self {
        let mean_cv = if cv_scores.is_empty() {
            f64::NAN
        } else {
            cv_scores.iter().sum::<f64>() / cv_scores.len() as f64
        };
        Self {
            model: model.into(),
            r2,
            mse,
            cv_scores,
            mean_cv,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsReport {
    pub models: Vec<ModelMetrics>,
}

impl MetricsReport {
    pub fn get(&self, model: &str) -> Option<&ModelMetrics> {
        self.models.iter().find(|m| m.model == model)
    }
}

impl fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for metrics in &self.models {
            writeln!(f, "{}:", metrics.model)?;
            writeln!(f, "  R² Score: {:.6}", metrics.r2)?;
            writeln!(f, "  MSE: {:.6}", metrics.mse)?;
            let scores: Vec<String> = metrics.cv_scores.iter().map(|s| format!("{s:.6}")).collect();
            writeln!(f, "  Cross-Validation Scores: [{}]", scores.join(", "))?;
            writeln!(f, "  Mean CV Score: {:.6}", metrics.mean_cv)?;
        }
        Ok(())
    }
}
