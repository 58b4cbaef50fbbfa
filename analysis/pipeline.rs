//! # Analysis Orchestrator
//!
//! Runs the stages in order: load, impute, prune, collinearity screening,
//! standardization and PCA, train/test split, model fitting, evaluation.
//! Each stage's error converges on [`PipelineError`], whose [`PipelineError::kind`]
//! is what the command line reports.
//!
//! With [`TransformScope::FullDataset`] the scaler and PCA are fitted on every
//! row before the split. With [`TransformScope::TrainingOnly`] they are fitted on
//! the training rows only. In both scopes the models and the cross-validation
//! folds see the training partition alone; the held-out rows are used only for
//! the reported R² and MSE.

use ndarray::{Array1, Array2};
use std::path::Path;
use thiserror::Error;

use crate::collinearity::{
    self, CollinearityError, VifEntry, VifReport, compute_vif, correlation_matrix, drop_features,
    eliminate_above,
};
use crate::config::{CollinearityConfig, ConfigError, PipelineConfig};
use crate::data::{DataError, FeatureMatrix, Table, load_table};
use crate::error::ErrorKind;
use crate::evaluate::{self, EvaluationError, MetricsReport, ModelMetrics, cross_validate};
use crate::impute::{ImputationSummary, impute_median};
use crate::model::{FittedModel, ModelError, OrdinaryLeastSquares, Regressor, RidgeRegression};
use crate::prune::{PruneError, PruneSummary, prune_columns};
use crate::report::ReportError;
use crate::split::{Split, SplitError, partition_indices, split};
use crate::transform::{FeatureTransformer, TransformError, TransformScope};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Prune(#[from] PruneError),
    #[error(transparent)]
    Collinearity(#[from] CollinearityError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Split(#[from] SplitError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Config(e) => e.kind(),
            PipelineError::Data(e) => e.kind(),
            PipelineError::Prune(e) => e.kind(),
            PipelineError::Collinearity(e) => e.kind(),
            PipelineError::Transform(e) => e.kind(),
            PipelineError::Split(e) => e.kind(),
            PipelineError::Model(e) => e.kind(),
            PipelineError::Evaluation(e) => e.kind(),
            PipelineError::Report(e) => e.kind(),
        }
    }
}

/// Missing entries in one column before and after imputation.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingCount {
    pub column: String,
    pub before: usize,
    pub after: usize,
}

/// The cleaned table with a record of what cleaning did.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub table: Table,
    pub missing: Vec<MissingCount>,
    pub imputation: ImputationSummary,
    pub pruning: PruneSummary,
}

impl PreparedData {
    /// The target vector and the feature matrix the collinearity screen starts
    /// from. The target is among the features only when `retain_target` is set.
    pub fn features_and_target(
        &self,
        config: &PipelineConfig,
    ) -> Result<(FeatureMatrix, Array1<f64>), PipelineError> {
        let target = config.data.target.as_str();
        let y = self.table.numeric_vector(target)?;
        let exclude = if config.transform.retain_target {
            Vec::new()
        } else {
            vec![target]
        };
        let features = self.table.feature_matrix(&exclude)?;
        Ok((features, y))
    }
}

/// Loads the data file, imputes missing values and prunes configured columns.
pub fn prepare(path: &Path, config: &PipelineConfig) -> Result<PreparedData, PipelineError> {
    let mut table = load_table(path, &config.load_options())?;
    let target = config.data.target.as_str();
    if !table.contains(target) {
        return Err(DataError::ColumnNotFound(target.to_string()).into());
    }

    let before = table.missing_counts();
    let imputation = impute_median(&mut table);
    let after = table.missing_counts();
    let missing = before
        .into_iter()
        .zip(after)
        .map(|((column, before), (_, after))| MissingCount {
            column,
            before,
            after,
        })
        .collect();

    let pruning = prune_columns(&mut table, &config.prune.columns, &[target])?;
    log::info!(
        "Prepared {} rows x {} columns from '{}'",
        table.n_rows(),
        table.n_columns(),
        path.display()
    );

    Ok(PreparedData {
        table,
        missing,
        imputation,
        pruning,
    })
}

/// Outcome of the collinearity screen.
#[derive(Debug, Clone)]
pub struct CollinearityScreen {
    pub initial: VifReport,
    pub reduced: VifReport,
    /// Features dropped by name.
    pub dropped: Vec<String>,
    /// Features removed by threshold elimination, with their scores.
    pub eliminated: Vec<VifEntry>,
    /// The features that survive the screen.
    pub matrix: FeatureMatrix,
    /// Pearson correlations of the surviving features.
    pub correlation: Array2<f64>,
}

/// Computes the initial VIF report, removes the configured features, applies
/// threshold elimination when configured, and reports on what remains.
pub fn screen_collinearity(
    features: &FeatureMatrix,
    config: &CollinearityConfig,
) -> Result<CollinearityScreen, PipelineError> {
    let fit = config.auxiliary_fit();
    let initial = compute_vif(features, fit)?;
    log::debug!("Initial VIF:\n{initial}");

    let manual = drop_features(features, &config.drop);
    let dropped: Vec<String> = features
        .names()
        .iter()
        .filter(|name| manual.position(name).is_none())
        .cloned()
        .collect();

    let (matrix, eliminated, reduced) = match config.threshold {
        Some(threshold) => {
            let elimination = eliminate_above(&manual, threshold, config.max_rounds, fit)?;
            (elimination.matrix, elimination.removed, elimination.report)
        }
        None => {
            let report = compute_vif(&manual, fit)?;
            (manual, Vec::new(), report)
        }
    };

    let correlation = correlation_matrix(&matrix);
    log::info!(
        "Collinearity screen kept {} of {} features",
        matrix.n_features(),
        features.n_features()
    );

    Ok(CollinearityScreen {
        initial,
        reduced,
        dropped,
        eliminated,
        matrix,
        correlation,
    })
}

/// Held-out predictions of one fitted model.
#[derive(Debug, Clone)]
pub struct ModelOutcome {
    pub model: FittedModel,
    pub predictions: Array1<f64>,
}

impl ModelOutcome {
    pub fn residuals(&self, truth: &Array1<f64>) -> Array1<f64> {
        truth - &self.predictions
    }
}

/// Everything a run computes, for printing and export.
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub config: PipelineConfig,
    pub prepared: PreparedData,
    pub screen: CollinearityScreen,
    pub transformer: FeatureTransformer,
    pub split: Split,
    pub outcomes: Vec<ModelOutcome>,
    pub metrics: MetricsReport,
}

impl AnalysisRun {
    pub fn n_components(&self) -> usize {
        self.transformer.pca().n_components()
    }
}

/// Runs every stage on the data file at `path`.
pub fn run(path: &Path, config: &PipelineConfig) -> Result<AnalysisRun, PipelineError> {
    config.validate()?;
    let prepared = prepare(path, config)?;
    let (features, y) = prepared.features_and_target(config)?;
    let screen = screen_collinearity(&features, &config.collinearity)?;

    let transform = &config.transform;
    let test_fraction = config.split.test_fraction;
    let seed = config.split.seed;

    let (transformer, split) = match transform.scope {
        TransformScope::FullDataset => {
            let transformer = FeatureTransformer::fit(
                &screen.matrix,
                transform.variance_threshold,
                transform.zero_variance,
            )?;
            let projected = transformer.transform(screen.matrix.values().view())?;
            let split = split(projected.view(), y.view(), test_fraction, seed)?;
            (transformer, split)
        }
        TransformScope::TrainingOnly => {
            let (train, test) = partition_indices(screen.matrix.n_rows(), test_fraction, seed)?;
            let transformer = FeatureTransformer::fit(
                &screen.matrix.select_rows(&train),
                transform.variance_threshold,
                transform.zero_variance,
            )?;
            let projected = transformer.transform(screen.matrix.values().view())?;
            let split = Split::from_indices(projected.view(), y.view(), train, test);
            (transformer, split)
        }
    };

    let models: Vec<Box<dyn Regressor>> = vec![
        Box::new(OrdinaryLeastSquares),
        Box::new(RidgeRegression::new(config.model.ridge_alpha)?),
    ];

    let mut outcomes = Vec::with_capacity(models.len());
    let mut metrics = MetricsReport::default();
    for regressor in &models {
        let model = regressor.fit(split.x_train.view(), split.y_train.view())?;
        let predictions = model.predict(split.x_test.view())?;
        let r2 = evaluate::r2(split.y_test.view(), predictions.view())?;
        let mse = evaluate::mse(split.y_test.view(), predictions.view())?;
        let cv_scores = cross_validate(
            regressor.as_ref(),
            split.x_train.view(),
            split.y_train.view(),
            config.evaluation.folds,
            config.evaluation.strategy(),
        )?;
        log::info!("{}: R² {r2:.4}, MSE {mse:.4}", model.name);
        metrics
            .models
            .push(ModelMetrics::new(model.name.clone(), r2, mse, cv_scores));
        outcomes.push(ModelOutcome { model, predictions });
    }

    Ok(AnalysisRun {
        config: config.clone(),
        prepared,
        screen,
        transformer,
        split,
        outcomes,
        metrics,
    })
}

/// Largest absolute pairwise correlations among the screened features.
pub fn strongest_pairs(screen: &CollinearityScreen, limit: usize) -> Vec<(String, String, f64)> {
    collinearity::strongest_correlations(&screen.matrix, &screen.correlation, limit)
}
