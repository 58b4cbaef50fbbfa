//! Text summaries and tab-separated artifacts of a finished run.
//!
//! Nothing here renders plots. The TSV files carry the data behind the usual
//! figures (missing-value counts, VIF bars, the correlation heatmap, the scree
//! curve, residual and predicted-versus-actual scatter plots) for whatever
//! plotting tool the caller prefers.

use csv::WriterBuilder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::collinearity::VifReport;
use crate::error::ErrorKind;
use crate::pipeline::AnalysisRun;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to create the output directory or file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write a tab-separated artifact: {0}")]
    Csv(#[from] csv::Error),
}

impl ReportError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Output
    }
}

pub const MISSING_VALUES_FILE: &str = "missing_values.tsv";
pub const VIF_INITIAL_FILE: &str = "vif_initial.tsv";
pub const VIF_REDUCED_FILE: &str = "vif_reduced.tsv";
pub const CORRELATION_FILE: &str = "correlation.tsv";
pub const EXPLAINED_VARIANCE_FILE: &str = "explained_variance.tsv";
pub const PREDICTIONS_FILE: &str = "predictions.tsv";
pub const METRICS_FILE: &str = "metrics.tsv";

fn tsv_writer(path: &Path) -> Result<csv::Writer<File>, ReportError> {
    Ok(WriterBuilder::new().delimiter(b'\t').from_path(path)?)
}

/// Writes every artifact of `run` into `dir`, creating it if needed, and
/// returns the paths written.
pub fn write_artifacts(dir: &Path, run: &AnalysisRun) -> Result<Vec<PathBuf>, ReportError> {
    fs::create_dir_all(dir)?;
    let written = vec![
        write_missing_values(&dir.join(MISSING_VALUES_FILE), run)?,
        write_vif(&dir.join(VIF_INITIAL_FILE), &run.screen.initial)?,
        write_vif(&dir.join(VIF_REDUCED_FILE), &run.screen.reduced)?,
        write_correlation(&dir.join(CORRELATION_FILE), run)?,
        write_explained_variance(&dir.join(EXPLAINED_VARIANCE_FILE), run)?,
        write_predictions(&dir.join(PREDICTIONS_FILE), run)?,
        write_metrics(&dir.join(METRICS_FILE), run)?,
    ];
    log::info!("Wrote {} artifacts to '{}'", written.len(), dir.display());
    Ok(written)
}

fn write_missing_values(path: &Path, run: &AnalysisRun) -> Result<PathBuf, ReportError> {
    let mut writer = tsv_writer(path)?;
    writer.write_record(["column", "missing_before", "missing_after"])?;
    for count in &run.prepared.missing {
        writer.write_record([
            count.column.clone(),
            count.before.to_string(),
            count.after.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}

fn write_vif(path: &Path, report: &VifReport) -> Result<PathBuf, ReportError> {
    let mut writer = tsv_writer(path)?;
    for entry in report.entries() {
        writer.serialize(entry)?;
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}

fn write_correlation(path: &Path, run: &AnalysisRun) -> Result<PathBuf, ReportError> {
    let names = run.screen.matrix.names();
    let mut writer = tsv_writer(path)?;

    let mut header = vec![String::new()];
    header.extend(names.iter().cloned());
    writer.write_record(&header)?;

    for (name, row) in names.iter().zip(run.screen.correlation.rows()) {
        let mut record = vec![name.clone()];
        record.extend(row.iter().map(|r| r.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}

fn write_explained_variance(path: &Path, run: &AnalysisRun) -> Result<PathBuf, ReportError> {
    let pca = run.transformer.pca();
    let mut writer = tsv_writer(path)?;
    writer.write_record(["component", "explained_variance_ratio", "cumulative", "retained"])?;

    let mut cumulative = 0.0;
    for (i, ratio) in pca.explained_variance_ratio().iter().enumerate() {
        cumulative += ratio;
        writer.write_record([
            format!("PC{}", i + 1),
            ratio.to_string(),
            cumulative.to_string(),
            (i < pca.n_components()).to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}

fn write_predictions(path: &Path, run: &AnalysisRun) -> Result<PathBuf, ReportError> {
    let mut writer = tsv_writer(path)?;
    let mut header = vec!["row".to_string(), "actual".to_string()];
    for outcome in &run.outcomes {
        header.push(format!("{} predicted", outcome.model.name));
        header.push(format!("{} residual", outcome.model.name));
    }
    writer.write_record(&header)?;

    let residuals: Vec<_> = run
        .outcomes
        .iter()
        .map(|o| o.residuals(&run.split.y_test))
        .collect();
    for (i, (&row, actual)) in run
        .split
        .test_indices
        .iter()
        .zip(run.split.y_test.iter())
        .enumerate()
    {
        let mut record = vec![row.to_string(), actual.to_string()];
        for (outcome, residual) in run.outcomes.iter().zip(&residuals) {
            record.push(outcome.predictions[i].to_string());
            record.push(residual[i].to_string());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}

fn write_metrics(path: &Path, run: &AnalysisRun) -> Result<PathBuf, ReportError> {
    let mut writer = tsv_writer(path)?;
    writer.write_record(["model", "r2", "mse", "mean_cv", "cv_scores"])?;
    for metrics in &run.metrics.models {
        let scores: Vec<String> = metrics.cv_scores.iter().map(|s| s.to_string()).collect();
        writer.write_record([
            metrics.model.clone(),
            metrics.r2.to_string(),
            metrics.mse.to_string(),
            metrics.mean_cv.to_string(),
            scores.join(","),
        ])?;
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}

/// The human-readable account of a run printed by the command line.
pub fn render_summary(run: &AnalysisRun) -> String {
    let mut out = String::new();

    let incomplete: Vec<_> = run.prepared.missing.iter().filter(|m| m.before > 0).collect();
    if incomplete.is_empty() {
        out.push_str("No missing values.\n");
    } else {
        out.push_str("Missing values (before -> after imputation):\n");
        for count in incomplete {
            out.push_str(&format!("  {}: {} -> {}\n", count.column, count.before, count.after));
        }
    }
    if !run.prepared.pruning.removed.is_empty() {
        out.push_str(&format!("Pruned columns: {}\n", run.prepared.pruning.removed.join(", ")));
    }

    out.push_str(&format!("\nVIF Data:\n{}\n", run.screen.initial));
    let mut removed = run.screen.dropped.clone();
    removed.extend(run.screen.eliminated.iter().map(|e| e.feature.clone()));
    if !removed.is_empty() {
        out.push_str(&format!("Dropped for collinearity: {}\n", removed.join(", ")));
        out.push_str(&format!("\nVIF Data (reduced):\n{}\n", run.screen.reduced));
    }

    let pca = run.transformer.pca();
    let retained: f64 = pca
        .explained_variance_ratio()
        .iter()
        .take(pca.n_components())
        .sum();
    out.push_str(&format!(
        "PCA: {} of {} components retained ({:.2}% of variance)\n",
        pca.n_components(),
        pca.explained_variance_ratio().len(),
        100.0 * retained
    ));
    out.push_str(&format!(
        "Split: {} training rows, {} test rows\n\n",
        run.split.train_indices.len(),
        run.split.test_indices.len()
    ));
    out.push_str(&run.metrics.to_string());
    out
}
