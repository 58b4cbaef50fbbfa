//! # Data Loading and Table Module
//!
//! This module is the exclusive entry point for user-provided data. It reads a
//! delimited file with a header row into an ordered [`Table`] of named columns and,
//! once the table has been cleaned, freezes the selected columns into the dense
//! [`FeatureMatrix`] consumed by the statistical core.
//!
//! - Missing values: an empty field (or a configured null token) becomes `None`.
//!   The missing marker is never conflated with `0.0` or `NaN`.
//! - Row order: rows keep their file order through every step so that features
//!   stay aligned with the target.
//! - Performance: parsing is delegated to the `polars` CSV reader, with schema
//!   inference over the whole file so late non-numeric values are caught.

use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

use crate::error::ErrorKind;

/// The values of one column, either numeric (with a missing marker) or text.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(values) => values.len(),
            ColumnData::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnData::Numeric(_))
    }

    /// Number of entries holding the missing marker.
    pub fn missing_count(&self) -> usize {
        match self {
            ColumnData::Numeric(values) => values.iter().filter(|v| v.is_none()).count(),
            ColumnData::Text(values) => values.iter().filter(|v| v.is_none()).count(),
        }
    }
}

/// A named column of a [`Table`].
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Text(values),
        }
    }
}

/// An ordered sequence of uniquely named, equal-length columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
}

/// A dense, fully observed numeric matrix with one name per column.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    values: Array2<f64>,
}

/// Parsing options for [`load_table`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Field separator, e.g. `b','` or `b'\t'`.
    pub delimiter: u8,
    /// Tokens treated as missing in addition to the empty field.
    pub null_values: Vec<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            null_values: Vec::new(),
        }
    }
}

/// A comprehensive error type for all data loading and table validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("The input file contains a header but no data rows.")]
    NoDataRows,

    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),

    #[error("The column name '{0}' appears more than once.")]
    DuplicateColumn(String),

    #[error("Column '{column}' has {found} rows, but the table has {expected}.")]
    RaggedColumn {
        column: String,
        found: usize,
        expected: usize,
    },

    #[error(
        "The column '{0}' contains non-numeric data and cannot be used as a feature or target."
    )]
    NonNumericColumn(String),

    #[error(
        "Missing values remain in column '{0}' after imputation. The column is probably entirely empty; prune it before analysis."
    )]
    MissingValuesFound(String),

    #[error("Non-finite values (NaN or Infinity) were found in column '{0}'.")]
    NonFiniteValuesFound(String),

    #[error("A feature matrix needs one name per column: got {names} names for {columns} columns.")]
    NameCountMismatch { names: usize, columns: usize },
}

impl DataError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataError::PolarsError(_) | DataError::IoError(_) | DataError::NoDataRows => {
                ErrorKind::Ingestion
            }
            DataError::ColumnNotFound(_)
            | DataError::DuplicateColumn(_)
            | DataError::RaggedColumn { .. }
            | DataError::NonNumericColumn(_)
            | DataError::NameCountMismatch { .. } => ErrorKind::Schema,
            DataError::MissingValuesFound(_) | DataError::NonFiniteValuesFound(_) => {
                ErrorKind::DegenerateData
            }
        }
    }
}

impl Table {
    /// Builds a table, enforcing unique names and equal column lengths.
    pub fn new(columns: Vec<Column>) -> Result<Self, DataError> {
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(DataError::DuplicateColumn(column.name.clone()));
            }
        }
        if let Some(first) = columns.first() {
            let expected = first.data.len();
            if let Some(ragged) = columns.iter().find(|c| c.data.len() != expected) {
                return Err(DataError::RaggedColumn {
                    column: ragged.name.clone(),
                    found: ragged.data.len(),
                    expected,
                });
            }
        }
        Ok(Self { columns })
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.data.len())
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Removes a column by name, returning it if it was present.
    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let position = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(position))
    }

    /// Per-column count of missing entries, in column order.
    pub fn missing_counts(&self) -> Vec<(String, usize)> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.data.missing_count()))
            .collect()
    }

    /// Extracts a fully observed, finite numeric column as a vector.
    pub fn numeric_vector(&self, name: &str) -> Result<Array1<f64>, DataError> {
        let column = self
            .column(name)
            .ok_or_else(|| DataError::ColumnNotFound(name.to_string()))?;
        Ok(Array1::from_vec(observed_values(column)?))
    }

    /// Freezes every column except `exclude` into a [`FeatureMatrix`], preserving
    /// column and row order.
    pub fn feature_matrix(&self, exclude: &[&str]) -> Result<FeatureMatrix, DataError> {
        let selected: Vec<&Column> = self
            .columns
            .iter()
            .filter(|c| !exclude.contains(&c.name.as_str()))
            .collect();

        let n_rows = self.n_rows();
        let mut values = Array2::zeros((n_rows, selected.len()));
        for (j, column) in selected.iter().enumerate() {
            let observed = observed_values(column)?;
            values
                .column_mut(j)
                .assign(&Array1::from_vec(observed));
        }
        let names = selected.iter().map(|c| c.name.clone()).collect();
        FeatureMatrix::new(names, values)
    }
}

fn observed_values(column: &Column) -> Result<Vec<f64>, DataError> {
    let ColumnData::Numeric(values) = &column.data else {
        return Err(DataError::NonNumericColumn(column.name.clone()));
    };
    values
        .iter()
        .map(|v| match v {
            None => Err(DataError::MissingValuesFound(column.name.clone())),
            Some(x) if !x.is_finite() => Err(DataError::NonFiniteValuesFound(column.name.clone())),
            Some(x) => Ok(*x),
        })
        .collect()
}

impl FeatureMatrix {
    pub fn new(names: Vec<String>, values: Array2<f64>) -> Result<Self, DataError> {
        if names.len() != values.ncols() {
            return Err(DataError::NameCountMismatch {
                names: names.len(),
                columns: values.ncols(),
            });
        }
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(DataError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Self { names, values })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// A copy of the matrix with the given column positions removed.
    pub fn without_columns(&self, positions: &[usize]) -> FeatureMatrix {
        let keep: Vec<usize> = (0..self.n_features())
            .filter(|j| !positions.contains(j))
            .collect();
        FeatureMatrix {
            names: keep.iter().map(|&j| self.names[j].clone()).collect(),
            values: self.values.select(Axis(1), &keep),
        }
    }

    /// A copy of the matrix restricted to the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> FeatureMatrix {
        FeatureMatrix {
            names: self.names.clone(),
            values: self.values.select(Axis(0), rows),
        }
    }
}

/// Reads a delimited file with a header row into a [`Table`].
///
/// Numeric columns become [`ColumnData::Numeric`]; columns polars reads as text
/// become [`ColumnData::Text`], unless every entry is empty, in which case the
/// column is numeric and entirely missing.
pub fn load_table(path: &Path, options: &LoadOptions) -> Result<Table, DataError> {
    log::info!("Loading data from '{}'", path.display());

    let mut parse_options = CsvParseOptions::default().with_separator(options.delimiter);
    if !options.null_values.is_empty() {
        let tokens: Vec<PlSmallStr> = options
            .null_values
            .iter()
            .map(|t| PlSmallStr::from(t.as_str()))
            .collect();
        parse_options = parse_options.with_null_values(Some(NullValues::AllColumns(tokens)));
    }

    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(None)
                .with_parse_options(parse_options),
        )
        .finish()?;

    if df.height() == 0 {
        return Err(DataError::NoDataRows);
    }

    let columns = df
        .get_columns()
        .iter()
        .map(internal::convert_column)
        .collect::<Result<Vec<_>, _>>()?;
    let table = Table::new(columns)?;

    log::info!(
        "Loaded {} rows and {} columns ({} numeric).",
        table.n_rows(),
        table.n_columns(),
        table.columns().iter().filter(|c| c.data.is_numeric()).count()
    );
    Ok(table)
}

mod internal {
    use super::*;

    pub(super) fn convert_column(column: &polars::prelude::Column) -> Result<super::Column, DataError> {
        let name = column.name().to_string();
        match column.dtype() {
            DataType::Null => Ok(super::Column::numeric(name, vec![None; column.len()])),
            DataType::String => {
                let text: Vec<Option<String>> = column
                    .as_materialized_series()
                    .str()?
                    .into_iter()
                    .map(|v| v.filter(|s| !s.trim().is_empty()).map(str::to_owned))
                    .collect();
                if text.iter().all(Option::is_none) {
                    Ok(super::Column::numeric(name, vec![None; text.len()]))
                } else {
                    Ok(super::Column::text(name, text))
                }
            }
            _ => {
                let casted = column.cast(&DataType::Float64)?;
                let values: Vec<Option<f64>> = casted.as_materialized_series().f64()?.into_iter().collect();
                Ok(super::Column::numeric(name, values))
            }
        }
    }
}
