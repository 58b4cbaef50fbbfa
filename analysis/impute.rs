//! Median imputation of missing numeric entries.

use crate::data::{ColumnData, Table};

/// What imputation did to one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnFill {
    pub column: String,
    pub median: f64,
    pub replaced: usize,
}

/// Outcome of [`impute_median`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImputationSummary {
    pub filled: Vec<ColumnFill>,
    /// Numeric columns with no observed value, left untouched.
    pub unfilled: Vec<String>,
}

/// Median of the observed values. `NaN` entries do not contribute.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Replaces every missing entry of each numeric column with the median of that
/// column's observed values.
///
/// Columns without missing entries and text columns are left alone. A column
/// with no observed value at all is skipped with a warning and reported in
/// [`ImputationSummary::unfilled`].
pub fn impute_median(table: &mut Table) -> ImputationSummary {
    let mut summary = ImputationSummary::default();

    for column in table.columns_mut() {
        let ColumnData::Numeric(values) = &mut column.data else {
            continue;
        };
        let missing = values.iter().filter(|v| v.is_none()).count();
        if missing == 0 {
            continue;
        }

        let observed: Vec<f64> = values.iter().flatten().copied().collect();
        let Some(fill) = median(&observed) else {
            log::warn!(
                "Column '{}' has no observed values; leaving its {} missing entries unfilled.",
                column.name,
                missing
            );
            summary.unfilled.push(column.name.clone());
            continue;
        };

        for value in values.iter_mut().filter(|v| v.is_none()) {
            *value = Some(fill);
        }
        log::debug!(
            "Imputed {} missing entries in '{}' with median {:.6}",
            missing,
            column.name,
            fill
        );
        summary.filled.push(ColumnFill {
            column: column.name.clone(),
            median: fill,
            replaced: missing,
        });
    }

    summary
}
