//! Removal of configured non-predictive or leakage columns.
//!
//! Names that are not present are skipped with a warning rather than treated as
//! errors, so a configuration written for one export of a dataset keeps working
//! when a column disappears from the next one.

use thiserror::Error;

use crate::data::Table;
use crate::error::ErrorKind;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PruneSummary {
    pub removed: Vec<String>,
    pub absent: Vec<String>,
}

#[derive(Error, Debug)]
pub enum PruneError {
    #[error("Column '{0}' is the prediction target and cannot be pruned.")]
    ProtectedColumn(String),
}

impl PruneError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PruneError::ProtectedColumn(_) => ErrorKind::Configuration,
        }
    }
}

/// Removes each of `columns` from the table if present.
///
/// Fails before touching the table if any of `columns` is listed in `protected`.
pub fn prune_columns(
    table: &mut Table,
    columns: &[String],
    protected: &[&str],
) -> Result<PruneSummary, PruneError> {
    if let Some(name) = columns.iter().find(|c| protected.contains(&c.as_str())) {
        return Err(PruneError::ProtectedColumn(name.clone()));
    }

    let mut summary = PruneSummary::default();
    for name in columns {
        if table.remove_column(name).is_some() {
            summary.removed.push(name.clone());
        } else if !summary.removed.contains(name) {
            log::warn!("Column '{name}' is not in the table; nothing to prune.");
            summary.absent.push(name.clone());
        }
    }
    log::info!(
        "Pruned {} columns; {} remain.",
        summary.removed.len(),
        table.n_columns()
    );
    Ok(summary)
}
