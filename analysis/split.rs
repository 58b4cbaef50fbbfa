//! Seeded train/test partitioning.
//!
//! Row indices are shuffled with a ChaCha8 generator, whose output for a given
//! seed is identical on every platform, so a seed fully determines the split.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use crate::error::ErrorKind;

#[derive(Error, Debug)]
pub enum SplitError {
    #[error("At least 2 rows are needed to form a train and a test set, found {0}.")]
    TooFewRows(usize),

    #[error("The test fraction must lie strictly between 0 and 1, got {0}.")]
    InvalidTestFraction(f64),

    #[error("The feature matrix has {x_rows} rows but the target has {y_len} values.")]
    LengthMismatch { x_rows: usize, y_len: usize },
}

impl SplitError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

/// Both sides of a partition, with the original row index of every row.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

impl Split {
    /// Materializes a partition from precomputed row indices.
    pub fn from_indices(
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        train_indices: Vec<usize>,
        test_indices: Vec<usize>,
    ) -> Self {
        Self {
            x_train: x.select(Axis(0), &train_indices),
            x_test: x.select(Axis(0), &test_indices),
            y_train: y.select(Axis(0), &train_indices),
            y_test: y.select(Axis(0), &test_indices),
            train_indices,
            test_indices,
        }
    }
}

/// `0..n` in an order determined by `seed`.
pub fn shuffled_indices(n: usize, seed: u64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);
    indices
}

/// Returns `(train, test)` row indices. The test side takes the first
/// `round(test_fraction * n)` shuffled indices, clamped so both sides are
/// non-empty.
pub fn partition_indices(
    n: usize,
    test_fraction: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), SplitError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(SplitError::InvalidTestFraction(test_fraction));
    }
    if n < 2 {
        return Err(SplitError::TooFewRows(n));
    }

    let n_test = ((test_fraction * n as f64).round() as usize).clamp(1, n - 1);
    let mut indices = shuffled_indices(n, seed);
    let train = indices.split_off(n_test);
    log::debug!("Split {n} rows into {} train and {n_test} test (seed {seed})", train.len());
    Ok((train, indices))
}

/// Partitions features and target rows into train and test sets.
pub fn split(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    test_fraction: f64,
    seed: u64,
) -> Result<Split, SplitError> {
    if x.nrows() != y.len() {
        return Err(SplitError::LengthMismatch {
            x_rows: x.nrows(),
            y_len: y.len(),
        });
    }
    let (train, test) = partition_indices(x.nrows(), test_fraction, seed)?;
    Ok(Split::from_indices(x, y, train, test))
}
