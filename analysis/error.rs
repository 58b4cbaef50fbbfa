//! The error taxonomy shared by every stage of the pipeline.
//!
//! Each module owns a `thiserror` enum describing its own failures. Those enums
//! all map onto one of the coarse [`ErrorKind`] categories below, which is what the
//! command-line front end reports to the user.

use std::fmt;

/// Coarse classification of a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The input file is missing, unreadable or unparseable.
    Ingestion,
    /// An expected column is absent, duplicated, or of the wrong type.
    Schema,
    /// The data cannot support the requested computation (zero variance,
    /// all-missing columns, singular systems, too few rows).
    DegenerateData,
    /// A threshold, fraction, fold count or penalty is out of range.
    Configuration,
    /// Writing a report artifact failed.
    Output,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Ingestion => "ingestion error",
            ErrorKind::Schema => "schema error",
            ErrorKind::DegenerateData => "degenerate data",
            ErrorKind::Configuration => "configuration error",
            ErrorKind::Output => "output error",
        };
        f.write_str(label)
    }
}
