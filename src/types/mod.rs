//! Type definitions for claimdash

mod dataset;
mod error;
mod month;
mod row;

pub use dataset::*;
pub use error::*;
pub use month::Month;
pub use row::*;

/// Non-fatal load diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// Rows whose period could not be parsed were dropped
    DroppedPeriods { source_name: String, count: usize },
    /// An optional column was absent and read as 0
    MissingOptionalColumn { source_name: String, column: String },
}

impl std::fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DroppedPeriods { source_name, count } => {
                write!(f, "{}: dropped {} row(s) with unreadable period", source_name, count)
            }
            Self::MissingOptionalColumn {
                source_name,
                column,
            } => write!(f, "{}: optional column '{}' not found", source_name, column),
        }
    }
}
