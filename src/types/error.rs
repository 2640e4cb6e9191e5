use thiserror::Error;

use super::Month;

/// claimdash error types
#[derive(Error, Debug)]
pub enum DashError {
    /// A required column is absent from a source
    #[error("schema error: {source_name} is missing required column '{column}'")]
    Schema { source_name: String, column: String },

    /// A cell failed numeric coercion
    #[error("data format error: {source_name} line {line}, column '{column}': cannot read '{value}'")]
    DataFormat {
        source_name: String,
        line: u64,
        column: String,
        value: String,
    },

    /// Filter window with start after end
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange { start: Month, end: Month },

    /// Dataset name not present in the configuration
    #[error("unknown dataset: {0}")]
    UnknownDataset(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// File I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader error
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl DashError {
    /// Whether this error means the data file itself is unusable
    pub fn is_invalid_data(&self) -> bool {
        matches!(self, Self::Schema { .. } | Self::DataFormat { .. } | Self::Csv(_))
    }

    /// User-facing message; unusable data files are flagged as such
    pub fn describe(&self) -> String {
        if self.is_invalid_data() {
            format!("data file invalid: {}", self)
        } else {
            self.to_string()
        }
    }
}

/// Result type alias for claimdash
pub type Result<T> = std::result::Result<T, DashError>;
