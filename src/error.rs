use thiserror::Error;

/// Rejected configuration. Raised before any comparison runs; values are
/// never clamped into range.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("threshold must be a finite value in [0, 100], got {0}")]
    ThresholdOutOfRange(f64),

    #[error("minimum_lines must be >= 0, got {0}")]
    NegativeMinimumLines(i64),

    #[error("trace separator must not be empty")]
    EmptySeparator,

    #[error("invalid header pattern '{pattern}': {reason}")]
    InvalidHeaderPattern { pattern: String, reason: String },

    #[error("unknown label mode '{0}' (expected 'file' or 'dir')")]
    UnknownLabelMode(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// A single trace that cannot take part in a batch. Batches log and skip it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("trace '{0}' is blank")]
    Blank(String),
}

impl TraceError {
    /// Label of the offending trace.
    pub fn label(&self) -> &str {
        match self {
            TraceError::Blank(label) => label,
        }
    }
}
