use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForcesError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unsupported format for {}: {reason}", .path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("failed to parse {}: {reason}", .path.display())]
    ParseFailure { path: PathBuf, reason: String },

    #[error("missing required columns: {}", .missing.join(", "))]
    SchemaViolation { missing: Vec<String> },

    #[error("column {column} has {actual} entries, expected {expected}")]
    ShapeMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate ids in dataset: {}", .0.join(", "))]
    DuplicateIds(Vec<String>),

    #[error(
        "coverage {:.1}% is below the required {:.1}% ({matched} matched of {dataset_ids} dataset ids; {union} distinct ids across both sources, {feature_ids} feature ids)",
        .coverage * 100.0,
        .threshold * 100.0
    )]
    IntegrityViolation {
        coverage: f64,
        threshold: f64,
        matched: usize,
        union: usize,
        dataset_ids: usize,
        feature_ids: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForcesError {
    /// Failures that mean the inputs disagree with each other or with the
    /// expected shape, as opposed to a file that could not be read at all.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            ForcesError::SchemaViolation { .. }
                | ForcesError::ShapeMismatch { .. }
                | ForcesError::DuplicateIds(_)
                | ForcesError::IntegrityViolation { .. }
        )
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ForcesError::ParseFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unsupported(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ForcesError::UnsupportedFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ForcesError>;
