//! Driving-force dataset and precomputed feature loading, with the
//! coverage-gated merge between them.

mod error;
mod identity;
mod row;
mod dataset;
mod features;
mod merge;
mod integrity;
pub mod manifest;

pub use error::{ForcesError, Result};
pub use identity::{content_id, derive_id, IdFallback, IdentityFields, BLANK_CELL, DERIVED_ID_LEN};
pub use row::{value_to_text, DatasetRow};
pub use dataset::{ensure_unique_ids, load_dataset, resolve_dataset_path, rows_from_range, COLUMNAR_EXTENSION, FALLBACK_EXTENSION};
pub use features::{load_features, ClusterTitles, FeatureBundle, FeaturesTable, OPTIONAL_COLUMNS, REQUIRED_COLUMNS};
pub use merge::{coverage, coverage_of, feature_columns_present, merge, CoverageReport, MergeOutcome, MergedRow, STRICT_COVERAGE_THRESHOLD};
pub use integrity::{IntegrityStatus, Verdict, PASS_COVERAGE};
