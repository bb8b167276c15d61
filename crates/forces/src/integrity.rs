use serde::Serialize;

use crate::error::ForcesError;
use crate::features::FeaturesTable;
use crate::merge::{coverage_of, STRICT_COVERAGE_THRESHOLD};
use crate::row::DatasetRow;

/// Coverage at or above this is a clean pass; between the strict threshold
/// and this is a warning.
pub const PASS_COVERAGE: f64 = 0.995;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Warning,
    Fail,
    Error,
}

impl Verdict {
    pub fn from_coverage(coverage: f64) -> Self {
        if coverage >= PASS_COVERAGE {
            Verdict::Pass
        } else if coverage >= STRICT_COVERAGE_THRESHOLD {
            Verdict::Warning
        } else {
            Verdict::Fail
        }
    }
}

/// Snapshot of the inputs' state. Recomputed on demand, never persisted.
#[derive(Clone, Debug, Serialize)]
pub struct IntegrityStatus {
    pub dataset_loaded: bool,
    pub features_loaded: bool,
    pub dataset_rows: usize,
    pub feature_entries: usize,
    pub matched: usize,
    pub coverage: Option<f64>,
    pub strict_mode: bool,
    pub verdict: Verdict,
    pub feature_columns: Vec<String>,
    pub errors: Vec<String>,
}

impl IntegrityStatus {
    pub fn evaluate(
        dataset: Result<&[DatasetRow], &ForcesError>,
        features: Result<&FeaturesTable, &ForcesError>,
        strict_mode: bool,
    ) -> Self {
        let mut errors = Vec::new();
        let mut status = IntegrityStatus {
            dataset_loaded: dataset.is_ok(),
            features_loaded: features.is_ok(),
            dataset_rows: 0,
            feature_entries: 0,
            matched: 0,
            coverage: None,
            strict_mode,
            verdict: Verdict::Error,
            feature_columns: Vec::new(),
            errors: Vec::new(),
        };

        match dataset {
            Ok(rows) => status.dataset_rows = rows.len(),
            Err(e) => errors.push(format!("dataset: {e}")),
        }
        match features {
            Ok(table) => {
                status.feature_entries = table.len();
                status.feature_columns = table.columns_present();
            }
            Err(e) => errors.push(format!("features: {e}")),
        }

        if let (Ok(rows), Ok(table)) = (dataset, features) {
            let report = coverage_of(rows, table);
            status.matched = report.matched;
            status.coverage = Some(report.coverage);
            status.verdict = Verdict::from_coverage(report.coverage);
            if strict_mode && report.coverage < STRICT_COVERAGE_THRESHOLD {
                errors.push(format!(
                    "coverage {:.1}% is below the strict threshold {:.1}%",
                    report.percent(),
                    STRICT_COVERAGE_THRESHOLD * 100.0
                ));
            }
        }

        status.errors = errors;
        status
    }

    /// Whether feature-dependent views may be served.
    pub fn is_servable(&self) -> bool {
        match self.verdict {
            Verdict::Pass | Verdict::Warning => true,
            Verdict::Fail => !self.strict_mode,
            Verdict::Error => false,
        }
    }
}
