use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ForcesError, Result};
use crate::features::{FeatureBundle, FeaturesTable};
use crate::row::DatasetRow;

/// Minimum coverage a strict merge accepts.
pub const STRICT_COVERAGE_THRESHOLD: f64 = 0.95;

/// A dataset row with its feature columns, when the features table knows the id.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MergedRow {
    #[serde(flatten)]
    pub row: DatasetRow,
    #[serde(flatten)]
    pub features: Option<FeatureBundle>,
}

impl MergedRow {
    pub fn has_features(&self) -> bool {
        self.features.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CoverageReport {
    pub dataset_ids: usize,
    pub feature_ids: usize,
    pub matched: usize,
    pub union: usize,
    /// matched / dataset_ids, 1.0 for an empty dataset.
    pub coverage: f64,
}

impl CoverageReport {
    pub fn percent(&self) -> f64 {
        self.coverage * 100.0
    }

    pub fn unmatched(&self) -> usize {
        self.dataset_ids - self.matched
    }
}

#[derive(Clone, Debug)]
pub struct MergeOutcome {
    pub rows: Vec<MergedRow>,
    pub coverage: CoverageReport,
}

pub fn coverage(dataset_ids: &HashSet<&str>, feature_ids: &HashSet<&str>) -> CoverageReport {
    let matched = dataset_ids.intersection(feature_ids).count();
    let union = dataset_ids.len() + feature_ids.len() - matched;
    let coverage = if dataset_ids.is_empty() {
        1.0
    } else {
        matched as f64 / dataset_ids.len() as f64
    };
    CoverageReport {
        dataset_ids: dataset_ids.len(),
        feature_ids: feature_ids.len(),
        matched,
        union,
        coverage,
    }
}

/// Coverage of `dataset` by `features`, without merging.
pub fn coverage_of(dataset: &[DatasetRow], features: &FeaturesTable) -> CoverageReport {
    let dataset_ids: HashSet<&str> = dataset.iter().map(|r| r.id.as_str()).collect();
    let feature_ids: HashSet<&str> = features.id.iter().map(String::as_str).collect();
    coverage(&dataset_ids, &feature_ids)
}

/// Required columns plus the optional ones `features` carries.
pub fn feature_columns_present(features: &FeaturesTable) -> Vec<String> {
    features.columns_present()
}

/// Left join of `dataset` with `features` on id.
///
/// Every dataset row appears once, in dataset order. Strict mode fails the
/// whole merge when coverage is below [`STRICT_COVERAGE_THRESHOLD`]. When a
/// feature id repeats, its last occurrence wins.
pub fn merge(dataset: &[DatasetRow], features: &FeaturesTable, strict: bool) -> Result<MergeOutcome> {
    let report = coverage_of(dataset, features);

    // Strict gate
    if strict && report.coverage < STRICT_COVERAGE_THRESHOLD {
        return Err(ForcesError::IntegrityViolation {
            coverage: report.coverage,
            threshold: STRICT_COVERAGE_THRESHOLD,
            matched: report.matched,
            union: report.union,
            dataset_ids: report.dataset_ids,
            feature_ids: report.feature_ids,
        });
    }

    // Index features by id
    let mut lookup: HashMap<&str, usize> = HashMap::with_capacity(features.len());
    let mut duplicates = 0usize;
    for (i, id) in features.id.iter().enumerate() {
        if lookup.insert(id.as_str(), i).is_some() {
            duplicates += 1;
        }
    }
    if duplicates > 0 {
        warn!(duplicates, "merge: duplicate feature ids, keeping last occurrence");
    }

    // Left join
    let rows: Vec<MergedRow> = dataset
        .iter()
        .map(|row| MergedRow {
            row: row.clone(),
            features: lookup.get(row.id.as_str()).and_then(|&i| features.bundle(i)),
        })
        .collect();

    if report.unmatched() > 0 {
        warn!(
            unmatched = report.unmatched(),
            coverage_pct = report.percent(),
            "merge: rows without features are left without feature columns"
        );
    }
    info!(
        rows = rows.len(),
        matched = report.matched,
        coverage_pct = report.percent(),
        strict,
        "merge: done"
    );

    Ok(MergeOutcome { rows, coverage: report })
}
