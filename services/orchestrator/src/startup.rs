use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use forces::manifest::{generate_or_validate, ManifestInputs};
use forces::{resolve_dataset_path, ForcesError, IntegrityStatus};
use tracing::{error, info, warn};

use crate::cache::ResultCache;
use crate::config::AppConfig;
use crate::error::ClusteringError;

#[derive(Debug)]
pub struct StartupOutcome {
    pub status: IntegrityStatus,
    /// False when clustering views must stay empty.
    pub servable: bool,
}

/// Loads both inputs through the cache and checks them against each other.
///
/// Strict mode turns schema-class and coverage failures into an error; in
/// non-strict mode they are logged and the outcome is marked unservable.
pub async fn integrity_check(cfg: &AppConfig, cache: &ResultCache) -> Result<StartupOutcome> {
    let dataset = cache.dataset().await;
    let features = cache.features().await;

    let status = IntegrityStatus::evaluate(
        as_forces(&dataset)?.map(|rows| rows.as_slice()),
        as_forces(&features)?,
        cfg.strict_features,
    );
    for e in &status.errors {
        warn!("integrity: {e}");
    }

    let fatal = [dataset.as_ref().err(), features.as_ref().err()]
        .into_iter()
        .flatten()
        .find(|e| matches!(e, ClusteringError::Forces(f) if f.is_fatal_at_startup()));
    if let Some(e) = fatal {
        if cfg.strict_features {
            error!("integrity: {e}");
            bail!("startup integrity check failed: {e}");
        }
        warn!("integrity: continuing without clustering views (STRICT_FEATURES is off)");
    }

    let (Ok(rows), Ok(table)) = (&dataset, &features) else {
        error!(verdict = ?status.verdict, "integrity: inputs unavailable, clustering views left empty");
        return Ok(StartupOutcome { status, servable: false });
    };

    match cache.merged().await {
        Ok(outcome) => {
            info!(
                verdict = ?status.verdict,
                rows = outcome.rows.len(),
                coverage_pct = outcome.coverage.percent(),
                "integrity: merged"
            );
            if let Err(e) = write_manifest(cfg, rows.len(), table.len(), outcome.coverage).await {
                warn!("integrity: manifest not updated: {e:#}");
            }
        }
        Err(ClusteringError::Forces(e @ ForcesError::IntegrityViolation { .. })) => {
            error!("integrity: {e}");
            bail!("startup integrity check failed: {e}");
        }
        Err(e) => return Err(e).context("merging dataset with features"),
    }

    let servable = status.is_servable();
    Ok(StartupOutcome { status, servable })
}

async fn write_manifest(cfg: &AppConfig, rows_dataset: usize, rows_features: usize, coverage: forces::CoverageReport) -> Result<()> {
    let cfg = cfg.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let dataset_file = resolve_dataset_path(&cfg.dataset_file)?;
        let inputs = ManifestInputs {
            dataset_file: &dataset_file,
            features_file: &cfg.features_file,
            rows_dataset,
            rows_features,
            coverage: &coverage,
            strict_mode: cfg.strict_features,
            app_version: &cfg.app_version,
        };
        let (manifest, reused) = generate_or_validate(&cfg.manifest_file, &inputs)?;
        info!(reused, coverage_pct = manifest.coverage_pct, "integrity: manifest checked");
        Ok(())
    })
    .await?
}

fn as_forces<T>(r: &std::result::Result<Arc<T>, ClusteringError>) -> Result<std::result::Result<&T, &ForcesError>> {
    match r {
        Ok(v) => Ok(Ok(v.as_ref())),
        Err(ClusteringError::Forces(e)) => Ok(Err(e)),
        Err(e) => Err(anyhow!("loading inputs: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forces::Verdict;
    use std::collections::HashMap;

    fn config(dir: &std::path::Path, strict: bool) -> AppConfig {
        let env: HashMap<&str, String> = [
            ("DATASET_FILE", dir.join("scan.parquet").display().to_string()),
            ("FEATURES_FILE", dir.join("features.json").display().to_string()),
            ("MANIFEST_FILE", dir.join("features.manifest.json").display().to_string()),
            ("STRICT_FEATURES", strict.to_string()),
        ]
        .into_iter()
        .collect();
        AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap()
    }

    fn broken_features(dir: &std::path::Path) {
        std::fs::write(
            dir.join("features.json"),
            r#"{"id":["a"],"cluster_labels":[0],"cluster_titles":{},"umap2d_x":[0.0]}"#,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_schema_violation_aborts_in_strict_mode() {
        let dir = tempfile::tempdir().unwrap();
        broken_features(dir.path());
        let cfg = config(dir.path(), true);
        let cache = ResultCache::new(cfg.data_sources());
        let err = integrity_check(&cfg, &cache).await.unwrap_err();
        assert!(err.to_string().contains("umap2d_y"), "{err}");
    }

    #[tokio::test]
    async fn test_schema_violation_degrades_when_not_strict() {
        let dir = tempfile::tempdir().unwrap();
        broken_features(dir.path());
        let cfg = config(dir.path(), false);
        let cache = ResultCache::new(cfg.data_sources());
        let outcome = integrity_check(&cfg, &cache).await.unwrap();
        assert!(!outcome.servable);
        assert_eq!(outcome.status.verdict, Verdict::Error);
        assert_eq!(outcome.status.errors.len(), 2);
        assert!(!dir.path().join("features.manifest.json").exists());
    }

    #[tokio::test]
    async fn test_missing_files_leave_views_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), true);
        let cache = ResultCache::new(cfg.data_sources());
        let outcome = integrity_check(&cfg, &cache).await.unwrap();
        assert!(!outcome.servable);
        assert!(!outcome.status.dataset_loaded);
        assert!(outcome.status.errors[0].contains("scan.xlsx"));
    }
}
