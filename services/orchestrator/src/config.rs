use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clusters::ClusteringMethod;
use forces::IdFallback;

use crate::cache::DataSources;

/// Where fixed-mode clustering gets its features.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FixedSource {
    Helper,
    Cache,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub dataset_file: PathBuf,
    pub features_file: PathBuf,
    pub strict_features: bool,
    pub id_fallback: IdFallback,

    pub clustering_mode: ClusteringMethod,
    pub fixed_source: FixedSource,
    pub python_bin: String,
    pub fixed_helper_script: PathBuf,
    pub dynamic_script: PathBuf,
    pub work_dir: PathBuf,
    pub process_timeout: Duration,
    pub max_concurrent: usize,
    pub target_clusters: Option<usize>,
    pub random_seed: u64,

    pub manifest_file: PathBuf,
    pub clusters_output: PathBuf,
    pub app_version: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let strict_features = lookup("STRICT_FEATURES").map(|v| flag(&v)).unwrap_or(true);

        let id_fallback = match lookup("ID_FALLBACK") {
            None => IdFallback::default(),
            Some(v) => IdFallback::parse(&v)
                .with_context(|| format!("ID_FALLBACK must be `position` or `random`, got {v:?}"))?,
        };
        let clustering_mode = match lookup("CLUSTERING_MODE") {
            None => ClusteringMethod::Fixed,
            Some(v) => ClusteringMethod::parse(&v)
                .with_context(|| format!("CLUSTERING_MODE must be `fixed` or `dynamic`, got {v:?}"))?,
        };
        let fixed_source = match var("FIXED_FEATURES_SOURCE", "helper").trim().to_ascii_lowercase().as_str() {
            "helper" => FixedSource::Helper,
            "cache" => FixedSource::Cache,
            other => bail!("FIXED_FEATURES_SOURCE must be `helper` or `cache`, got {other:?}"),
        };

        let timeout_secs: u64 = number(&lookup, "PROCESS_TIMEOUT_SECS")?.unwrap_or(600);
        let max_concurrent: usize = number(&lookup, "CLUSTERING_MAX_CONCURRENT")?.unwrap_or(2);
        if timeout_secs == 0 {
            bail!("PROCESS_TIMEOUT_SECS must be greater than 0");
        }
        if max_concurrent == 0 {
            bail!("CLUSTERING_MAX_CONCURRENT must be greater than 0");
        }
        let target_clusters: Option<usize> = number(&lookup, "TARGET_CLUSTERS")?;
        if target_clusters == Some(0) {
            bail!("TARGET_CLUSTERS must be greater than 0 when set");
        }

        Ok(Self {
            dataset_file: var("DATASET_FILE", "data/ORION_Scanning_DB_Updated.parquet").into(),
            features_file: var("FEATURES_FILE", "data/precomputed_features.json").into(),
            strict_features,
            id_fallback,
            clustering_mode,
            fixed_source,
            python_bin: var("PYTHON_BIN", "python3"),
            fixed_helper_script: var("FIXED_HELPER_SCRIPT", "backend/orion/orion_fixed_bridge.py").into(),
            dynamic_script: var("DYNAMIC_SCRIPT", "backend/orion/orion_preprocessing.py").into(),
            work_dir: lookup("CLUSTERING_WORK_DIR").map(PathBuf::from).unwrap_or_else(std::env::temp_dir),
            process_timeout: Duration::from_secs(timeout_secs),
            max_concurrent,
            target_clusters,
            random_seed: number(&lookup, "RANDOM_SEED")?.unwrap_or(42),
            manifest_file: var("MANIFEST_FILE", "data/features.manifest.json").into(),
            clusters_output: var("CLUSTERS_OUTPUT", "data/clusters.json").into(),
            app_version: var("APP_VERSION", "unknown"),
        })
    }

    pub fn data_sources(&self) -> DataSources {
        DataSources {
            dataset_file: self.dataset_file.clone(),
            features_file: self.features_file.clone(),
            strict: self.strict_features,
            id_fallback: self.id_fallback,
        }
    }
}

fn flag(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn number<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{key} must be a non-negative integer, got {v:?}")),
    }
}
