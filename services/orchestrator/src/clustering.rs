use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clusters::{build_clusters, coordinate_map, ClusterParams, ClusterResult, ClusteringMethod, Coordinates, QualitySummary};
use forces::DatasetRow;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::cache::ResultCache;
use crate::config::{AppConfig, FixedSource};
use crate::error::Result;
use crate::process::ProcessRunner;
use crate::provider::{FeatureProvider, ProviderInfo};
use crate::provider_cached::CachedFeaturesProvider;
use crate::provider_dynamic::DynamicComputeProvider;
use crate::provider_fixed::FixedHelperProvider;

#[derive(Debug, Clone, Serialize)]
pub struct ClusteringMetadata {
    pub provider: ProviderInfo,
    pub generated_at: DateTime<Utc>,
    pub rows: usize,
    pub entries: usize,
    pub details: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusteringOutput {
    pub clusters: Vec<ClusterResult>,
    pub coordinates: BTreeMap<String, Coordinates>,
    pub quality_summary: QualitySummary,
    pub metadata: ClusteringMetadata,
}

pub struct ClusteringOrchestrator {
    provider: Box<dyn FeatureProvider>,
}

impl ClusteringOrchestrator {
    pub fn new(provider: Box<dyn FeatureProvider>) -> Self {
        Self { provider }
    }

    /// Picks the provider for the configured mode.
    pub fn from_config(cfg: &AppConfig, cache: Arc<ResultCache>) -> Self {
        let runner = || Arc::new(ProcessRunner::new(cfg.python_bin.clone(), cfg.process_timeout, cfg.max_concurrent));
        let provider: Box<dyn FeatureProvider> = match (cfg.clustering_mode, cfg.fixed_source) {
            (ClusteringMethod::Fixed, FixedSource::Cache) => Box::new(CachedFeaturesProvider::new(cache)),
            (ClusteringMethod::Fixed, FixedSource::Helper) => Box::new(FixedHelperProvider::new(
                runner(),
                cfg.fixed_helper_script.clone(),
                cfg.work_dir.clone(),
                cfg.features_file.clone(),
                cfg.strict_features,
            )),
            (ClusteringMethod::Dynamic, _) => Box::new(DynamicComputeProvider::new(
                runner(),
                cfg.dynamic_script.clone(),
                cfg.work_dir.clone(),
            )),
        };
        Self::new(provider)
    }

    pub fn info(&self) -> ProviderInfo {
        self.provider.info()
    }

    pub async fn compute_clustering(&self, rows: &[DatasetRow], params: &ClusterParams) -> Result<ClusteringOutput> {
        let info = self.provider.info();
        info!(provider = %info.name, rows = rows.len(), "clustering: acquiring features");

        let acquired = self.provider.acquire(rows, params).await?;
        let table = acquired.table;

        let clusters = build_clusters(&table, info.method, params);
        let quality_summary = QualitySummary::from_clusters(&clusters, table.silhouette_score, info.method);
        let coordinates = coordinate_map(&table);

        info!(
            provider = %info.name,
            clusters = quality_summary.cluster_count,
            points = quality_summary.point_count,
            silhouette = quality_summary.silhouette,
            "clustering: done"
        );

        Ok(ClusteringOutput {
            clusters,
            coordinates,
            quality_summary,
            metadata: ClusteringMetadata {
                provider: info,
                generated_at: Utc::now(),
                rows: rows.len(),
                entries: table.len(),
                details: acquired.metadata,
            },
        })
    }
}

pub fn params_from_config(cfg: &AppConfig) -> ClusterParams {
    match cfg.clustering_mode {
        ClusteringMethod::Fixed => ClusterParams::default(),
        ClusteringMethod::Dynamic => ClusterParams {
            target_clusters: cfg.target_clusters,
            random_seed: Some(cfg.random_seed),
            resolution: None,
        },
    }
}
