mod config;
mod error;
mod cache;
mod process;
pub mod provider;
mod provider_fixed;
mod provider_cached;
mod provider_dynamic;
pub mod clustering;
mod startup;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cache::ResultCache;
use crate::clustering::{params_from_config, ClusteringOrchestrator, ClusteringOutput};
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env()?;
    info!(
        dataset=%cfg.dataset_file.display(),
        features=%cfg.features_file.display(),
        strict=cfg.strict_features,
        mode=cfg.clustering_mode.as_str(),
        "orchestrator: starting"
    );

    tokio::fs::create_dir_all(&cfg.work_dir)
        .await
        .with_context(|| format!("Failed to create work dir {}", cfg.work_dir.display()))?;

    let cache = Arc::new(ResultCache::new(cfg.data_sources()));

    // --- Startup integrity check (fatal in strict mode) ---
    let outcome = startup::integrity_check(&cfg, &cache).await?;
    if !outcome.servable {
        warn!(verdict = ?outcome.status.verdict, "orchestrator: clustering skipped");
        return Ok(());
    }

    let columns = cache.feature_columns().await?;
    info!(columns = ?columns, "orchestrator: feature columns");

    let orchestrator = ClusteringOrchestrator::from_config(&cfg, cache.clone());
    info!(provider = ?orchestrator.info(), "orchestrator: provider selected");
    let rows = cache.dataset().await?;
    let output = orchestrator
        .compute_clustering(&rows, &params_from_config(&cfg))
        .await
        .context("Clustering failed")?;

    write_output(&cfg.clusters_output, &output).await?;
    info!(
        path=%cfg.clusters_output.display(),
        clusters=output.quality_summary.cluster_count,
        provider=%output.metadata.provider.name,
        "orchestrator: clusters written"
    );
    Ok(())
}

async fn write_output(path: &Path, output: &ClusteringOutput) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(output)?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
