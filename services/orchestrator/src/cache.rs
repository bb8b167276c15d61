//! Lazily populated, explicitly invalidated view of the loaded inputs.

use std::path::PathBuf;
use std::sync::Arc;

use forces::{load_dataset, load_features, merge, DatasetRow, FeaturesTable, IdFallback, MergeOutcome};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;

#[derive(Clone, Debug)]
pub struct DataSources {
    pub dataset_file: PathBuf,
    pub features_file: PathBuf,
    pub strict: bool,
    pub id_fallback: IdFallback,
}

/// The lock is held across the load, so concurrent callers of the same slot
/// wait for one load instead of starting their own.
///
/// Lock order: merged, columns, dataset, features. Derived slots take their
/// inputs' locks while holding their own.
type Slot<T> = Mutex<Option<Arc<T>>>;

pub struct ResultCache {
    sources: DataSources,
    dataset: Slot<Vec<DatasetRow>>,
    features: Slot<FeaturesTable>,
    merged: Slot<MergeOutcome>,
    columns: Slot<Vec<String>>,
}

impl ResultCache {
    pub fn new(sources: DataSources) -> Self {
        Self {
            sources,
            dataset: Mutex::new(None),
            features: Mutex::new(None),
            merged: Mutex::new(None),
            columns: Mutex::new(None),
        }
    }

    pub fn sources(&self) -> &DataSources {
        &self.sources
    }

    pub async fn dataset(&self) -> Result<Arc<Vec<DatasetRow>>> {
        let mut slot = self.dataset.lock().await;
        if let Some(rows) = slot.as_ref() {
            return Ok(rows.clone());
        }
        let path = self.sources.dataset_file.clone();
        let fallback = self.sources.id_fallback;
        let rows = Arc::new(tokio::task::spawn_blocking(move || load_dataset(&path, fallback)).await??);
        debug!(rows = rows.len(), "cache: dataset populated");
        *slot = Some(rows.clone());
        Ok(rows)
    }

    pub async fn features(&self) -> Result<Arc<FeaturesTable>> {
        let mut slot = self.features.lock().await;
        if let Some(table) = slot.as_ref() {
            return Ok(table.clone());
        }
        let path = self.sources.features_file.clone();
        let table = Arc::new(tokio::task::spawn_blocking(move || load_features(&path)).await??);
        debug!(entries = table.len(), "cache: features populated");
        *slot = Some(table.clone());
        Ok(table)
    }

    pub async fn merged(&self) -> Result<Arc<MergeOutcome>> {
        let mut slot = self.merged.lock().await;
        if let Some(outcome) = slot.as_ref() {
            return Ok(outcome.clone());
        }
        let rows = self.dataset().await?;
        let table = self.features().await?;
        let strict = self.sources.strict;
        let outcome = Arc::new(tokio::task::spawn_blocking(move || merge(&rows, &table, strict)).await??);
        debug!(rows = outcome.rows.len(), "cache: merged result populated");
        *slot = Some(outcome.clone());
        Ok(outcome)
    }

    /// Feature column names observed in the loaded features file.
    pub async fn feature_columns(&self) -> Result<Arc<Vec<String>>> {
        let mut slot = self.columns.lock().await;
        if let Some(columns) = slot.as_ref() {
            return Ok(columns.clone());
        }
        let columns = Arc::new(forces::feature_columns_present(&*self.features().await?));
        *slot = Some(columns.clone());
        Ok(columns)
    }

    /// Drops every slot; the next accessor reloads from disk. All four locks
    /// are held together so no derived slot is rebuilt from stale inputs.
    pub async fn invalidate(&self) {
        let mut merged = self.merged.lock().await;
        let mut columns = self.columns.lock().await;
        let mut dataset = self.dataset.lock().await;
        let mut features = self.features.lock().await;
        *merged = None;
        *columns = None;
        *dataset = None;
        *features = None;
        info!("cache: invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sources(dir: &std::path::Path) -> DataSources {
        DataSources {
            dataset_file: dir.join("scan.xlsx"),
            features_file: dir.join("features.json"),
            strict: true,
            id_fallback: IdFallback::Position,
        }
    }

    fn write_features(dir: &std::path::Path, ids: &[&str]) {
        let n = ids.len();
        let v = json!({
            "id": ids,
            "cluster_labels": vec![0; n],
            "cluster_titles": {"0": "Only"},
            "umap2d_x": vec![0.0; n],
            "umap2d_y": vec![0.0; n],
            "umap3d_x": vec![1.0; n],
            "umap3d_y": vec![1.0; n],
            "umap3d_z": vec![1.0; n]
        });
        std::fs::write(dir.join("features.json"), serde_json::to_vec(&v).unwrap()).unwrap();
    }

    fn write_features_2d(dir: &std::path::Path) {
        let v = json!({"id": ["a"], "cluster_labels": [0], "cluster_titles": {}, "umap2d_x": [0.0], "umap2d_y": [0.0]});
        std::fs::write(dir.join("features.json"), serde_json::to_vec(&v).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_features_are_loaded_once_until_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        write_features(dir.path(), &["a", "b"]);
        let cache = ResultCache::new(sources(dir.path()));

        let first = cache.features().await.unwrap();
        write_features(dir.path(), &["a", "b", "c"]);
        let second = cache.features().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 2);

        cache.invalidate().await;
        assert_eq!(cache.features().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_load() {
        let dir = tempfile::tempdir().unwrap();
        write_features(dir.path(), &["a"]);
        let cache = Arc::new(ResultCache::new(sources(dir.path())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.features().await.unwrap() })
            })
            .collect();
        let mut tables = Vec::new();
        for h in handles {
            tables.push(h.await.unwrap());
        }
        assert!(tables.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_feature_columns_include_present_optionals() {
        let dir = tempfile::tempdir().unwrap();
        write_features(dir.path(), &["a"]);
        let cache = ResultCache::new(sources(dir.path()));
        let cols = cache.feature_columns().await.unwrap();
        assert_eq!(cols.len(), 8);
        assert_eq!(cols[5], "umap3d_x");
    }

    #[tokio::test]
    async fn test_missing_dataset_surfaces_not_found() {
        let dir = tempfile::tempdir().unwrap();
        write_features(dir.path(), &["a"]);
        let cache = ResultCache::new(sources(dir.path()));
        let err = cache.merged().await.unwrap_err();
        assert!(matches!(err, crate::error::ClusteringError::Forces(forces::ForcesError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invalidate_racing_a_derived_read_leaves_no_stale_slot() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(ResultCache::new(sources(dir.path())));

        for _ in 0..20 {
            write_features(dir.path(), &["a"]);
            cache.invalidate().await;
            assert_eq!(cache.feature_columns().await.unwrap().len(), 8);

            write_features_2d(dir.path());
            let reader = {
                let cache = cache.clone();
                tokio::spawn(async move { cache.feature_columns().await.unwrap() })
            };
            cache.invalidate().await;
            reader.await.unwrap();
            assert_eq!(cache.feature_columns().await.unwrap().len(), 5);
        }
    }
}
