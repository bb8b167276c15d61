use std::sync::Arc;

use async_trait::async_trait;
use clusters::{ClusterParams, ClusteringMethod};
use forces::DatasetRow;
use serde_json::json;

use crate::cache::ResultCache;
use crate::error::Result;
use crate::provider::{FeatureProvider, ProviderInfo, ProviderOutput};

/// Serves the features file already held by the cache; nothing is spawned.
pub struct CachedFeaturesProvider {
    cache: Arc<ResultCache>,
}

impl CachedFeaturesProvider {
    pub fn new(cache: Arc<ResultCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl FeatureProvider for CachedFeaturesProvider {
    async fn acquire(&self, _rows: &[DatasetRow], _params: &ClusterParams) -> Result<ProviderOutput> {
        let table = self.cache.features().await?;
        Ok(ProviderOutput {
            table: (*table).clone(),
            metadata: json!({
                "source": "cache",
                "features_file": self.cache.sources().features_file,
            }),
        })
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "cached-features".to_string(),
            method: ClusteringMethod::Fixed,
            script: None,
        }
    }
}
