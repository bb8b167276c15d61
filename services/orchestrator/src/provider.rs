use std::path::PathBuf;

use async_trait::async_trait;
use clusters::{ClusterParams, ClusteringMethod};
use forces::{DatasetRow, FeaturesTable};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub method: ClusteringMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<PathBuf>,
}

/// A validated features table plus whatever the source reported about it.
#[derive(Debug, Clone)]
pub struct ProviderOutput {
    pub table: FeaturesTable,
    pub metadata: Value,
}

/// One way of obtaining cluster assignments for the current rows.
#[async_trait]
pub trait FeatureProvider: Send + Sync {
    async fn acquire(&self, rows: &[DatasetRow], params: &ClusterParams) -> Result<ProviderOutput>;
    fn info(&self) -> ProviderInfo;
}
