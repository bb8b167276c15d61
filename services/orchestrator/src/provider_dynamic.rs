use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clusters::{ClusterParams, ClusteringMethod};
use forces::{DatasetRow, FeaturesTable};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::Result;
use crate::process::{read_json, write_json, Handoff, ProcessRunner};
use crate::provider::{FeatureProvider, ProviderInfo, ProviderOutput};

#[derive(Debug, Serialize)]
struct DynamicInput<'a> {
    id: &'a str,
    title: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<&'a str>,
    original_index: usize,
}

impl<'a> DynamicInput<'a> {
    fn from_row(original_index: usize, row: &'a DatasetRow) -> Self {
        Self {
            id: &row.id,
            title: row.title.as_deref().unwrap_or_default(),
            text: row.text.as_deref().unwrap_or_default(),
            tags: row.tags.as_deref(),
            original_index,
        }
    }
}

/// Runs a fresh embedding and clustering pass over the given rows.
pub struct DynamicComputeProvider {
    runner: Arc<ProcessRunner>,
    script: PathBuf,
    work_dir: PathBuf,
}

impl DynamicComputeProvider {
    pub fn new(runner: Arc<ProcessRunner>, script: PathBuf, work_dir: PathBuf) -> Self {
        Self {
            runner,
            script,
            work_dir,
        }
    }
}

#[async_trait]
impl FeatureProvider for DynamicComputeProvider {
    async fn acquire(&self, rows: &[DatasetRow], params: &ClusterParams) -> Result<ProviderOutput> {
        let mut handoff = Handoff::new(&self.work_dir);
        let input_path = handoff.file("input.json");
        let output_path = handoff.file("output.json");

        // Package rows
        let input: Vec<DynamicInput<'_>> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| DynamicInput::from_row(i, row))
            .collect();
        write_json(&input_path, &input).await?;

        let mut args: Vec<OsString> = vec![
            "--input".into(),
            input_path.clone().into(),
            "--output".into(),
            output_path.clone().into(),
        ];
        if let Some(n) = params.target_clusters {
            args.push("--target-clusters".into());
            args.push(n.to_string().into());
        }
        if let Some(seed) = params.random_seed {
            args.push("--random-state".into());
            args.push(seed.to_string().into());
        }

        // Run compute
        let out = self.runner.run(&self.script, &args, &[]).await?;
        if !out.status.success() {
            return Err(self.runner.failure(&self.script, &out, None));
        }

        let value: Value = read_json(&output_path).await?;
        let table = FeaturesTable::from_json(value, &output_path)?;
        info!(
            token = handoff.token(),
            rows = rows.len(),
            entries = table.len(),
            n_clusters = ?table.n_clusters,
            silhouette = ?table.silhouette_score,
            "dynamic: clustering received"
        );

        Ok(ProviderOutput {
            metadata: json!({
                "source": "dynamic",
                "n_clusters": table.n_clusters,
                "silhouette_score": table.silhouette_score,
                "resolution_used": table.resolution_used,
            }),
            table,
        })
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "dynamic-compute".to_string(),
            method: ClusteringMethod::Dynamic,
            script: Some(self.script.clone()),
        }
    }
}
