use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clusters::{ClusterParams, ClusteringMethod};
use forces::{DatasetRow, FeaturesTable};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::Result;
use crate::process::{read_json, write_json, Handoff, ProcessRunner};
use crate::provider::{FeatureProvider, ProviderInfo, ProviderOutput};

/// Env var carrying the request descriptor path; the bridge's argv only
/// accepts `--output`, `--mode` and `--verbose`.
pub const REQUEST_FILE_ENV: &str = "FIXED_REQUEST_FILE";

#[derive(Debug, Serialize)]
struct FixedRequest<'a> {
    mode: &'static str,
    features_file: &'a PathBuf,
    strict: bool,
    requested_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct FixedResult {
    success: bool,
    #[serde(default)]
    features: Option<Value>,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Fetches the stored cluster assignment through the fixed bridge script.
pub struct FixedHelperProvider {
    runner: Arc<ProcessRunner>,
    script: PathBuf,
    work_dir: PathBuf,
    features_file: PathBuf,
    strict: bool,
}

impl FixedHelperProvider {
    pub fn new(runner: Arc<ProcessRunner>, script: PathBuf, work_dir: PathBuf, features_file: PathBuf, strict: bool) -> Self {
        Self {
            runner,
            script,
            work_dir,
            features_file,
            strict,
        }
    }
}

#[async_trait]
impl FeatureProvider for FixedHelperProvider {
    async fn acquire(&self, _rows: &[DatasetRow], _params: &ClusterParams) -> Result<ProviderOutput> {
        let mut handoff = Handoff::new(&self.work_dir);
        let request_path = handoff.file("request.json");
        let output_path = handoff.file("output.json");

        // Request descriptor
        write_json(
            &request_path,
            &FixedRequest {
                mode: "clusters",
                features_file: &self.features_file,
                strict: self.strict,
                requested_at: Utc::now(),
            },
        )
        .await?;

        // Run bridge
        let args: Vec<OsString> = vec![
            "--output".into(),
            output_path.clone().into(),
            "--mode".into(),
            "clusters".into(),
        ];
        let envs: [(&str, OsString); 3] = [
            ("FEATURES_FILE", self.features_file.clone().into()),
            ("STRICT_FEATURES", OsString::from(if self.strict { "true" } else { "false" })),
            (REQUEST_FILE_ENV, request_path.clone().into()),
        ];
        let out = self.runner.run(&self.script, &args, &envs).await?;

        // Read result
        if !out.status.success() {
            let reported = read_json::<FixedResult>(&output_path).await.ok().and_then(|r| r.error);
            return Err(self.runner.failure(&self.script, &out, reported));
        }

        let result: FixedResult = read_json(&output_path).await?;
        if !result.success {
            let reported = result.error.unwrap_or_else(|| "helper reported failure".to_string());
            return Err(self.runner.failure(&self.script, &out, Some(reported)));
        }
        let Some(features) = result.features else {
            return Err(self.runner.failure(&self.script, &out, Some("result has no features".to_string())));
        };

        let table = FeaturesTable::from_json(features, &output_path)?;
        info!(token = handoff.token(), entries = table.len(), "fixed: features received");
        Ok(ProviderOutput {
            table,
            metadata: result.metadata.unwrap_or_else(|| Value::Object(Default::default())),
        })
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "fixed-helper".to_string(),
            method: ClusteringMethod::Fixed,
            script: Some(self.script.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClusteringError;
    use crate::process::tests::{leftovers, script};
    use std::time::Duration;

    const FEATURES: &str = r#"{"id":["a","b"],"cluster_labels":[0,1],"cluster_titles":{"0":"Zero","1":"One"},"umap2d_x":[0.0,1.0],"umap2d_y":[0.0,1.0]}"#;

    fn provider(dir: &std::path::Path, body: &str) -> FixedHelperProvider {
        provider_with_timeout(dir, body, Duration::from_secs(10))
    }

    fn provider_with_timeout(dir: &std::path::Path, body: &str, timeout: Duration) -> FixedHelperProvider {
        let work = dir.join("work");
        std::fs::create_dir_all(&work).unwrap();
        let features_file = dir.join("features.json");
        std::fs::write(&features_file, FEATURES).unwrap();
        FixedHelperProvider::new(
            Arc::new(ProcessRunner::new("sh", timeout, 2)),
            script(dir, "bridge.sh", body),
            work,
            features_file,
            true,
        )
    }

    #[tokio::test]
    async fn test_successful_helper_run() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"
[ "$1" = "--output" ] && [ "$3" = "--mode" ] && [ "$4" = "clusters" ] && [ $# -eq 4 ] || exit 7
grep -q '"mode":"clusters"' "$FIXED_REQUEST_FILE" || exit 8
[ "$STRICT_FEATURES" = "true" ] || exit 9
printf '{"success": true, "features": %s, "metadata": {"source": "bridge"}}' "$(cat "$FEATURES_FILE")" > "$2"
"#;
        let p = provider(dir.path(), body);
        let out = p.acquire(&[], &ClusterParams::default()).await.unwrap();
        assert_eq!(out.table.id, vec!["a", "b"]);
        assert_eq!(out.metadata["source"], "bridge");
        assert!(leftovers(&dir.path().join("work")).is_empty());
    }

    #[tokio::test]
    async fn test_reported_failure() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(dir.path(), "printf '{\"success\": false, \"error\": \"features file missing\"}' > \"$2\"\n");
        match p.acquire(&[], &ClusterParams::default()).await {
            Err(ClusteringError::ExternalProcess { reported, .. }) => {
                assert_eq!(reported.as_deref(), Some("features file missing"));
            }
            other => panic!("expected ExternalProcess, got {other:?}"),
        }
        assert!(leftovers(&dir.path().join("work")).is_empty());
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(dir.path(), "echo 'bridge exploded' >&2\nexit 2\n");
        match p.acquire(&[], &ClusterParams::default()).await {
            Err(ClusteringError::ExternalProcess { stderr, reported, .. }) => {
                assert!(stderr.contains("bridge exploded"));
                assert_eq!(reported, None);
            }
            other => panic!("expected ExternalProcess, got {other:?}"),
        }
        assert!(leftovers(&dir.path().join("work")).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_features_from_helper_are_schema_errors() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider(dir.path(), "printf '{\"success\": true, \"features\": {\"id\": []}}' > \"$2\"\n");
        assert!(matches!(
            p.acquire(&[], &ClusterParams::default()).await,
            Err(ClusteringError::Forces(forces::ForcesError::SchemaViolation { .. }))
        ));
    }

    #[tokio::test]
    async fn test_timeout_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let p = provider_with_timeout(dir.path(), "sleep 5\n", Duration::from_millis(200));
        assert!(matches!(
            p.acquire(&[], &ClusterParams::default()).await,
            Err(ClusteringError::Timeout { .. })
        ));
        assert!(leftovers(&dir.path().join("work")).is_empty());
    }
}
