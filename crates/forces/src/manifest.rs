//! Integrity manifest: input digests plus the coverage they produced.
//!
//! The manifest is regenerated only when either input's digest changes.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::features::REQUIRED_COLUMNS;
use crate::merge::CoverageReport;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntegrityManifest {
    pub dataset_sha256: String,
    pub features_sha256: String,
    pub rows_dataset: usize,
    pub rows_features: usize,
    pub coverage_pct: f64,
    pub generated_at: DateTime<Utc>,
    pub strict_mode: bool,
    pub app_version: String,
    pub dataset_file: PathBuf,
    pub features_file: PathBuf,
    pub required_columns: Vec<String>,
}

pub struct ManifestInputs<'a> {
    /// The dataset file actually read (after fallback resolution).
    pub dataset_file: &'a Path,
    pub features_file: &'a Path,
    pub rows_dataset: usize,
    pub rows_features: usize,
    pub coverage: &'a CoverageReport,
    pub strict_mode: bool,
    pub app_version: &'a str,
}

/// SHA-256 of the file contents, lowercase hex.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn read_manifest(path: &Path) -> Option<IntegrityManifest> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(_) => {
            debug!(path=%path.display(), "manifest: none on disk");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(m) => Some(m),
        Err(e) => {
            warn!(path=%path.display(), "manifest: unreadable, will regenerate: {e}");
            None
        }
    }
}

pub fn write_manifest(path: &Path, manifest: &IntegrityManifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let bytes = serde_json::to_vec_pretty(manifest).map_err(std::io::Error::from)?;
    std::fs::write(path, bytes)?;
    info!(path=%path.display(), "manifest: written");
    Ok(())
}

/// Returns the manifest at `path` when both digests still match, otherwise
/// writes and returns a fresh one. The flag is true when the existing
/// manifest was reused.
pub fn generate_or_validate(path: &Path, inputs: &ManifestInputs<'_>) -> Result<(IntegrityManifest, bool)> {
    let dataset_sha256 = hash_file(inputs.dataset_file)?;
    let features_sha256 = hash_file(inputs.features_file)?;

    if let Some(existing) = read_manifest(path) {
        if existing.dataset_sha256 == dataset_sha256 && existing.features_sha256 == features_sha256 {
            info!(path=%path.display(), "manifest: up to date");
            return Ok((existing, true));
        }
        info!(path=%path.display(), "manifest: input digests changed, regenerating");
    }

    let manifest = IntegrityManifest {
        dataset_sha256,
        features_sha256,
        rows_dataset: inputs.rows_dataset,
        rows_features: inputs.rows_features,
        coverage_pct: (inputs.coverage.percent() * 100.0).round() / 100.0,
        generated_at: Utc::now(),
        strict_mode: inputs.strict_mode,
        app_version: inputs.app_version.to_string(),
        dataset_file: inputs.dataset_file.to_path_buf(),
        features_file: inputs.features_file.to_path_buf(),
        required_columns: REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect(),
    };
    write_manifest(path, &manifest)?;
    Ok((manifest, false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> CoverageReport {
        CoverageReport {
            dataset_ids: 3,
            feature_ids: 2,
            matched: 2,
            union: 3,
            coverage: 2.0 / 3.0,
        }
    }

    #[test]
    fn test_manifest_reused_until_inputs_change() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("scan.xlsx");
        let features = dir.path().join("features.json");
        let manifest_path = dir.path().join("out/features.manifest.json");
        std::fs::write(&dataset, b"dataset-bytes").unwrap();
        std::fs::write(&features, b"{}").unwrap();

        let cov = report();
        let inputs = ManifestInputs {
            dataset_file: &dataset,
            features_file: &features,
            rows_dataset: 3,
            rows_features: 2,
            coverage: &cov,
            strict_mode: false,
            app_version: "test",
        };

        let (first, reused) = generate_or_validate(&manifest_path, &inputs).unwrap();
        assert!(!reused);
        assert_eq!(first.coverage_pct, 66.67);
        assert_eq!(first.required_columns.len(), 5);

        let (second, reused) = generate_or_validate(&manifest_path, &inputs).unwrap();
        assert!(reused);
        assert_eq!(first, second);

        std::fs::write(&features, b"{\"changed\":true}").unwrap();
        let (third, reused) = generate_or_validate(&manifest_path, &inputs).unwrap();
        assert!(!reused);
        assert_ne!(third.features_sha256, first.features_sha256);
    }

    #[test]
    fn test_hash_file_is_sha256_hex() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("f.bin");
        std::fs::write(&p, b"abc").unwrap();
        assert_eq!(
            hash_file(&p).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_manifest_keys_use_sha256_names() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("scan.xlsx");
        let features = dir.path().join("features.json");
        let manifest_path = dir.path().join("features.manifest.json");
        std::fs::write(&dataset, b"d").unwrap();
        std::fs::write(&features, b"{}").unwrap();
        let cov = report();
        let inputs = ManifestInputs {
            dataset_file: &dataset,
            features_file: &features,
            rows_dataset: 3,
            rows_features: 2,
            coverage: &cov,
            strict_mode: true,
            app_version: "test",
        };
        generate_or_validate(&manifest_path, &inputs).unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&manifest_path).unwrap()).unwrap();
        assert_eq!(raw["features_sha256"], hash_file(&features).unwrap());
        assert_eq!(raw["dataset_sha256"], hash_file(&dataset).unwrap());
    }

    #[test]
    fn test_garbage_manifest_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("m.json");
        std::fs::write(&p, b"[1,2").unwrap();
        assert!(read_manifest(&p).is_none());
    }
}
