//! Precomputed per-row ML features (cluster assignment + projections).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::dataset::extension_lower;
use crate::error::{ForcesError, Result};
use crate::row::value_to_text;

pub const REQUIRED_COLUMNS: [&str; 5] = ["id", "cluster_labels", "cluster_titles", "umap2d_x", "umap2d_y"];
pub const OPTIONAL_COLUMNS: [&str; 6] = ["tsne_x", "tsne_y", "tsne_z", "umap3d_x", "umap3d_y", "umap3d_z"];

const LEGACY_EXTENSIONS: &[&str] = &["pkl", "pickle"];

/// Cluster titles arrive either keyed by label or as a list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClusterTitles {
    ByLabel(BTreeMap<String, String>),
    List(Vec<String>),
}

impl Default for ClusterTitles {
    fn default() -> Self {
        ClusterTitles::ByLabel(BTreeMap::new())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeaturesTable {
    pub id: Vec<String>,
    pub cluster_labels: Vec<i64>,
    pub cluster_titles: ClusterTitles,
    pub umap2d_x: Vec<f64>,
    pub umap2d_y: Vec<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tsne_x: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tsne_y: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tsne_z: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub umap3d_x: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub umap3d_y: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub umap3d_z: Option<Vec<f64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silhouette_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_clusters: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_used: Option<f64>,
}

/// The feature columns of a single row, as attached by the merge.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeatureBundle {
    pub cluster_label: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_title: Option<String>,
    pub umap2d_x: f64,
    pub umap2d_y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tsne_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tsne_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tsne_z: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub umap3d_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub umap3d_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub umap3d_z: Option<f64>,
}

impl FeaturesTable {
    /// Validates and decodes a features object. `origin` names the source in
    /// parse errors.
    pub fn from_json(value: Value, origin: &Path) -> Result<Self> {
        let Value::Object(mut obj) = value else {
            return Err(ForcesError::parse(origin, "features must be a JSON object of columns"));
        };

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| !obj.contains_key(**c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ForcesError::SchemaViolation { missing });
        }

        normalize_ids(&mut obj);
        normalize_labels(&mut obj);

        let table: FeaturesTable =
            serde_json::from_value(Value::Object(obj)).map_err(|e| ForcesError::parse(origin, e))?;
        table.check_shape()?;
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    /// Required columns must line up with `id`; optional ones only warn.
    fn check_shape(&self) -> Result<()> {
        let n = self.id.len();
        let required = [
            ("cluster_labels", self.cluster_labels.len()),
            ("umap2d_x", self.umap2d_x.len()),
            ("umap2d_y", self.umap2d_y.len()),
        ];
        for (column, actual) in required {
            if actual != n {
                return Err(ForcesError::ShapeMismatch {
                    column: column.to_string(),
                    expected: n,
                    actual,
                });
            }
        }
        for (column, values) in self.optional_columns() {
            if let Some(values) = values {
                if values.len() != n {
                    warn!(column, expected = n, actual = values.len(), "features: optional column length mismatch");
                }
            }
        }
        Ok(())
    }

    fn optional_columns(&self) -> [(&'static str, Option<&Vec<f64>>); 6] {
        [
            ("tsne_x", self.tsne_x.as_ref()),
            ("tsne_y", self.tsne_y.as_ref()),
            ("tsne_z", self.tsne_z.as_ref()),
            ("umap3d_x", self.umap3d_x.as_ref()),
            ("umap3d_y", self.umap3d_y.as_ref()),
            ("umap3d_z", self.umap3d_z.as_ref()),
        ]
    }

    pub fn optional_columns_present(&self) -> Vec<&'static str> {
        self.optional_columns()
            .into_iter()
            .filter(|(_, v)| v.is_some())
            .map(|(name, _)| name)
            .collect()
    }

    /// Required columns followed by the optional columns present, in canonical order.
    pub fn columns_present(&self) -> Vec<String> {
        REQUIRED_COLUMNS
            .iter()
            .copied()
            .chain(self.optional_columns_present())
            .map(str::to_string)
            .collect()
    }

    /// Title for row `index`.
    ///
    /// A list as long as the table is read per row; any other list is
    /// indexed by label.
    pub fn title_for(&self, index: usize) -> Option<String> {
        let label = *self.cluster_labels.get(index)?;
        match &self.cluster_titles {
            ClusterTitles::ByLabel(map) => map.get(&label.to_string()).cloned(),
            ClusterTitles::List(list) if list.len() == self.len() => list.get(index).cloned(),
            ClusterTitles::List(list) => usize::try_from(label).ok().and_then(|l| list.get(l).cloned()),
        }
    }

    pub fn point2d(&self, index: usize) -> Option<[f64; 2]> {
        Some([*self.umap2d_x.get(index)?, *self.umap2d_y.get(index)?])
    }

    /// 3D projection of row `index`: UMAP 3D when all three columns exist,
    /// otherwise t-SNE. `None` when neither projection covers the row.
    pub fn point3d(&self, index: usize) -> Option<[f64; 3]> {
        let (x, y, z) = match (&self.umap3d_x, &self.umap3d_y, &self.umap3d_z) {
            (Some(x), Some(y), Some(z)) => (x, y, z),
            _ => match (&self.tsne_x, &self.tsne_y, &self.tsne_z) {
                (Some(x), Some(y), Some(z)) => (x, y, z),
                _ => return None,
            },
        };
        Some([*x.get(index)?, *y.get(index)?, *z.get(index)?])
    }

    pub fn bundle(&self, index: usize) -> Option<FeatureBundle> {
        let at = |col: &Option<Vec<f64>>| col.as_ref().and_then(|v| v.get(index).copied());
        Some(FeatureBundle {
            cluster_label: *self.cluster_labels.get(index)?,
            cluster_title: self.title_for(index),
            umap2d_x: *self.umap2d_x.get(index)?,
            umap2d_y: *self.umap2d_y.get(index)?,
            tsne_x: at(&self.tsne_x),
            tsne_y: at(&self.tsne_y),
            tsne_z: at(&self.tsne_z),
            umap3d_x: at(&self.umap3d_x),
            umap3d_y: at(&self.umap3d_y),
            umap3d_z: at(&self.umap3d_z),
        })
    }
}

/// Loads a features file. Only the JSON-converted form is decodable.
pub fn load_features(path: &Path) -> Result<FeaturesTable> {
    match extension_lower(path).as_deref() {
        Some("json") => {}
        Some(ext) if LEGACY_EXTENSIONS.contains(&ext) => {
            return Err(ForcesError::unsupported(
                path,
                "pickle features are not implemented; provide the JSON-converted form",
            ))
        }
        _ => {
            return Err(ForcesError::unsupported(path, "features must be a .json file"));
        }
    }
    if !path.exists() {
        return Err(ForcesError::NotFound(path.to_path_buf()));
    }

    let bytes = std::fs::read(path)?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| ForcesError::parse(path, e))?;
    let table = FeaturesTable::from_json(value, path)?;

    info!(
        path=%path.display(),
        entries=table.len(),
        optional=?table.optional_columns_present(),
        "features: loaded"
    );
    Ok(table)
}

fn normalize_ids(obj: &mut Map<String, Value>) {
    if let Some(Value::Array(ids)) = obj.get_mut("id") {
        for v in ids.iter_mut() {
            if !v.is_string() {
                if let Some(text) = value_to_text(v) {
                    *v = Value::String(text);
                }
            }
        }
    }
}

// numpy exports integral labels as floats
fn normalize_labels(obj: &mut Map<String, Value>) {
    if let Some(Value::Array(labels)) = obj.get_mut("cluster_labels") {
        for v in labels.iter_mut() {
            if let Some(f) = v.as_f64() {
                if !v.is_i64() && f.fract() == 0.0 {
                    *v = Value::from(f as i64);
                }
            }
        }
    }
}
