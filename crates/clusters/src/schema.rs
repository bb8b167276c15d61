use serde::{Deserialize, Serialize};

/// How the cluster assignment was obtained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusteringMethod {
    /// Reuse of a previously computed assignment.
    #[default]
    Fixed,
    /// Fresh computation over the current rows.
    Dynamic,
}

impl ClusteringMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Some(ClusteringMethod::Fixed),
            "dynamic" => Some(ClusteringMethod::Dynamic),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClusteringMethod::Fixed => "fixed",
            ClusteringMethod::Dynamic => "dynamic",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_clusters: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterQuality {
    /// Global score of the whole assignment, repeated per cluster.
    pub silhouette: f64,
    /// Mean member distance to the centroid.
    pub cohesion: f64,
    /// Centroid distance from the origin.
    pub separation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inertia: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterResult {
    /// The cluster label.
    pub id: i64,
    pub label: String,
    pub members: Vec<String>,
    pub centroid: [f64; 3],
    pub size: usize,
    pub quality: ClusterQuality,
    pub method: ClusteringMethod,
    pub parameters: ClusterParams,
}

/// Projected position of one row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point3d: Option<[f64; 3]>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    pub cluster_count: usize,
    pub point_count: usize,
    pub silhouette: f64,
    pub mean_cohesion: f64,
    pub mean_separation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<f64>,
    pub method: ClusteringMethod,
}
