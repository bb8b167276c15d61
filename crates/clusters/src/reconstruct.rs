//! Rebuilds cluster objects from a features table.

use std::collections::{BTreeMap, HashMap};

use forces::FeaturesTable;
use tracing::{debug, info};

use crate::names::cluster_name;
use crate::schema::{ClusterParams, ClusterQuality, ClusterResult, ClusteringMethod, Coordinates, QualitySummary};

/// Groups rows by label in first-appearance order and computes centroid and
/// quality metrics per group.
///
/// Members without a resolvable 3D coordinate stay in `members` but do not
/// contribute to the centroid or the metrics.
pub fn build_clusters(table: &FeaturesTable, method: ClusteringMethod, params: &ClusterParams) -> Vec<ClusterResult> {
    let mut order: Vec<i64> = Vec::new();
    let mut groups: HashMap<i64, Vec<usize>> = HashMap::new();
    for (i, &label) in table.cluster_labels.iter().enumerate() {
        groups
            .entry(label)
            .or_insert_with(|| {
                order.push(label);
                Vec::new()
            })
            .push(i);
    }

    let silhouette = table.silhouette_score.unwrap_or(0.0);
    let parameters = ClusterParams {
        resolution: params.resolution.or(table.resolution_used),
        ..params.clone()
    };

    let clusters: Vec<ClusterResult> = order
        .into_iter()
        .map(|label| {
            let indices = &groups[&label];
            let members: Vec<String> = indices.iter().filter_map(|&i| table.id.get(i).cloned()).collect();
            let points: Vec<[f64; 3]> = indices.iter().filter_map(|&i| table.point3d(i)).collect();
            if points.len() < indices.len() {
                debug!(label, skipped = indices.len() - points.len(), "clusters: members without 3D coordinates");
            }
            let (centroid, quality) = measure(&points, silhouette);
            ClusterResult {
                id: label,
                label: cluster_name(label),
                size: members.len(),
                members,
                centroid,
                quality,
                method,
                parameters: parameters.clone(),
            }
        })
        .collect();

    info!(clusters = clusters.len(), rows = table.len(), method = method.as_str(), "clusters: rebuilt");
    clusters
}

fn measure(points: &[[f64; 3]], silhouette: f64) -> ([f64; 3], ClusterQuality) {
    if points.is_empty() {
        return (
            [0.0; 3],
            ClusterQuality {
                silhouette: 0.0,
                cohesion: 0.0,
                separation: 0.0,
                inertia: Some(0.0),
            },
        );
    }

    let n = points.len() as f64;
    let mut centroid = [0.0; 3];
    for p in points {
        for axis in 0..3 {
            centroid[axis] += p[axis];
        }
    }
    for c in centroid.iter_mut() {
        *c /= n;
    }

    let squared: Vec<f64> = points.iter().map(|p| squared_distance(p, &centroid)).collect();
    let cohesion = squared.iter().map(|d| d.sqrt()).sum::<f64>() / n;
    let inertia = squared.iter().sum::<f64>();

    (
        centroid,
        ClusterQuality {
            silhouette,
            cohesion,
            separation: squared_distance(&centroid, &[0.0; 3]).sqrt(),
            inertia: Some(inertia),
        },
    )
}

fn squared_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Row id to its 2D point and, when the table carries one, its 3D point.
pub fn coordinate_map(table: &FeaturesTable) -> BTreeMap<String, Coordinates> {
    table
        .id
        .iter()
        .enumerate()
        .filter_map(|(i, id)| {
            let [x, y] = table.point2d(i)?;
            Some((
                id.clone(),
                Coordinates {
                    x,
                    y,
                    point3d: table.point3d(i),
                },
            ))
        })
        .collect()
}

impl QualitySummary {
    /// Rolls per-cluster quality up into one record. `silhouette` is the
    /// table's global score; per-cluster copies are zeroed when a cluster has
    /// no 3D coordinates, so they are not read back here.
    pub fn from_clusters(clusters: &[ClusterResult], silhouette: Option<f64>, method: ClusteringMethod) -> Self {
        let count = clusters.len();
        let mean = |f: fn(&ClusterResult) -> f64| {
            if count == 0 {
                0.0
            } else {
                clusters.iter().map(f).sum::<f64>() / count as f64
            }
        };
        QualitySummary {
            cluster_count: count,
            point_count: clusters.iter().map(|c| c.size).sum(),
            silhouette: silhouette.unwrap_or(0.0),
            mean_cohesion: mean(|c| c.quality.cohesion),
            mean_separation: mean(|c| c.quality.separation),
            resolution: clusters.first().and_then(|c| c.parameters.resolution),
            method,
        }
    }
}
