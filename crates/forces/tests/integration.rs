use calamine::{Data, Range};
use forces::{
    load_features, merge, rows_from_range, DatasetRow, ForcesError, IdFallback, IntegrityStatus, Verdict,
};
use serde_json::json;
use std::collections::HashSet;

fn dataset(ids: &[&str]) -> Vec<DatasetRow> {
    ids.iter().map(|id| DatasetRow::with_id(*id)).collect()
}

fn write_features(dir: &std::path::Path, value: serde_json::Value) -> std::path::PathBuf {
    let path = dir.join("precomputed_features.json");
    std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
    path
}

fn two_of_three() -> serde_json::Value {
    json!({
        "id": ["a", "b"],
        "cluster_labels": [0, 0],
        "cluster_titles": ["X"],
        "umap2d_x": [0.5, 1.5],
        "umap2d_y": [2.5, 3.5]
    })
}

#[test]
fn test_non_strict_merge_keeps_every_row() {
    let dir = tempfile::tempdir().unwrap();
    let features = load_features(&write_features(dir.path(), two_of_three())).unwrap();

    let out = merge(&dataset(&["a", "b", "c"]), &features, false).unwrap();

    assert_eq!(out.rows.len(), 3);
    assert!((out.coverage.coverage - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(out.rows[0].features.as_ref().unwrap().cluster_title.as_deref(), Some("X"));
    assert_eq!(out.rows[1].features.as_ref().unwrap().umap2d_y, 3.5);
    assert!(out.rows[2].features.is_none());
}

#[test]
fn test_strict_merge_rejects_low_coverage() {
    let dir = tempfile::tempdir().unwrap();
    let features = load_features(&write_features(dir.path(), two_of_three())).unwrap();

    let err = merge(&dataset(&["a", "b", "c"]), &features, true).unwrap_err();
    assert!(matches!(err, ForcesError::IntegrityViolation { matched: 2, .. }));
    assert!(err.to_string().contains("66.7%"), "{err}");
    assert!(err.is_fatal_at_startup());
}

#[test]
fn test_missing_projection_column_is_schema_violation() {
    let dir = tempfile::tempdir().unwrap();
    let mut v = two_of_three();
    v.as_object_mut().unwrap().remove("umap2d_y");

    match load_features(&write_features(dir.path(), v)) {
        Err(ForcesError::SchemaViolation { missing }) => assert_eq!(missing, vec!["umap2d_y"]),
        other => panic!("expected SchemaViolation, got {other:?}"),
    }
}

#[test]
fn test_identical_id_sets_give_full_coverage_and_features_everywhere() {
    let dir = tempfile::tempdir().unwrap();
    let v = json!({
        "id": ["c", "a", "b"],
        "cluster_labels": [1, 0, 1],
        "cluster_titles": {"0": "Zero", "1": "One"},
        "umap2d_x": [0.0, 1.0, 2.0],
        "umap2d_y": [0.0, 1.0, 2.0]
    });
    let features = load_features(&write_features(dir.path(), v)).unwrap();

    let out = merge(&dataset(&["a", "b", "c"]), &features, true).unwrap();
    assert_eq!(out.coverage.coverage, 1.0);
    assert!(out.rows.iter().all(|r| r.has_features()));
    let titles: Vec<_> = out
        .rows
        .iter()
        .map(|r| r.features.as_ref().unwrap().cluster_title.clone().unwrap())
        .collect();
    assert_eq!(titles, vec!["Zero", "One", "One"]);
}

#[test]
fn test_merge_output_has_dataset_cardinality_and_order() {
    let dir = tempfile::tempdir().unwrap();
    let v = json!({
        "id": ["b", "zz", "yy"],
        "cluster_labels": [0, 1, 2],
        "cluster_titles": {},
        "umap2d_x": [0.0, 0.0, 0.0],
        "umap2d_y": [0.0, 0.0, 0.0]
    });
    let features = load_features(&write_features(dir.path(), v)).unwrap();
    let ids = ["d", "c", "b", "a"];

    let out = merge(&dataset(&ids), &features, false).unwrap();
    let merged_ids: Vec<&str> = out.rows.iter().map(|r| r.row.id.as_str()).collect();
    assert_eq!(merged_ids, ids);
    let distinct: HashSet<_> = merged_ids.iter().collect();
    assert_eq!(distinct.len(), ids.len());
    assert_eq!(out.coverage.union, 6);
}

#[test]
fn test_sheet_without_ids_merges_against_derived_ids() {
    let mut range: Range<Data> = Range::new((0, 0), (2, 1));
    for (pos, text) in [
        ((0, 0), "Title"),
        ((0, 1), "Driving Force"),
        ((1, 0), "Ageing population"),
        ((1, 1), "Megatrends"),
        ((2, 0), "Synthetic biology"),
        ((2, 1), "Weak Signals"),
    ] {
        range.set_value(pos, Data::String(text.to_string()));
    }
    let rows = rows_from_range(&range, IdFallback::Position).unwrap();
    let again = rows_from_range(&range, IdFallback::Position).unwrap();
    assert_eq!(rows, again);

    let dir = tempfile::tempdir().unwrap();
    let v = json!({
        "id": [rows[0].id, rows[1].id],
        "cluster_labels": [3, 4],
        "cluster_titles": {"3": "Demography", "4": "Biotech"},
        "umap2d_x": [1.0, 2.0],
        "umap2d_y": [1.0, 2.0]
    });
    let features = load_features(&write_features(dir.path(), v)).unwrap();

    let status = IntegrityStatus::evaluate(Ok(rows.as_slice()), Ok(&features), true);
    assert_eq!(status.verdict, Verdict::Pass);
    assert!(status.errors.is_empty());

    let out = merge(&rows, &features, true).unwrap();
    assert_eq!(out.rows[1].features.as_ref().unwrap().cluster_title.as_deref(), Some("Biotech"));
}
