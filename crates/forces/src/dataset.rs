//! Dataset loading: columnar path with spreadsheet fallback.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, Reader};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ForcesError, Result};
use crate::identity::IdFallback;
use crate::row::{value_to_text, DatasetRow};

pub const COLUMNAR_EXTENSION: &str = "parquet";
pub const FALLBACK_EXTENSION: &str = "xlsx";

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods"];

/// Resolves which file will actually be read for `path`.
///
/// A `.parquet` path resolves to its `.xlsx` sibling; columnar decoding is not
/// available, so a missing sibling is an unsupported-format failure that names
/// the expected spreadsheet.
pub fn resolve_dataset_path(path: &Path) -> Result<PathBuf> {
    match extension_lower(path).as_deref() {
        Some(COLUMNAR_EXTENSION) => {
            let fallback = path.with_extension(FALLBACK_EXTENSION);
            if fallback.exists() {
                debug!(path=%path.display(), fallback=%fallback.display(), "dataset: using spreadsheet fallback");
                Ok(fallback)
            } else {
                Err(ForcesError::unsupported(
                    path,
                    format!(
                        "columnar decoding is not available; expected spreadsheet fallback at {}",
                        fallback.display()
                    ),
                ))
            }
        }
        Some(ext) if SPREADSHEET_EXTENSIONS.contains(&ext) => Ok(path.to_path_buf()),
        _ => Err(ForcesError::unsupported(
            path,
            "expected a .parquet path with .xlsx fallback, or a spreadsheet",
        )),
    }
}

/// Loads every row of the first sheet, assigning ids where the sheet has none.
pub fn load_dataset(path: &Path, fallback: IdFallback) -> Result<Vec<DatasetRow>> {
    let resolved = resolve_dataset_path(path)?;
    if !resolved.exists() {
        return Err(ForcesError::NotFound(resolved));
    }

    let mut workbook = open_workbook_auto(&resolved).map_err(|e| ForcesError::parse(&resolved, e))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ForcesError::parse(&resolved, "workbook has no sheets"))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| ForcesError::parse(&resolved, e))?;

    let rows = rows_from_range(&range, fallback)?;
    info!(path=%resolved.display(), sheet=%sheet, rows=rows.len(), "dataset: loaded");
    Ok(rows)
}

/// First row is the header. Blank rows are skipped; columns with a blank
/// header are dropped.
pub fn rows_from_range(range: &Range<Data>, fallback: IdFallback) -> Result<Vec<DatasetRow>> {
    let mut lines = range.rows();
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<Option<String>> = header.iter().map(|c| value_to_text(&cell_to_value(c))).collect();

    let mut rows = Vec::new();
    for cells in lines {
        if cells.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }
        let mut columns = BTreeMap::new();
        for (name, cell) in headers.iter().zip(cells) {
            if let Some(name) = name {
                columns.insert(name.clone(), cell_to_value(cell));
            }
        }
        let position = rows.len();
        rows.push(DatasetRow::from_columns(columns, position, fallback));
    }

    ensure_unique_ids(&rows)?;
    Ok(rows)
}

pub fn ensure_unique_ids(rows: &[DatasetRow]) -> Result<()> {
    let mut seen = HashSet::with_capacity(rows.len());
    let mut dupes: Vec<String> = Vec::new();
    for r in rows {
        if !seen.insert(r.id.as_str()) && !dupes.contains(&r.id) {
            dupes.push(r.id.clone());
        }
    }
    if dupes.is_empty() {
        Ok(())
    } else {
        Err(ForcesError::DuplicateIds(dupes))
    }
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Data::Int(i) => Value::from(*i),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => Value::String(dt.to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(e) => Value::String(format!("#ERR:{e:?}")),
    }
}

pub(crate) fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
