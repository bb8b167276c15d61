use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::{derive_id, IdFallback, IdentityFields};

// Source column aliases, first present wins.
const ID_COLUMNS: &[&str] = &["id", "ID"];
const TITLE_COLUMNS: &[&str] = &["title", "Title"];
const KIND_COLUMNS: &[&str] = &["type", "Type", "Driving Force"];
const STEEP_COLUMNS: &[&str] = &["steep", "STEEP"];
const SOURCE_COLUMNS: &[&str] = &["source", "Source"];
const TEXT_COLUMNS: &[&str] = &["text", "Text", "description", "Description"];
const TAGS_COLUMNS: &[&str] = &["tags", "Tags"];

/// One driving force as loaded from the dataset.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steep: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    /// Columns this subsystem does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl DatasetRow {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Build a row from header/value pairs. `id` (or `ID`, normalized) is used
    /// when present and non-blank, otherwise the id is derived from content.
    pub fn from_columns(
        columns: BTreeMap<String, Value>,
        position: usize,
        fallback: IdFallback,
    ) -> Self {
        let mut extra = columns;

        // Identity is read before the typed fields claim their columns.
        let [title, kind, steep, source] =
            [TITLE_COLUMNS, KIND_COLUMNS, STEEP_COLUMNS, SOURCE_COLUMNS].map(|aliases| identity_cell(&extra, aliases));
        let identity = IdentityFields {
            title: title.as_deref(),
            kind: kind.as_deref(),
            steep: steep.as_deref(),
            source: source.as_deref(),
        };

        let id = take_id(&mut extra).unwrap_or_else(|| derive_id(&identity, position, fallback));
        DatasetRow {
            id,
            title: take_text(&mut extra, TITLE_COLUMNS),
            kind: take_text(&mut extra, KIND_COLUMNS),
            steep: take_text(&mut extra, STEEP_COLUMNS),
            source: take_text(&mut extra, SOURCE_COLUMNS),
            text: take_text(&mut extra, TEXT_COLUMNS),
            tags: take_text(&mut extra, TAGS_COLUMNS),
            extra,
        }
    }
}

/// Removes every id alias, blank or not, so none can shadow `id` when the
/// row is flattened back to JSON.
fn take_id(map: &mut BTreeMap<String, Value>) -> Option<String> {
    let mut id = None;
    for alias in ID_COLUMNS {
        if let Some(v) = map.remove(*alias) {
            id = id.or_else(|| value_to_text(&v));
        }
    }
    id
}

/// Removes the first alias present. A blank cell still claims the field;
/// later aliases stay in the map as plain extra columns.
fn take_text(map: &mut BTreeMap<String, Value>, aliases: &[&str]) -> Option<String> {
    let alias = aliases.iter().find(|a| map.contains_key(**a))?;
    map.remove(*alias).as_ref().and_then(value_to_text)
}

/// Text of the first alias present; blank cells come back empty.
fn identity_cell(map: &BTreeMap<String, Value>, aliases: &[&str]) -> Option<String> {
    let alias = aliases.iter().find(|a| map.contains_key(**a))?;
    Some(map.get(*alias).and_then(value_to_text).unwrap_or_default())
}

/// Cell value as text. Integral floats drop the fraction so `42.0` ids read as `42`.
pub fn value_to_text(v: &Value) -> Option<String> {
    let s = match v {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
