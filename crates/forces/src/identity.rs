use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of a derived id in hex characters.
pub const DERIVED_ID_LEN: usize = 16;

const SEPARATOR: &str = "|";

/// Hash input for an identifying column that exists but whose cell is blank.
/// Matches what the features pipeline wrote for empty cells.
pub const BLANK_CELL: &str = "nan";

/// What to hash when a row carries none of the identifying fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdFallback {
    /// Hash the 0-based row position. Stable as long as the file keeps its order.
    #[default]
    Position,
    /// Fresh random value on every load.
    Random,
}

impl IdFallback {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "position" => Some(IdFallback::Position),
            "random" => Some(IdFallback::Random),
            _ => None,
        }
    }
}

/// Identifying fields of a row, in hashing priority order. `Some` means the
/// column exists in the source, even when its cell is blank.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityFields<'a> {
    pub title: Option<&'a str>,
    pub kind: Option<&'a str>,
    pub steep: Option<&'a str>,
    pub source: Option<&'a str>,
}

impl<'a> IdentityFields<'a> {
    fn parts(&self) -> Vec<&'a str> {
        [self.title, self.kind, self.steep, self.source]
            .into_iter()
            .flatten()
            .map(|s| if s.trim().is_empty() { BLANK_CELL } else { s })
            .collect()
    }
}

/// Deterministic id: sha256("title|type|steep|source"), truncated.
///
/// Only the fields whose column is present take part; a blank cell hashes as
/// [`BLANK_CELL`]. Returns `None` when no identifying column is present.
pub fn content_id(fields: &IdentityFields<'_>) -> Option<String> {
    let parts = fields.parts();
    if parts.is_empty() {
        return None;
    }
    Some(hash_truncated(&parts.join(SEPARATOR)))
}

/// Id for a row at `position`, falling back per `fallback` when the row has
/// no identifying content.
pub fn derive_id(fields: &IdentityFields<'_>, position: usize, fallback: IdFallback) -> String {
    if let Some(id) = content_id(fields) {
        return id;
    }
    match fallback {
        IdFallback::Position => hash_truncated(&position.to_string()),
        IdFallback::Random => {
            let mut s = uuid::Uuid::new_v4().simple().to_string();
            s.truncate(DERIVED_ID_LEN);
            s
        }
    }
}

fn hash_truncated(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut s = hex::encode(digest);
    s.truncate(DERIVED_ID_LEN);
    s
}
