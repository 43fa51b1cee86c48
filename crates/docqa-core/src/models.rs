//! Core data models that flow from the relational source into the index
//! and back out of the retriever.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Metadata key under which the source row identifier is stored.
pub const ROW_ID_KEY: &str = "id";

/// Primary key of a source row.
///
/// The `documents.id` column may be an integer or a text column; both are
/// preserved as-is so the metadata maps back to the exact source value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Int(i64),
    Text(String),
}

impl RowId {
    /// JSON form stored in document metadata.
    pub fn to_json(&self) -> Value {
        match self {
            RowId::Int(n) => Value::from(*n),
            RowId::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl From<i64> for RowId {
    fn from(n: i64) -> Self {
        RowId::Int(n)
    }
}

impl From<&str> for RowId {
    fn from(s: &str) -> Self {
        RowId::Text(s.to_string())
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Int(n) => write!(f, "{}", n),
            RowId::Text(s) => f.write_str(s),
        }
    }
}

/// Raw `(id, content)` pair fetched from the relational source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub id: RowId,
    pub content: String,
}

impl SourceRow {
    pub fn new(id: impl Into<RowId>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}

/// A document record held by the vector index.
///
/// Created once per source row during ingestion and never mutated after.
/// `id` is a fresh UUID for the index entry; the originating row key is
/// kept in `metadata["id"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    /// Wrap a source row as a document record.
    pub fn from_row(row: SourceRow) -> Self {
        let mut metadata = Map::new();
        metadata.insert(ROW_ID_KEY.to_string(), row.id.to_json());
        Self {
            id: Uuid::new_v4().to_string(),
            content: row.content,
            metadata,
        }
    }

    /// The source row key recorded at ingestion time, if present.
    pub fn row_id(&self) -> Option<&Value> {
        self.metadata.get(ROW_ID_KEY)
    }
}

/// A document returned by the retriever together with its cosine similarity
/// to the query.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}
