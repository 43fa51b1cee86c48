//! On-disk persistence of the vector index.
//!
//! The index lives in a directory (default `vectorstore/db_faiss`) as a
//! single `index.json` file:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "embedding_model": "sentence-transformers/all-MiniLM-L6-v2",
//!   "dims": 384,
//!   "created_at": "2026-01-01T00:00:00Z",
//!   "entries": [
//!     { "id": "<uuid>", "content": "...", "metadata": { "id": 1 }, "vector": "<base64 f32 LE>" }
//!   ]
//! }
//! ```
//!
//! Writes go to a temporary file in the same directory which is then
//! renamed over `index.json`, so readers never see a partial file.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};

use docqa_core::embedding::{blob_to_vec, vec_to_blob};
use docqa_core::index::{IndexEntry, VectorIndex};
use docqa_core::models::Document;

/// File name of the serialized index inside the index directory.
pub const INDEX_FILE_NAME: &str = "index.json";

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct IndexFile {
    format_version: u32,
    embedding_model: String,
    dims: usize,
    created_at: DateTime<Utc>,
    entries: Vec<EntryRecord>,
}

#[derive(Serialize, Deserialize)]
struct EntryRecord {
    id: String,
    content: String,
    #[serde(default)]
    metadata: Map<String, Value>,
    vector: String,
}

/// Path of the index file for an index directory.
pub fn index_file_path(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE_NAME)
}

/// Persist `index` under `dir`, replacing any previous index atomically.
pub fn save_index(index: &VectorIndex, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;

    let file = IndexFile {
        format_version: FORMAT_VERSION,
        embedding_model: index.embedding_model().to_string(),
        dims: index.dims(),
        created_at: Utc::now(),
        entries: index
            .entries()
            .iter()
            .map(|e| EntryRecord {
                id: e.document.id.clone(),
                content: e.document.content.clone(),
                metadata: e.document.metadata.clone(),
                vector: BASE64.encode(vec_to_blob(&e.vector)),
            })
            .collect(),
    };

    let target = index_file_path(dir);
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;

    serde_json::to_writer(&mut tmp, &file).context("Failed to serialize index")?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(&target)
        .with_context(|| format!("Failed to move index into place at {}", target.display()))?;

    Ok(target)
}

/// Load the index stored under `dir`.
///
/// Fails if the directory or file is missing, the file cannot be parsed,
/// the format version is unknown, or any vector is malformed.
pub fn load_index(dir: &Path) -> Result<VectorIndex> {
    let path = index_file_path(dir);
    let bytes = std::fs::read(&path).with_context(|| {
        format!(
            "Failed to read vector index at {} (run `docqa ingest` first)",
            path.display()
        )
    })?;

    let file: IndexFile = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse vector index at {}", path.display()))?;

    if file.format_version != FORMAT_VERSION {
        bail!(
            "Unsupported index format version {} (expected {})",
            file.format_version,
            FORMAT_VERSION
        );
    }

    let entries = file
        .entries
        .into_iter()
        .map(|r| {
            let blob = BASE64
                .decode(r.vector.as_bytes())
                .with_context(|| format!("Invalid vector encoding for document {}", r.id))?;
            Ok(IndexEntry {
                vector: blob_to_vec(&blob)?,
                document: Document {
                    id: r.id,
                    content: r.content,
                    metadata: r.metadata,
                },
            })
        })
        .collect::<Result<Vec<_>>>()?;

    VectorIndex::from_entries(file.embedding_model, file.dims, entries)
}

/// Load the index and check it was built with the given embedding model.
pub fn load_index_for(dir: &Path, model: &str, dims: usize) -> Result<VectorIndex> {
    let index = load_index(dir)?;
    index.ensure_compatible(model, dims)?;
    Ok(index)
}
