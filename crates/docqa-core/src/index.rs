//! Flat in-memory vector index with exact nearest-neighbour search.
//!
//! The index is built once from the full document set and is read-only
//! afterwards. Search is brute-force cosine similarity, which is exact and
//! more than fast enough for the table sizes this tool ingests.
//!
//! # Ranking
//!
//! 1. Score every entry against the query vector (cosine similarity).
//! 2. Sort by score descending; ties keep insertion (row) order.
//! 3. Truncate to `k`.

use anyhow::{bail, Result};

use crate::embedding::cosine_similarity;
use crate::models::{Document, ScoredDocument};

/// One indexed document and its embedding.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub document: Document,
    pub vector: Vec<f32>,
}

/// An immutable set of embedded documents tagged with the embedding model
/// that produced the vectors.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    embedding_model: String,
    dims: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Build an index from documents and their embeddings, paired by position.
    ///
    /// # Errors
    ///
    /// Fails if the number of vectors differs from the number of documents,
    /// or if any vector's length differs from `dims`.
    pub fn from_embeddings(
        embedding_model: impl Into<String>,
        dims: usize,
        documents: Vec<Document>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if documents.len() != vectors.len() {
            bail!(
                "embedding count mismatch: {} documents but {} vectors",
                documents.len(),
                vectors.len()
            );
        }

        let entries = documents
            .into_iter()
            .zip(vectors)
            .map(|(document, vector)| IndexEntry { document, vector })
            .collect();

        Self::from_entries(embedding_model, dims, entries)
    }

    /// Build an index from already-paired entries (used when loading from disk).
    pub fn from_entries(
        embedding_model: impl Into<String>,
        dims: usize,
        entries: Vec<IndexEntry>,
    ) -> Result<Self> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dims) {
            bail!(
                "vector for document {} has {} dimensions, expected {}",
                bad.document.id,
                bad.vector.len(),
                dims
            );
        }

        Ok(Self {
            embedding_model: embedding_model.into(),
            dims,
            entries,
        })
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Check that vectors from the given embedding model can be compared
    /// against this index.
    pub fn ensure_compatible(&self, model: &str, dims: usize) -> Result<()> {
        if self.embedding_model != model {
            bail!(
                "index was built with embedding model '{}' but '{}' is configured; \
                 re-run ingestion or change embedding.model",
                self.embedding_model,
                model
            );
        }
        if self.dims != dims {
            bail!(
                "index has {} dimensions but the configured embedder produces {}",
                self.dims,
                dims
            );
        }
        Ok(())
    }

    /// Return the `k` documents most similar to `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredDocument>> {
        if query.len() != self.dims {
            bail!(
                "query vector has {} dimensions, index expects {}",
                query.len(),
                self.dims
            );
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query, &e.vector)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredDocument {
                document: self.entries[i].document.clone(),
                score,
            })
            .collect())
    }
}
