//! Ingestion pipeline: source rows → documents → embeddings → index file.
//!
//! Every run is a full rebuild. Rows are fetched in one bulk read, wrapped
//! as [`Document`]s with the row id in metadata, embedded in batches of
//! `embedding.batch_size`, indexed, and written atomically to `index.path`.
//! Any failure aborts the run; there is no partial index.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use docqa_core::embedding::Embedder;
use docqa_core::index::VectorIndex;
use docqa_core::models::Document;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::progress::{IngestProgressEvent, IngestProgressReporter, StderrProgress};
use crate::sources::{DocumentSource, PostgresSource};
use crate::store::save_index;

/// Outcome of an ingestion run.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub documents: usize,
    pub embedding_model: String,
    pub index_file: PathBuf,
}

/// `docqa ingest`: read the `documents` table and rebuild the index.
pub async fn run_ingest(config: &Config) -> Result<()> {
    config.require_database()?;

    let embedder = create_embedder(config).await?;
    let source = PostgresSource::connect(&config.database).await?;

    let result = ingest(
        &source,
        embedder.as_ref(),
        &config.index.path,
        config.embedding.batch_size,
        &StderrProgress,
    )
    .await;
    source.close().await;
    let report = result?;

    println!(
        "Stored {} documents in index at {}.",
        report.documents,
        report.index_file.display()
    );
    Ok(())
}

/// Run the pipeline against any source and embedder.
pub async fn ingest(
    source: &dyn DocumentSource,
    embedder: &dyn Embedder,
    index_dir: &Path,
    batch_size: usize,
    progress: &dyn IngestProgressReporter,
) -> Result<IngestReport> {
    let rows = source
        .fetch_rows()
        .await
        .with_context(|| format!("Failed to fetch rows from {}", source.name()))?;
    progress.report(IngestProgressEvent::Fetched {
        source: source.name().to_string(),
        rows: rows.len() as u64,
    });
    tracing::info!(source = source.name(), rows = rows.len(), "fetched source rows");

    let documents: Vec<Document> = rows.into_iter().map(Document::from_row).collect();
    let vectors = embed_documents(embedder, &documents, batch_size, progress).await?;

    let index = VectorIndex::from_embeddings(
        embedder.model_name(),
        embedder.dims(),
        documents,
        vectors,
    )?;

    let index_file = save_index(&index, index_dir)?;
    tracing::info!(
        documents = index.len(),
        model = index.embedding_model(),
        path = %index_file.display(),
        "index written"
    );

    Ok(IngestReport {
        documents: index.len(),
        embedding_model: index.embedding_model().to_string(),
        index_file,
    })
}

async fn embed_documents(
    embedder: &dyn Embedder,
    documents: &[Document],
    batch_size: usize,
    progress: &dyn IngestProgressReporter,
) -> Result<Vec<Vec<f32>>> {
    let total = documents.len() as u64;
    let mut vectors = Vec::with_capacity(documents.len());

    for batch in documents.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
        let mut embedded = embedder
            .embed(&texts)
            .await
            .with_context(|| format!("Embedding failed with model {}", embedder.model_name()))?;
        vectors.append(&mut embedded);
        progress.report(IngestProgressEvent::Embedding {
            n: vectors.len() as u64,
            total,
        });
    }

    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::sources::InMemorySource;
    use crate::store::load_index;
    use async_trait::async_trait;
    use docqa_core::embedding::HashingEmbedder;
    use docqa_core::models::SourceRow;
    use tempfile::TempDir;

    /// Returns one vector too few, like a misbehaving provider.
    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().skip(1).map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_ingest_batches_and_persists_every_row() {
        let tmp = TempDir::new().unwrap();
        let rows: Vec<SourceRow> = (1..=10)
            .map(|i| SourceRow::new(i, format!("row number {}", i)))
            .collect();
        let source = InMemorySource::new(rows);
        let embedder = HashingEmbedder::new(32);

        let report = ingest(&source, &embedder, tmp.path(), 3, &NoProgress)
            .await
            .unwrap();
        assert_eq!(report.documents, 10);
        assert_eq!(report.embedding_model, "feature-hash");

        let index = load_index(tmp.path()).unwrap();
        let ids: Vec<i64> = index
            .entries()
            .iter()
            .map(|e| e.document.row_id().unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_ingest_fails_on_vector_count_mismatch() {
        let tmp = TempDir::new().unwrap();
        let source = InMemorySource::new(vec![SourceRow::new(1, "a"), SourceRow::new(2, "b")]);
        let err = ingest(&source, &ShortEmbedder, tmp.path(), 10, &NoProgress)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("count mismatch"));
        assert!(load_index(tmp.path()).is_err());
    }
}
