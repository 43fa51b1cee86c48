//! Row sources for the ingestion pipeline.
//!
//! A [`DocumentSource`] yields every `(id, content)` pair to index in one
//! call. [`PostgresSource`] reads the `documents` table; [`InMemorySource`]
//! serves a fixed set of rows and is used by tests and demos.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use docqa_core::models::{RowId, SourceRow};

use crate::config::DatabaseConfig;
use crate::db;

/// The single query issued against the relational source.
pub const FETCH_DOCUMENTS_SQL: &str = "SELECT id, content FROM documents";

/// A bulk source of rows to embed.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Short label used in progress and log output.
    fn name(&self) -> &str;

    /// Fetch all rows. No pagination; every call returns the full set.
    async fn fetch_rows(&self) -> Result<Vec<SourceRow>>;

    /// Release any held connections.
    async fn close(&self) {}
}

// ============ PostgreSQL ============

/// Reads `SELECT id, content FROM documents` from PostgreSQL.
pub struct PostgresSource {
    pool: PgPool,
}

impl PostgresSource {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = db::connect(config).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl DocumentSource for PostgresSource {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn fetch_rows(&self) -> Result<Vec<SourceRow>> {
        let rows = sqlx::query(FETCH_DOCUMENTS_SQL)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Query failed: {}", FETCH_DOCUMENTS_SQL))?;

        rows.iter().map(decode_row).collect()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Decode one row. `id` may be any integer width or text; a NULL `content`
/// becomes an empty string.
fn decode_row(row: &PgRow) -> Result<SourceRow> {
    let id = if let Ok(v) = row.try_get::<i64, _>("id") {
        RowId::Int(v)
    } else if let Ok(v) = row.try_get::<i32, _>("id") {
        RowId::Int(i64::from(v))
    } else if let Ok(v) = row.try_get::<i16, _>("id") {
        RowId::Int(i64::from(v))
    } else if let Ok(v) = row.try_get::<String, _>("id") {
        RowId::Text(v)
    } else {
        bail!("documents.id must be an integer or text column");
    };

    let content: Option<String> = row
        .try_get("content")
        .context("documents.content must be a text column")?;

    Ok(SourceRow {
        id,
        content: content.unwrap_or_default(),
    })
}

// ============ In-memory ============

/// A fixed list of rows.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    rows: Vec<SourceRow>,
}

impl InMemorySource {
    pub fn new(rows: Vec<SourceRow>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl DocumentSource for InMemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_rows(&self) -> Result<Vec<SourceRow>> {
        Ok(self.rows.clone())
    }
}
