//! # docqa
//!
//! **Ask questions about the rows of a database table.**
//!
//! docqa is a small retrieval-augmented generation (RAG) system made of two
//! independent processes that share nothing but an index file on disk.
//!
//! ## Architecture
//!
//! ```text
//!  docqa ingest                               docqa serve
//! ┌────────────┐   ┌─────────┐   ┌──────────────┐   ┌────────────────────────────┐
//! │ PostgreSQL │──▶│ Embedder│──▶│ index.json   │──▶│ retrieve → prompt → LLM    │
//! │ documents  │   │ (batch) │   │ (atomic save)│   │ POST /ask                  │
//! └────────────┘   └─────────┘   └──────────────┘   └────────────────────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. [`sources`] fetches every `(id, content)` row in one query.
//! 2. [`ingest`] wraps rows as documents, embeds them via [`embedding`], and
//!    writes the index with [`store`].
//! 3. [`server`] loads the index at startup, checks it matches the configured
//!    embedder, and serves [`qa::RetrievalQa`] behind `POST /ask`.
//! 4. [`llm`] sends the composed prompt to the Hugging Face Inference API.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration and validation |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | PostgreSQL connection pool |
//! | [`sources`] | Row sources: PostgreSQL and in-memory |
//! | [`embedding`] | Embedding providers: fastembed, Hugging Face, hashing |
//! | [`ingest`] | Ingestion pipeline |
//! | [`progress`] | Ingestion progress on stderr |
//! | [`store`] | Index file format and atomic persistence |
//! | [`llm`] | Text-generation client |
//! | [`qa`] | Retrieve → prompt → generate pipeline |
//! | [`server`] | Axum HTTP server with CORS |

pub mod config;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod progress;
pub mod qa;
pub mod server;
pub mod sources;
pub mod store;

pub use docqa_core::{index, models, prompt};
