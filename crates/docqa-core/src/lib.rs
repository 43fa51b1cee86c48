//! # docqa Core
//!
//! Pure, I/O-free building blocks shared by the `docqa` ingestion pipeline
//! and query service: document records, the embedding trait, the in-memory
//! vector index, and the question-answering prompt template.
//!
//! This crate contains no tokio runtime, database, HTTP, or filesystem code.
//! Persistence of the index and all network clients live in the `docqa`
//! application crate.

pub mod embedding;
pub mod index;
pub mod models;
pub mod prompt;
