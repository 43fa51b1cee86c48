//! Embedding provider implementations.
//!
//! Concrete [`Embedder`] backends selected by `embedding.provider`:
//! - **`local`** — [`LocalEmbedder`], a sentence-transformers model run
//!   in-process through fastembed (ONNX Runtime). Downloaded once from the
//!   Hugging Face Hub and cached; no network calls afterwards.
//! - **`huggingface`** — [`HuggingFaceEmbedder`], the hosted
//!   feature-extraction pipeline of the Hugging Face Inference API.
//! - **`hashing`** — [`HashingEmbedder`], deterministic and offline.
//!
//! Ingestion and the query service both call [`create_embedder`] with the
//! same `[embedding]` block, so both sides embed into the same vector space.
//!
//! # Retry Strategy
//!
//! The Hugging Face provider uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited), 503 (model loading) and other 5xx → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use docqa_core::embedding::{Embedder, HashingEmbedder};

use crate::config::Config;
#[cfg(feature = "local-embeddings-fastembed")]
use crate::config::EmbeddingConfig;

/// Default dimensionality for the `hashing` provider.
const DEFAULT_HASHING_DIMS: usize = 384;

/// Default base URL for the Hugging Face feature-extraction pipeline.
const DEFAULT_HF_EMBEDDING_URL: &str = "https://router.huggingface.co/hf-inference/models";

/// Known output sizes of common sentence-embedding models.
fn known_dims(model: &str) -> Option<usize> {
    match model {
        "sentence-transformers/all-MiniLM-L6-v2" | "all-minilm-l6-v2" => Some(384),
        "sentence-transformers/all-MiniLM-L12-v2" | "all-minilm-l12-v2" => Some(384),
        "sentence-transformers/all-mpnet-base-v2" | "all-mpnet-base-v2" => Some(768),
        "BAAI/bge-small-en-v1.5" | "bge-small-en-v1.5" => Some(384),
        "BAAI/bge-base-en-v1.5" | "bge-base-en-v1.5" => Some(768),
        "BAAI/bge-large-en-v1.5" | "bge-large-en-v1.5" => Some(1024),
        _ => None,
    }
}

fn resolve_dims(model: &str, configured: Option<usize>) -> Result<usize> {
    configured.or_else(|| known_dims(model)).ok_or_else(|| {
        anyhow!(
            "embedding.dims must be set for model '{}' (dimensionality unknown)",
            model
        )
    })
}

/// Create the configured embedding provider.
///
/// # Supported Providers
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"local"` | [`LocalEmbedder`] (requires feature `local-embeddings-fastembed`) |
/// | `"huggingface"` | [`HuggingFaceEmbedder`] (requires `HF_TOKEN`) |
/// | `"hashing"` | [`HashingEmbedder`] |
///
/// Loading a local model may download weights, so construction runs on a
/// blocking thread.
pub async fn create_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let emb = &config.embedding;
    match emb.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbedder::new(
            emb.dims.unwrap_or(DEFAULT_HASHING_DIMS),
        ))),
        "huggingface" => Ok(Arc::new(HuggingFaceEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => {
            let emb = emb.clone();
            let embedder = tokio::task::spawn_blocking(move || LocalEmbedder::new(&emb)).await??;
            Ok(Arc::new(embedder))
        }
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires --features local-embeddings-fastembed; \
             use provider = \"huggingface\" or \"hashing\" instead"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Local Provider (fastembed) ============

/// Sentence-transformers model run locally through fastembed.
///
/// The model is loaded once and shared; inference is serialized behind a
/// mutex and runs on the blocking thread pool.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let fastembed_model = config_to_fastembed_model(&config.model)?;
        let dims = resolve_dims(&config.model, config.dims)?;

        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
        )
        .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model_name: config.model.clone(),
            dims,
            batch_size: config.batch_size,
            model: Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "sentence-transformers/all-MiniLM-L6-v2" | "all-minilm-l6-v2" => {
            Ok(fastembed::EmbeddingModel::AllMiniLML6V2)
        }
        "sentence-transformers/all-MiniLM-L12-v2" | "all-minilm-l12-v2" => {
            Ok(fastembed::EmbeddingModel::AllMiniLML12V2)
        }
        "BAAI/bge-small-en-v1.5" | "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "BAAI/bge-base-en-v1.5" | "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "BAAI/bge-large-en-v1.5" | "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             sentence-transformers/all-MiniLM-L6-v2, sentence-transformers/all-MiniLM-L12-v2, \
             BAAI/bge-small-en-v1.5, BAAI/bge-base-en-v1.5, BAAI/bge-large-en-v1.5",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

// ============ Hugging Face Inference Provider ============

/// Embedding provider using the Hugging Face Inference feature-extraction
/// pipeline.
///
/// Calls `POST {url}/{model}/pipeline/feature-extraction` with the bearer
/// token from `HF_TOKEN`. Token-level outputs are mean-pooled.
pub struct HuggingFaceEmbedder {
    model: String,
    dims: usize,
    token: String,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl HuggingFaceEmbedder {
    /// # Errors
    ///
    /// Returns an error if the token is missing or the model's
    /// dimensionality is unknown and not configured.
    pub fn new(config: &Config) -> Result<Self> {
        let emb = &config.embedding;
        let token = config
            .llm
            .token
            .clone()
            .ok_or_else(|| anyhow!("HF_TOKEN is required for the huggingface embedding provider"))?;
        let dims = resolve_dims(&emb.model, emb.dims)?;
        let url = emb
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_HF_EMBEDDING_URL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(emb.timeout_secs))
            .build()?;

        Ok(Self {
            model: emb.model.clone(),
            dims,
            token,
            url: url.trim_end_matches('/').to_string(),
            max_retries: emb.max_retries,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}/pipeline/feature-extraction", self.url, self.model)
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "inputs": texts,
            "options": { "wait_for_model": true },
        });
        let endpoint = self.endpoint();

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&endpoint)
                .bearer_auth(&self.token)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_feature_extraction(&json, texts.len());
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow!(
                            "Hugging Face embedding API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!("Hugging Face embedding API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(
                        anyhow::Error::new(e).context("Hugging Face embedding request failed"),
                    );
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Embedding failed after retries")))
    }
}

/// Parse a feature-extraction response: either one pooled vector per input
/// (`[[f32]]`) or token-level vectors per input (`[[[f32]]]`), which are
/// mean-pooled.
fn parse_feature_extraction(json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let items = json
        .as_array()
        .ok_or_else(|| anyhow!("Invalid feature-extraction response: expected an array"))?;

    let vectors = items
        .iter()
        .map(|item| {
            let rows = item
                .as_array()
                .ok_or_else(|| anyhow!("Invalid feature-extraction response: item is not an array"))?;
            if rows.first().map(|r| r.is_array()).unwrap_or(false) {
                let tokens = rows
                    .iter()
                    .map(json_to_vec)
                    .collect::<Result<Vec<_>>>()?;
                Ok(mean_pool(&tokens))
            } else {
                json_to_vec(item)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    if vectors.len() != expected {
        bail!(
            "feature-extraction returned {} vectors for {} inputs",
            vectors.len(),
            expected
        );
    }
    Ok(vectors)
}

fn json_to_vec(value: &serde_json::Value) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| anyhow!("Invalid feature-extraction response: vector is not an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("Invalid feature-extraction response: non-numeric value"))
        })
        .collect()
}

fn mean_pool(tokens: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = tokens.first() else {
        return Vec::new();
    };
    let mut out = vec![0.0f32; first.len()];
    for t in tokens {
        for (o, v) in out.iter_mut().zip(t) {
            *o += v;
        }
    }
    let n = tokens.len() as f32;
    out.iter_mut().for_each(|o| *o /= n);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use std::collections::HashMap;

    #[test]
    fn test_parse_pooled_vectors() {
        let json = serde_json::json!([[0.1, 0.2], [0.3, 0.4]]);
        let out = parse_feature_extraction(&json, 2).unwrap();
        assert_eq!(out, vec![vec![0.1f32, 0.2], vec![0.3, 0.4]]);
    }

    #[test]
    fn test_parse_token_vectors_are_mean_pooled() {
        let json = serde_json::json!([[[1.0, 0.0], [3.0, 2.0]]]);
        let out = parse_feature_extraction(&json, 1).unwrap();
        assert_eq!(out, vec![vec![2.0f32, 1.0]]);
    }

    #[test]
    fn test_parse_count_mismatch_is_error() {
        let json = serde_json::json!([[0.1, 0.2]]);
        assert!(parse_feature_extraction(&json, 2).is_err());
        assert!(parse_feature_extraction(&serde_json::json!({"error": "x"}), 1).is_err());
    }

    #[test]
    fn test_resolve_dims() {
        assert_eq!(
            resolve_dims("sentence-transformers/all-MiniLM-L6-v2", None).unwrap(),
            384
        );
        assert_eq!(resolve_dims("custom/model", Some(42)).unwrap(), 42);
        assert!(resolve_dims("custom/model", None).is_err());
    }

    #[tokio::test]
    async fn test_create_hashing_embedder() {
        let cfg = parse_config(
            "[embedding]\nprovider = \"hashing\"\ndims = 64",
            &HashMap::new(),
        )
        .unwrap();
        let e = create_embedder(&cfg).await.unwrap();
        assert_eq!(e.dims(), 64);
        assert_eq!(e.model_name(), "feature-hash");
    }

    #[tokio::test]
    async fn test_huggingface_embedder_requires_token() {
        let cfg = parse_config("[embedding]\nprovider = \"huggingface\"", &HashMap::new()).unwrap();
        let err = create_embedder(&cfg).await.err().unwrap();
        assert!(err.to_string().contains("HF_TOKEN"));
    }
}
