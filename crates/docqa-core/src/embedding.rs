//! Embedding trait, the offline feature-hashing embedder, and vector
//! utilities.
//!
//! Network- and model-backed providers (fastembed, Hugging Face Inference)
//! live in the `docqa` app crate. Everything here is pure computation.
//!
//! - [`Embedder`] — the interface every provider implements
//! - [`HashingEmbedder`] — deterministic bag-of-words embedder, no model download
//! - [`cosine_similarity`] / [`l2_normalize`] — similarity helpers
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian `f32` encoding used by
//!   the persisted index

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

/// Trait for embedding providers.
///
/// The same provider (same [`model_name`](Embedder::model_name) and
/// [`dims`](Embedder::dims)) must be used to build an index and to query
/// it; the index records both and refuses to load against a different
/// provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"sentence-transformers/all-MiniLM-L6-v2"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Empty embedding response"))
    }
}

// ============ Hashing Embedder ============

/// Model identifier recorded by [`HashingEmbedder`].
pub const HASHING_MODEL_NAME: &str = "feature-hash";

/// Deterministic feature-hashing embedder.
///
/// Lowercases the text, splits it on non-alphanumeric characters, hashes
/// every token with FNV-1a into one of `dims` buckets with a hash-derived
/// sign, and L2-normalizes the result. Texts that share words land close
/// together, which is enough for lexical retrieval without any model.
///
/// ```rust
/// use docqa_core::embedding::{cosine_similarity, HashingEmbedder};
///
/// let e = HashingEmbedder::new(256);
/// let a = e.embed_one("the capital of France");
/// let b = e.embed_one("France capital");
/// let c = e.embed_one("a distant star");
/// assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
/// ```
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    /// Synchronous embedding of a single text.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let h = fnv1a(token.to_lowercase().as_bytes());
            let bucket = (h % self.dims as u64) as usize;
            let sign = if h >> 63 == 1 { -1.0 } else { 1.0 };
            v[bucket] += sign;
        }
        l2_normalize(&mut v);
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        HASHING_MODEL_NAME
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

// ============ Vector utilities ============

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Encode a float vector as little-endian `f32` bytes (`len × 4`).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode bytes produced by [`vec_to_blob`].
///
/// Fails if the byte length is not a multiple of 4.
pub fn blob_to_vec(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        bail!("vector blob length {} is not a multiple of 4", blob.len());
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob).unwrap(), vec);
    }

    #[test]
    fn test_blob_rejects_truncated_bytes() {
        assert!(blob_to_vec(&[0u8, 1, 2]).is_err());
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_hashing_is_deterministic_and_normalized() {
        let e = HashingEmbedder::new(64);
        let a = e.embed_one("Paris is the capital of France.");
        let b = e.embed_one("Paris is the capital of France.");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_is_case_insensitive() {
        let e = HashingEmbedder::new(64);
        assert_eq!(e.embed_one("FRANCE"), e.embed_one("france"));
    }

    #[test]
    fn test_hashing_empty_text_is_zero_vector() {
        let e = HashingEmbedder::new(8);
        assert_eq!(e.embed_one("  ...  "), vec![0.0; 8]);
    }

    #[tokio::test]
    async fn test_hashing_embed_batch_preserves_order() {
        let e = HashingEmbedder::new(32);
        let texts = vec!["one".to_string(), "two".to_string()];
        let out = e.embed(&texts).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], e.embed_one("one"));
        assert_eq!(out[1], e.embed_one("two"));
        assert_eq!(e.embed_query("two").await.unwrap(), out[1]);
    }
}
