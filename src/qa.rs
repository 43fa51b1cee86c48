//! Retrieval-augmented question answering.
//!
//! [`RetrievalQa`] composes the three stages of a query:
//!
//! 1. **Retrieve** — embed the question and take the top-`k` passages from
//!    the [`VectorIndex`].
//! 2. **Prompt** — stuff the passages into the `{context}` slot of the
//!    [`PromptTemplate`], the question into `{question}`.
//! 3. **Generate** — send the prompt to the [`Generator`].
//!
//! The answer is returned together with the passages that grounded it,
//! in retrieval rank order.

use std::sync::Arc;
use thiserror::Error;

use docqa_core::embedding::Embedder;
use docqa_core::index::VectorIndex;
use docqa_core::models::ScoredDocument;
use docqa_core::prompt::{stuff_documents, PromptTemplate};

use crate::llm::{GenerationError, Generator};

/// Why a question could not be answered.
#[derive(Debug, Error)]
pub enum QaError {
    /// The request itself is unusable (e.g. an empty question).
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The embedding or generation service failed or refused the call.
    #[error("upstream service error: {0}")]
    Upstream(String),
    /// The embedding or generation service did not answer in time.
    #[error("upstream service timed out: {0}")]
    Timeout(String),
    /// Anything else: a bug or an inconsistent index.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<GenerationError> for QaError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Timeout => QaError::Timeout(e.to_string()),
            other => QaError::Upstream(other.to_string()),
        }
    }
}

/// Classify an embedding failure, which arrives as an `anyhow` chain.
fn embedding_error(e: anyhow::Error) -> QaError {
    let timed_out = e.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .map(|r| r.is_timeout())
            .unwrap_or(false)
    });
    let msg = format!("query embedding failed: {:#}", e);
    if timed_out {
        QaError::Timeout(msg)
    } else {
        QaError::Upstream(msg)
    }
}

/// The result of answering a question.
#[derive(Debug, Clone)]
pub struct QaAnswer {
    pub answer: String,
    /// Retrieved passages, best match first.
    pub sources: Vec<ScoredDocument>,
}

/// Retriever + prompt + generator, shared read-only across requests.
pub struct RetrievalQa {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    prompt: PromptTemplate,
    k: usize,
}

impl RetrievalQa {
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        prompt: PromptTemplate,
        k: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            generator,
            prompt,
            k,
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Return the top-`k` passages for `question`.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredDocument>, QaError> {
        let query_vec = self
            .embedder
            .embed_query(question)
            .await
            .map_err(embedding_error)?;

        self.index
            .search(&query_vec, self.k)
            .map_err(|e| QaError::Internal(e.to_string()))
    }

    /// Answer `question` from the indexed passages.
    pub async fn ask(&self, question: &str) -> Result<QaAnswer, QaError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QaError::InvalidInput("query must not be empty".to_string()));
        }

        let sources = self.retrieve(question).await?;
        let prompt = self.prompt.format(&stuff_documents(&sources), question);

        tracing::debug!(
            passages = sources.len(),
            prompt_len = prompt.len(),
            model = self.generator.model_id(),
            "calling generation endpoint"
        );

        let answer = self.generator.generate(&prompt).await?;
        Ok(QaAnswer { answer, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embedding::HuggingFaceEmbedder;
    use async_trait::async_trait;
    use docqa_core::embedding::HashingEmbedder;
    use docqa_core::models::{Document, SourceRow};
    use std::sync::Mutex;

    /// Records the last prompt it was given.
    struct RecordingGenerator {
        last_prompt: Mutex<Option<String>>,
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        fn model_id(&self) -> &str {
            "recording"
        }

        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            Ok("answer".to_string())
        }
    }

    struct TimeoutGenerator;

    #[async_trait]
    impl Generator for TimeoutGenerator {
        fn model_id(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            Err(GenerationError::Timeout)
        }
    }

    async fn build_index(embedder: &HashingEmbedder, rows: &[(i64, &str)]) -> Arc<VectorIndex> {
        let docs: Vec<Document> = rows
            .iter()
            .map(|(id, c)| Document::from_row(SourceRow::new(*id, *c)))
            .collect();
        let texts: Vec<String> = docs.iter().map(|d| d.content.clone()).collect();
        let vectors = embedder.embed(&texts).await.unwrap();
        Arc::new(
            VectorIndex::from_embeddings(embedder.model_name(), embedder.dims(), docs, vectors)
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_ask_puts_ranked_context_and_question_in_prompt() {
        let embedder = HashingEmbedder::new(256);
        let index = build_index(
            &embedder,
            &[(1, "Paris is the capital of France."), (2, "The sun is a star.")],
        )
        .await;
        let generator = Arc::new(RecordingGenerator {
            last_prompt: Mutex::new(None),
        });
        let qa = RetrievalQa::new(
            index,
            Arc::new(embedder),
            generator.clone(),
            PromptTemplate::default(),
            3,
        );

        let out = qa.ask("What is the capital of France?").await.unwrap();
        assert_eq!(out.answer, "answer");
        assert_eq!(out.sources.len(), 2);
        assert_eq!(out.sources[0].document.content, "Paris is the capital of France.");

        let prompt = generator.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains(
            "Context: Paris is the capital of France.\n\nThe sun is a star.\nQuestion: What is the capital of France?"
        ));
    }

    #[tokio::test]
    async fn test_ask_limits_to_k() {
        let embedder = HashingEmbedder::new(128);
        let index = build_index(&embedder, &[(1, "a b"), (2, "b c"), (3, "c d"), (4, "d e")]).await;
        let qa = RetrievalQa::new(
            index,
            Arc::new(embedder),
            Arc::new(RecordingGenerator {
                last_prompt: Mutex::new(None),
            }),
            PromptTemplate::default(),
            3,
        );
        let out = qa.ask("b").await.unwrap();
        assert_eq!(out.sources.len(), 3);
        assert!(out.sources.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_empty_question_is_invalid_input() {
        let embedder = HashingEmbedder::new(16);
        let index = build_index(&embedder, &[(1, "x")]).await;
        let qa = RetrievalQa::new(
            index,
            Arc::new(embedder),
            Arc::new(TimeoutGenerator),
            PromptTemplate::default(),
            3,
        );
        assert!(matches!(qa.ask("   ").await, Err(QaError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_generation_timeout_maps_to_timeout() {
        let embedder = HashingEmbedder::new(16);
        let index = build_index(&embedder, &[(1, "x")]).await;
        let qa = RetrievalQa::new(
            index,
            Arc::new(embedder),
            Arc::new(TimeoutGenerator),
            PromptTemplate::default(),
            3,
        );
        assert!(matches!(qa.ask("x").await, Err(QaError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_embedding_timeout_maps_to_timeout() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let mut config = Config::default();
        config.embedding.provider = "huggingface".to_string();
        config.embedding.model = "org/silent-model".to_string();
        config.embedding.dims = Some(16);
        config.embedding.url = Some(format!("http://{}", addr));
        config.embedding.timeout_secs = 1;
        config.embedding.max_retries = 0;
        config.llm.token = Some("hf_test".to_string());
        let embedder = HuggingFaceEmbedder::new(&config).unwrap();

        let index = build_index(&HashingEmbedder::new(16), &[(1, "x")]).await;
        let qa = RetrievalQa::new(
            index,
            Arc::new(embedder),
            Arc::new(RecordingGenerator {
                last_prompt: Mutex::new(None),
            }),
            PromptTemplate::default(),
            3,
        );

        let err = qa.ask("hello").await.unwrap_err();
        assert!(matches!(err, QaError::Timeout(_)), "got {:?}", err);
    }

    #[test]
    fn test_generation_http_error_maps_to_upstream() {
        let e: QaError = GenerationError::Http {
            status: 429,
            body: "rate limited".into(),
        }
        .into();
        assert!(matches!(e, QaError::Upstream(_)));
    }
}
