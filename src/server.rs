//! Question-answering HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Answer a question from the indexed documents |
//! | `GET`  | `/health` | Health check (version, index size, embedding model) |
//!
//! # Request / Response
//!
//! ```json
//! POST /ask
//! { "query": "What is the capital of France?" }
//!
//! 200 OK
//! { "response": "Paris.", "source_documents": ["Paris is the capital of France.", "..."] }
//! ```
//!
//! # Error Contract
//!
//! ```json
//! { "detail": "query must not be empty", "code": "invalid_input" }
//! ```
//!
//! | Code | Status | Cause |
//! |------|--------|-------|
//! | `invalid_input` | 400 | Malformed JSON, missing `query`, empty query |
//! | `upstream_unavailable` | 503 | Embedding or generation service error |
//! | `upstream_timeout` | 504 | Embedding or generation service timed out |
//! | `internal` | 500 | Anything else |
//!
//! Upstream error text is logged, not returned to the caller.
//!
//! # CORS
//!
//! Only `server.cors_origin` may make cross-origin calls. Requested methods
//! and headers are mirrored back and credentials are allowed.

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};

use docqa_core::prompt::PromptTemplate;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::llm::{verify_token, HuggingFaceEndpoint};
use crate::qa::{QaError, RetrievalQa};
use crate::store::load_index_for;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
///
/// Built once at startup and read-only afterwards.
#[derive(Clone)]
pub struct AppState {
    qa: Arc<RetrievalQa>,
}

impl AppState {
    pub fn new(qa: RetrievalQa) -> Self {
        Self { qa: Arc::new(qa) }
    }

    /// Perform every startup step in order, failing on the first error:
    /// authenticate, create the embedder, load and check the index, bind the
    /// generation endpoint, and compose the QA pipeline.
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.require_llm()?;

        if config.llm.verify_token {
            let token = config.llm.token.as_deref().unwrap_or_default();
            let user = verify_token(token, Duration::from_secs(config.llm.timeout_secs))
                .await
                .context("Hugging Face authentication failed")?;
            tracing::info!(user = %user, "authenticated with Hugging Face");
        }

        let embedder = create_embedder(config).await?;
        tracing::info!(
            provider = %config.embedding.provider,
            model = embedder.model_name(),
            dims = embedder.dims(),
            "embedding provider ready"
        );

        let index = load_index_for(&config.index.path, embedder.model_name(), embedder.dims())
            .with_context(|| {
                format!(
                    "Failed to load vector index from {}",
                    config.index.path.display()
                )
            })?;
        if index.is_empty() {
            tracing::warn!("vector index is empty; every answer will lack context");
        }
        tracing::info!(documents = index.len(), "vector index loaded");

        let generator = HuggingFaceEndpoint::new(&config.llm)?;
        tracing::info!(
            repo_id = config.llm.repo_id.as_deref().unwrap_or_default(),
            temperature = config.llm.temperature,
            max_new_tokens = config.llm.max_new_tokens,
            "generation endpoint bound"
        );

        let qa = RetrievalQa::new(
            Arc::new(index),
            embedder,
            Arc::new(generator),
            PromptTemplate::default(),
            config.retrieval.k,
        );
        Ok(Self::new(qa))
    }
}

/// Assemble routes, CORS, and state.
pub fn build_router(state: AppState, cors_origin: &str) -> Result<Router> {
    let origin: HeaderValue = cors_origin
        .parse()
        .with_context(|| format!("Invalid server.cors_origin: '{}'", cors_origin))?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    Ok(Router::new()
        .route("/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state))
}

/// `docqa serve`: start up and serve until the process is terminated.
pub async fn run_server(config: &Config, bind_override: Option<String>) -> Result<()> {
    let state = AppState::from_config(config).await?;
    let app = build_router(state, &config.server.cors_origin)?;

    let bind_addr = bind_override.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    tracing::info!(addr = %bind_addr, "docqa server listening");
    println!("docqa server listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    detail: String,
    code: &'static str,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: self.detail,
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

fn invalid_input(detail: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "invalid_input",
        detail: detail.into(),
    }
}

impl From<QaError> for AppError {
    fn from(err: QaError) -> Self {
        match err {
            QaError::InvalidInput(msg) => invalid_input(msg),
            QaError::Upstream(msg) => {
                tracing::error!(error = %msg, "upstream service failed");
                AppError {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    code: "upstream_unavailable",
                    detail: "Error processing query: the model service is unavailable".to_string(),
                }
            }
            QaError::Timeout(msg) => {
                tracing::error!(error = %msg, "upstream service timed out");
                AppError {
                    status: StatusCode::GATEWAY_TIMEOUT,
                    code: "upstream_timeout",
                    detail: "Error processing query: the model service timed out".to_string(),
                }
            }
            QaError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    detail: "Error processing query: internal error".to_string(),
                }
            }
        }
    }
}

// ============ POST /ask ============

/// JSON request body for `POST /ask`.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
}

/// JSON response body for `POST /ask`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub response: String,
    /// Passage texts in retrieval rank order.
    pub source_documents: Vec<String>,
}

async fn handle_ask(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| invalid_input(rejection.body_text()))?;

    tracing::info!(query_len = request.query.len(), "ask");
    let answer = state.qa.ask(&request.query).await?;
    tracing::debug!(sources = answer.sources.len(), "answered");

    Ok(Json(AskResponse {
        response: answer.answer,
        source_documents: answer
            .sources
            .into_iter()
            .map(|s| s.document.content)
            .collect(),
    }))
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    documents: usize,
    embedding_model: String,
    k: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        documents: state.qa.index().len(),
        embedding_model: state.qa.index().embedding_model().to_string(),
        k: state.qa.k(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qa_errors_map_to_status_codes() {
        let cases = [
            (QaError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (QaError::Upstream("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (QaError::Timeout("x".into()), StatusCode::GATEWAY_TIMEOUT),
            (QaError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn test_upstream_detail_does_not_leak_error_text() {
        let err = AppError::from(QaError::Upstream("token hf_secret rejected".into()));
        assert!(!err.detail.contains("hf_secret"));
        assert!(err.detail.starts_with("Error processing query"));
    }
}
