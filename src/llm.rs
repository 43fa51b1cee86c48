//! Hosted text generation.
//!
//! [`Generator`] is the seam between the question-answering pipeline and the
//! model host. [`HuggingFaceEndpoint`] implements it against the Hugging Face
//! Inference API text-generation task:
//!
//! ```text
//! POST {endpoint_url}/{repo_id}
//! Authorization: Bearer $HF_TOKEN
//! { "inputs": "<prompt>",
//!   "parameters": { "temperature": 0.5, "max_new_tokens": 512, "return_full_text": false } }
//! → [ { "generated_text": "..." } ]
//! ```

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;

/// Endpoint used to check that a token is valid.
pub const WHOAMI_URL: &str = "https://huggingface.co/api/whoami-v2";

/// Failure of a generation call, classified so the HTTP layer can pick a
/// status code.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request timed out")]
    Timeout,
    #[error("generation endpoint returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("generation request failed: {0}")]
    Transport(String),
    #[error("invalid generation response: {0}")]
    InvalidResponse(String),
}

impl GenerationError {
    fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Timeout | GenerationError::Transport(_) => true,
            GenerationError::Http { status, .. } => *status == 429 || *status >= 500,
            GenerationError::InvalidResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenerationError::Timeout
        } else if e.is_decode() {
            GenerationError::InvalidResponse(e.to_string())
        } else {
            GenerationError::Transport(e.to_string())
        }
    }
}

/// A text-generation backend.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Identifier of the model answering prompts.
    fn model_id(&self) -> &str;

    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Text generation through the Hugging Face Inference API.
pub struct HuggingFaceEndpoint {
    repo_id: String,
    token: String,
    endpoint_url: String,
    temperature: f32,
    max_new_tokens: u32,
    max_retries: u32,
    client: reqwest::Client,
}

impl HuggingFaceEndpoint {
    /// Bind the endpoint described by `[llm]`.
    ///
    /// # Errors
    ///
    /// Fails if `repo_id` or `token` is missing.
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let repo_id = config
            .repo_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.repo_id (HUGGINGFACE_REPO_ID) is required"))?;
        let token = config
            .token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.token (HF_TOKEN) is required"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            repo_id,
            token,
            endpoint_url: config.endpoint_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_new_tokens: config.max_new_tokens,
            max_retries: config.max_retries,
            client,
        })
    }

    fn url(&self) -> String {
        format!("{}/{}", self.endpoint_url, self.repo_id)
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "inputs": prompt,
            "parameters": {
                "temperature": self.temperature,
                "max_new_tokens": self.max_new_tokens,
                "return_full_text": false,
            },
        })
    }

    async fn generate_once(&self, prompt: &str) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(self.url())
            .bearer_auth(&self.token)
            .json(&self.request_body(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response.json().await?;
        parse_generated_text(&json)
    }
}

#[async_trait]
impl Generator for HuggingFaceEndpoint {
    fn model_id(&self) -> &str {
        &self.repo_id
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut attempt = 0;
        loop {
            match self.generate_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "retrying generation request");
                    tokio::time::sleep(Duration::from_secs(1 << (attempt - 1).min(5))).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Extract `generated_text` from either `[{"generated_text": ...}]` or
/// `{"generated_text": ...}`.
fn parse_generated_text(json: &serde_json::Value) -> Result<String, GenerationError> {
    let obj = match json {
        serde_json::Value::Array(items) => items.first(),
        other => Some(other),
    };

    obj.and_then(|o| o.get("generated_text"))
        .and_then(|t| t.as_str())
        .map(|t| t.trim().to_string())
        .ok_or_else(|| GenerationError::InvalidResponse(format!("missing generated_text in {}", json)))
}

/// Check that `token` is accepted by the Hugging Face Hub.
///
/// Called once at query-service startup; a rejected token stops the
/// service from starting.
pub async fn verify_token(token: &str, timeout: Duration) -> anyhow::Result<String> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client.get(WHOAMI_URL).bearer_auth(token).send().await?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("Hugging Face rejected the token (HTTP {})", status);
    }

    let json: serde_json::Value = response.json().await?;
    Ok(json
        .get("name")
        .and_then(|n| n.as_str())
        .unwrap_or("unknown")
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generated_text_list() {
        let json = serde_json::json!([{ "generated_text": "  Paris.\n" }]);
        assert_eq!(parse_generated_text(&json).unwrap(), "Paris.");
    }

    #[test]
    fn test_parse_generated_text_object() {
        let json = serde_json::json!({ "generated_text": "ok" });
        assert_eq!(parse_generated_text(&json).unwrap(), "ok");
    }

    #[test]
    fn test_parse_generated_text_missing() {
        let json = serde_json::json!([{ "error": "Model is loading" }]);
        assert!(matches!(
            parse_generated_text(&json),
            Err(GenerationError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(GenerationError::Timeout.is_retryable());
        assert!(GenerationError::Http { status: 503, body: String::new() }.is_retryable());
        assert!(GenerationError::Http { status: 429, body: String::new() }.is_retryable());
        assert!(!GenerationError::Http { status: 401, body: String::new() }.is_retryable());
        assert!(!GenerationError::InvalidResponse(String::new()).is_retryable());
    }

    #[test]
    fn test_endpoint_request_shape() {
        let cfg = LlmConfig {
            repo_id: Some("mistralai/Mistral-7B-Instruct-v0.3".into()),
            token: Some("hf_x".into()),
            endpoint_url: "https://example.test/models/".into(),
            ..LlmConfig::default()
        };
        let ep = HuggingFaceEndpoint::new(&cfg).unwrap();
        assert_eq!(ep.model_id(), "mistralai/Mistral-7B-Instruct-v0.3");
        assert_eq!(
            ep.url(),
            "https://example.test/models/mistralai/Mistral-7B-Instruct-v0.3"
        );
        let body = ep.request_body("hi");
        assert_eq!(body["inputs"], "hi");
        assert_eq!(body["parameters"]["max_new_tokens"], 512);
        assert_eq!(body["parameters"]["return_full_text"], false);
    }

    #[test]
    fn test_endpoint_requires_repo_and_token() {
        assert!(HuggingFaceEndpoint::new(&LlmConfig::default()).is_err());
    }
}
