//! Configuration parsing, environment overrides, and validation.
//!
//! Settings come from an optional TOML file (default `./config/docqa.toml`)
//! and are then overridden by environment variables:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `HF_TOKEN` | `llm.token` |
//! | `HUGGINGFACE_REPO_ID` | `llm.repo_id` |
//! | `DB_NAME` | `database.name` |
//! | `DB_USER` | `database.user` |
//! | `DB_PASSWORD` | `database.password` |
//! | `DB_HOST` | `database.host` |
//! | `DB_PORT` | `database.port` |
//!
//! Every section is optional; unspecified fields take the defaults below.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_db_port(),
            name: None,
            user: None,
            password: None,
            max_connections: default_max_connections(),
        }
    }
}

// Keeps the password out of logs and error messages.
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

fn default_db_port() -> u16 {
    5432
}
fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"local"` (fastembed), `"huggingface"` (Inference API), or `"hashing"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the `huggingface` provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("vectorstore/db_faiss")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of passages handed to the model per question.
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

fn default_k() -> usize {
    3
}

#[derive(Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub repo_id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_true")]
    pub verify_token: bool,
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            repo_id: None,
            token: None,
            temperature: default_temperature(),
            max_new_tokens: default_max_new_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: 0,
            verify_token: true,
            endpoint_url: default_endpoint_url(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("repo_id", &self.repo_id)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("temperature", &self.temperature)
            .field("max_new_tokens", &self.max_new_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("verify_token", &self.verify_token)
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

fn default_temperature() -> f32 {
    0.5
}
fn default_max_new_tokens() -> u32 {
    512
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_true() -> bool {
    true
}
fn default_endpoint_url() -> String {
    "https://api-inference.huggingface.co/models".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// The single origin allowed to make credentialed cross-origin requests.
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Overlay values from an environment map. Empty values are ignored.
    pub fn apply_env(&mut self, env: &HashMap<String, String>) -> Result<()> {
        let get = |key: &str| env.get(key).filter(|v| !v.trim().is_empty()).cloned();

        if let Some(v) = get("HF_TOKEN") {
            self.llm.token = Some(v);
        }
        if let Some(v) = get("HUGGINGFACE_REPO_ID") {
            self.llm.repo_id = Some(v);
        }
        if let Some(v) = get("DB_NAME") {
            self.database.name = Some(v);
        }
        if let Some(v) = get("DB_USER") {
            self.database.user = Some(v);
        }
        if let Some(v) = get("DB_PASSWORD") {
            self.database.password = Some(v);
        }
        if let Some(v) = get("DB_HOST") {
            self.database.host = Some(v);
        }
        if let Some(v) = get("DB_PORT") {
            self.database.port = v
                .trim()
                .parse()
                .with_context(|| format!("DB_PORT must be a port number, got '{}'", v))?;
        }
        Ok(())
    }

    /// Settings the ingestion pipeline cannot run without.
    pub fn require_database(&self) -> Result<()> {
        let db = &self.database;
        if db.name.is_none() {
            bail!("database name is not set (DB_NAME or database.name)");
        }
        if db.user.is_none() {
            bail!("database user is not set (DB_USER or database.user)");
        }
        if db.host.is_none() {
            bail!("database host is not set (DB_HOST or database.host)");
        }
        Ok(())
    }

    /// Settings the query service cannot start without.
    pub fn require_llm(&self) -> Result<()> {
        if self.llm.token.is_none() {
            bail!("Hugging Face token is not set (HF_TOKEN or llm.token)");
        }
        if self.llm.repo_id.is_none() {
            bail!("generation model is not set (HUGGINGFACE_REPO_ID or llm.repo_id)");
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.retrieval.k < 1 {
            bail!("retrieval.k must be >= 1");
        }

        if self.embedding.batch_size < 1 {
            bail!("embedding.batch_size must be >= 1");
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }
        match self.embedding.provider.as_str() {
            "local" | "huggingface" | "hashing" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be local, huggingface, or hashing.",
                other
            ),
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            bail!("llm.temperature must be in [0.0, 2.0]");
        }
        if self.llm.max_new_tokens < 1 {
            bail!("llm.max_new_tokens must be >= 1");
        }
        if self.server.cors_origin.trim().is_empty() {
            bail!("server.cors_origin must not be empty");
        }

        Ok(())
    }
}

/// Parse and validate configuration from TOML text and an environment map.
pub fn parse_config(content: &str, env: &HashMap<String, String>) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.apply_env(env)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from `path` (if it exists) and the process environment.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = if path.exists() {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?
    } else {
        String::new()
    };

    let env: HashMap<String, String> = std::env::vars().collect();
    parse_config(&content, &env)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = parse_config("", &HashMap::new()).unwrap();
        assert_eq!(cfg.retrieval.k, 3);
        assert_eq!(cfg.llm.temperature, 0.5);
        assert_eq!(cfg.llm.max_new_tokens, 512);
        assert_eq!(cfg.index.path, PathBuf::from("vectorstore/db_faiss"));
        assert_eq!(cfg.embedding.model, "sentence-transformers/all-MiniLM-L6-v2");
        assert_eq!(cfg.server.cors_origin, "http://localhost:5173");
        assert_eq!(cfg.database.port, 5432);
    }

    #[test]
    fn test_env_overrides_file() {
        let toml = r#"
[database]
name = "from_file"
port = 1111

[llm]
repo_id = "file/model"
"#;
        let cfg = parse_config(
            toml,
            &env(&[
                ("DB_NAME", "from_env"),
                ("DB_PORT", "6543"),
                ("HF_TOKEN", "hf_secret"),
                ("HUGGINGFACE_REPO_ID", "env/model"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.database.name.as_deref(), Some("from_env"));
        assert_eq!(cfg.database.port, 6543);
        assert_eq!(cfg.llm.token.as_deref(), Some("hf_secret"));
        assert_eq!(cfg.llm.repo_id.as_deref(), Some("env/model"));
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let cfg = parse_config("[database]\nname = \"keep\"", &env(&[("DB_NAME", "  ")])).unwrap();
        assert_eq!(cfg.database.name.as_deref(), Some("keep"));
    }

    #[test]
    fn test_bad_port_is_config_error() {
        let err = parse_config("", &env(&[("DB_PORT", "abc")])).unwrap_err();
        assert!(err.to_string().contains("DB_PORT"));
    }

    #[test]
    fn test_validation_rules() {
        let none = HashMap::new();
        assert!(parse_config("[retrieval]\nk = 0", &none).is_err());
        assert!(parse_config("[llm]\ntemperature = 3.0", &none).is_err());
        assert!(parse_config("[embedding]\nprovider = \"openai\"", &none).is_err());
        assert!(parse_config("[embedding]\nbatch_size = 0", &none).is_err());
        assert!(parse_config("[retrieval]\nk = 5\n[llm]\ntemperature = 0.0", &none).is_ok());
    }

    #[test]
    fn test_require_checks() {
        let cfg = parse_config("", &HashMap::new()).unwrap();
        assert!(cfg.require_database().is_err());
        assert!(cfg.require_llm().is_err());

        let cfg = parse_config(
            "",
            &env(&[
                ("DB_NAME", "docs"),
                ("DB_USER", "app"),
                ("DB_HOST", "localhost"),
                ("HF_TOKEN", "t"),
                ("HUGGINGFACE_REPO_ID", "org/model"),
            ]),
        )
        .unwrap();
        assert!(cfg.require_database().is_ok());
        assert!(cfg.require_llm().is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cfg = parse_config(
            "",
            &env(&[("HF_TOKEN", "hf_topsecret"), ("DB_PASSWORD", "pw123")]),
        )
        .unwrap();
        let dbg = format!("{:?}", cfg);
        assert!(!dbg.contains("hf_topsecret"));
        assert!(!dbg.contains("pw123"));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let cfg = load_config(Path::new("/nonexistent/docqa.toml")).unwrap();
        assert_eq!(cfg.retrieval.k, 3);
    }
}
