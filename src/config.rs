use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable holding the OpenAI-compatible API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/divelog.sqlite")
}

/// Hosted chat model used by the agent.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_model_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            timeout_secs: default_model_timeout_secs(),
            max_retries: default_model_max_retries(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

fn default_model() -> String {
    "gpt-4.1".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_temperature() -> f64 {
    0.3
}
fn default_model_timeout_secs() -> u64 {
    60
}
fn default_model_max_retries() -> u32 {
    3
}
fn default_max_tool_rounds() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// `keyword` (FTS5 + BM25) or `semantic` (embeddings + cosine).
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_top_k")]
    pub top_k: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            top_k: default_top_k(),
        }
    }
}

fn default_mode() -> String {
    "keyword".to_string()
}
fn default_top_k() -> i64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            base_url: default_base_url(),
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChatConfig {
    /// Print each tool invocation before the assistant's reply.
    #[serde(default)]
    pub show_tool_calls: bool,
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl RetrievalConfig {
    pub fn is_semantic(&self) -> bool {
        self.mode == "semantic"
    }
}

/// Read the API key from the environment, failing with a descriptive message.
pub fn require_api_key() -> Result<String> {
    match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => anyhow::bail!(
            "{} environment variable not set; it is required to talk to the language model",
            API_KEY_ENV
        ),
    }
}

/// Load `dir/.env` into the process environment when present.
///
/// Variables already set in the environment win over the file. A malformed
/// file is logged and ignored. Returns the path that was loaded.
pub fn load_dotenv(dir: &Path) -> Option<PathBuf> {
    let path = dir.join(".env");
    if !path.is_file() {
        return None;
    }
    match dotenvy::from_path(&path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "loaded environment file");
            Some(path)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable .env file");
            None
        }
    }
}

/// Load and validate the config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        let config = Config::default();
        validate(&config)?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate retrieval
    match config.retrieval.mode.as_str() {
        "keyword" | "semantic" => {}
        other => anyhow::bail!(
            "Unknown retrieval mode: '{}'. Must be keyword or semantic.",
            other
        ),
    }

    if !(1..=100).contains(&config.retrieval.top_k) {
        anyhow::bail!("retrieval.top_k must be in [1, 100]");
    }

    // Validate model
    if !(0.0..=2.0).contains(&config.model.temperature) {
        anyhow::bail!("model.temperature must be in [0.0, 2.0]");
    }
    if config.model.max_tool_rounds == 0 {
        anyhow::bail!("model.max_tool_rounds must be >= 1");
    }
    if config.model.model.trim().is_empty() {
        anyhow::bail!("model.model must not be empty");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.retrieval.is_semantic() && !config.embedding.is_enabled() {
        anyhow::bail!("retrieval.mode = 'semantic' requires an [embedding] provider");
    }

    Ok(())
}
