use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_dir")]
    pub dir: PathBuf,
    /// Document cap; exceeding it evicts the least-recently-ingested document.
    #[serde(default = "default_max_documents")]
    pub max_documents: usize,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            dir: default_documents_dir(),
            max_documents: default_max_documents(),
        }
    }
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("./documents")
}
fn default_max_documents() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Target chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks; must be < chunk_size.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_overlap() -> usize {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum cosine similarity for a chunk to enter the context.
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    /// Budget for the document section of the prompt.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_min_score() -> f32 {
    0.25
}
fn default_max_context_chars() -> usize {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `hash`, `openai`, or `ollama`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Expected model output size; every vector is checked against it.
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout_secs(),
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    3
}
fn default_embed_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketConfig {
    /// Period passed to the market-data provider (e.g. `1mo`, `3mo`, `1y`).
    #[serde(default = "default_period")]
    pub default_period: String,
    /// Symbols to use when a stock query names no ticker.
    #[serde(default = "default_symbols")]
    pub default_symbols: Vec<String>,
    #[serde(default = "default_market_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_market_retries")]
    pub max_retries: u32,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            default_period: default_period(),
            default_symbols: default_symbols(),
            timeout_secs: default_market_timeout_secs(),
            max_retries: default_market_retries(),
        }
    }
}

fn default_period() -> String {
    "1mo".to_string()
}
fn default_symbols() -> Vec<String> {
    vec!["AAPL".to_string()]
}
fn default_market_timeout_secs() -> u64 {
    10
}
fn default_market_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `disabled` or `gemini`.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "disabled".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}
fn default_ttl_secs() -> u64 {
    300
}

impl Config {
    /// All-defaults config, used by tests and commands that can run
    /// without a config file on disk.
    pub fn minimal() -> Self {
        toml::from_str("").expect("empty config parses with defaults")
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.documents.max_documents == 0 {
        anyhow::bail!("documents.max_documents must be >= 1");
    }

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.overlap ({}) must be strictly less than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    match config.embedding.provider.as_str() {
        "hash" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, or ollama.",
            other
        ),
    }
    if config.embedding.provider != "hash" && config.embedding.model.is_none() {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    match config.llm.provider.as_str() {
        "disabled" | "gemini" => {}
        other => anyhow::bail!("Unknown LLM provider: '{}'. Must be disabled or gemini.", other),
    }

    if config.cache.enabled && config.cache.ttl_secs == 0 {
        anyhow::bail!("cache.ttl_secs must be > 0 when the cache is enabled");
    }

    Ok(())
}
