//! Configuration parsing and validation.
//!
//! The store is configured through a TOML file (default
//! `config/awr.toml`). Every section has defaults, so an empty file is a
//! valid configuration that uses the `disabled` embedding provider.
//!
//! ```toml
//! [store]
//! path = "./data/vectors.sqlite"
//!
//! [embedding]
//! provider = "hash"
//! dims = 384
//!
//! [retrieval]
//! default_limit = 5
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PROVIDERS: &[&str] = &["disabled", "hash", "ollama", "openai", "local"];

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            timeout_secs: default_store_timeout_secs(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/vectors.sqlite")
}
fn default_store_timeout_secs() -> u64 {
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
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Prepended to query text before embedding.
    #[serde(default)]
    pub query_prefix: String,
    /// Prepended to document text before embedding.
    #[serde(default)]
    pub document_prefix: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            query_prefix: String::new(),
            document_prefix: String::new(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_limit_per_collection")]
    pub limit_per_collection: usize,
    #[serde(default = "default_template_example_limit")]
    pub template_example_limit: usize,
    #[serde(default = "default_threat_info_limit")]
    pub threat_info_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            limit_per_collection: default_limit_per_collection(),
            template_example_limit: default_template_example_limit(),
            threat_info_limit: default_threat_info_limit(),
        }
    }
}

fn default_limit() -> usize {
    awareness_retrieval_core::search::DEFAULT_LIMIT
}
fn default_limit_per_collection() -> usize {
    3
}
fn default_template_example_limit() -> usize {
    2
}
fn default_threat_info_limit() -> usize {
    2
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

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeBaseConfig {
    #[serde(default = "default_kb_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            root: default_kb_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_kb_root() -> PathBuf {
    PathBuf::from("./data/documents")
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.json".to_string(),
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
    ]
}

impl Config {
    /// Defaults for commands that run without a config file.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.store.timeout_secs == 0 {
            anyhow::bail!("store.timeout_secs must be > 0");
        }

        if self.retrieval.default_limit < 1 {
            anyhow::bail!("retrieval.default_limit must be >= 1");
        }
        if self.retrieval.limit_per_collection < 1 {
            anyhow::bail!("retrieval.limit_per_collection must be >= 1");
        }
        if self.retrieval.template_example_limit < 1 {
            anyhow::bail!("retrieval.template_example_limit must be >= 1");
        }
        if self.retrieval.threat_info_limit < 1 {
            anyhow::bail!("retrieval.threat_info_limit must be >= 1");
        }

        if !PROVIDERS.contains(&self.embedding.provider.as_str()) {
            anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be one of: {}.",
                self.embedding.provider,
                PROVIDERS.join(", ")
            );
        }
        if self.embedding.is_enabled() {
            if self.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.timeout_secs == 0 {
                anyhow::bail!("embedding.timeout_secs must be > 0");
            }
            if self.embedding.batch_size == 0 {
                anyhow::bail!("embedding.batch_size must be > 0");
            }
        }
        if matches!(self.embedding.provider.as_str(), "ollama" | "openai")
            && self.embedding.model.is_none()
        {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                self.embedding.provider
            );
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load `path` if it exists, else fall back to [`Config::minimal`].
pub fn load_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}
