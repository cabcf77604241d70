//! Configuration management for DocBuddy
//!
//! Provides TOML-based configuration with defaults and validation.
//! Location: ~/.docbuddy/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::agent::WorkflowConfig;
use crate::errors::{DocError, Result};
use crate::models::DEFAULT_MODEL;
use crate::rag::embedding::{DEFAULT_EMBEDDING_MODEL, DEFAULT_HASH_DIM};
use crate::rag::{ChunkerConfig, SearchParams};

/// Log levels accepted in `[logging] level`
const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Complete configuration for DocBuddy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ollama: OllamaConfig,
    pub workflow: WorkflowConfig,
    pub corpus: CorpusConfig,
    pub logging: LoggingConfig,
}

/// Ollama connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub host: String,
    pub port: u16,
    /// Generation model used by the planner and synthesizer
    pub model: String,
    /// Embedding model; empty means offline hashing embeddings
    pub embedding_model: String,
    pub timeout_secs: u64,
}

/// Where chunks are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorpusBackend {
    Memory,
    Qdrant,
}

/// Corpus store and ingestion configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub backend: CorpusBackend,
    pub qdrant_url: String,
    pub collection: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_dim: usize,
    /// Files or directories ingested at startup
    pub documents: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 11434,
            model: DEFAULT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            timeout_secs: 120,
        }
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        let chunker = ChunkerConfig::default();
        Self {
            backend: CorpusBackend::Memory,
            qdrant_url: "http://localhost:6334".to_string(),
            collection: "docbuddy".to_string(),
            chunk_size: chunker.chunk_size,
            chunk_overlap: chunker.chunk_overlap,
            embedding_dim: DEFAULT_HASH_DIM,
            documents: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(&config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DocError::Config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Load default configuration from standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(Config::default())
    }

    /// Standard config location
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".docbuddy").join("config.toml"))
    }

    /// Apply environment overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    ///
    /// Recognized keys: OLLAMA_HOST (`host`, `host:port` or a URL),
    /// OLLAMA_MODEL, EMBEDDING_MODEL, QDRANT_URL.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("OLLAMA_HOST").filter(|v| !v.trim().is_empty()) {
            let (host, port) = parse_host(&host)?;
            self.ollama.host = host;
            if let Some(port) = port {
                self.ollama.port = port;
            }
        }

        if let Some(model) = lookup("OLLAMA_MODEL").filter(|v| !v.trim().is_empty()) {
            self.ollama.model = model;
        }

        if let Some(model) = lookup("EMBEDDING_MODEL") {
            self.ollama.embedding_model = model.trim().to_string();
        }

        if let Some(url) = lookup("QDRANT_URL").filter(|v| !v.trim().is_empty()) {
            self.corpus.qdrant_url = url;
            self.corpus.backend = CorpusBackend::Qdrant;
        }

        self.validate()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.workflow.validate()?;

        if self.corpus.chunk_size == 0 {
            return Err(DocError::Config(
                "chunk_size must be greater than 0".to_string(),
            ));
        }

        if self.corpus.chunk_overlap >= self.corpus.chunk_size {
            return Err(DocError::Config(
                "chunk_overlap must be less than chunk_size".to_string(),
            ));
        }

        if self.corpus.embedding_dim == 0 {
            return Err(DocError::Config(
                "embedding_dim must be greater than 0".to_string(),
            ));
        }

        if self.ollama.timeout_secs == 0 {
            return Err(DocError::Config(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(DocError::Config(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &PathBuf) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| DocError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DocError::Config(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| DocError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Get Ollama base URL
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.ollama.host, self.ollama.port)
    }

    pub fn ollama_timeout(&self) -> Duration {
        Duration::from_secs(self.ollama.timeout_secs)
    }

    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            chunk_size: self.corpus.chunk_size,
            chunk_overlap: self.corpus.chunk_overlap,
        }
    }

    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            top_k: self.workflow.top_k,
            min_score: self.workflow.min_score,
        }
    }

    /// Startup document paths with tildes expanded
    pub fn document_paths(&self) -> Vec<PathBuf> {
        self.corpus
            .documents
            .iter()
            .map(|p| Self::expand_path(p))
            .collect()
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }
}

/// Split an OLLAMA_HOST value into host and optional port
fn parse_host(value: &str) -> Result<(String, Option<u16>)> {
    let trimmed = value.trim();
    let without_scheme = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    match without_scheme.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| DocError::Config(format!("Invalid port in OLLAMA_HOST: {}", value)))?;
            Ok((host.to_string(), Some(port)))
        }
        None => Ok((without_scheme.to_string(), None)),
    }
}
