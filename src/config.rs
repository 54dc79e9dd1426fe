use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::cache::{DEFAULT_CLEANUP_THRESHOLD, DEFAULT_LIST_CAPACITY};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>, // For OpenAI-compatible APIs

    /// Optional: Override max_tokens for LLM requests
    /// If not specified, uses provider-specific defaults:
    /// - anthropic: 4096
    /// - openai: 4096
    /// - openai-compatible (ollama): 16384
    /// - gemini: 8192
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// HTTP request timeout in seconds (default: 120)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Get max_tokens value, using provider-specific default if not specified
    pub fn get_max_tokens(&self) -> u32 {
        if let Some(tokens) = self.max_tokens {
            return tokens;
        }

        match self.provider.as_str() {
            "anthropic" => 4096,
            "openai" => 4096,
            "openai-compatible" => 16384, // ollama and similar
            "gemini" => 8192,
            _ => 4096,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: Some("AI_API_KEY".to_string()),
            base_url: None,
            max_tokens: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Limits and storage location for narrative memory files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Directory holding `<title>_memory.json` files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Max tracked entities (characters, threads, ...) per tracking map
    #[serde(default = "default_entity_capacity")]
    pub entity_capacity: usize,

    /// Max tracked chapters per chapter-keyed map
    #[serde(default = "default_chapter_capacity")]
    pub chapter_capacity: usize,

    /// Fill ratio that triggers a batch cleanup (default: 0.9)
    #[serde(default = "default_cleanup_threshold")]
    pub cleanup_threshold: f64,

    /// Max items kept in one chapter's list (questions, events, ...)
    #[serde(default = "default_max_items_per_chapter")]
    pub max_items_per_chapter: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            entity_capacity: default_entity_capacity(),
            chapter_capacity: default_chapter_capacity(),
            cleanup_threshold: default_cleanup_threshold(),
            max_items_per_chapter: default_max_items_per_chapter(),
        }
    }
}

impl MemoryConfig {
    /// Reject limits that would make every insert evict.
    pub fn validate(&self) -> Result<()> {
        if self.entity_capacity == 0 || self.chapter_capacity == 0 {
            bail!("memory capacities must be greater than zero");
        }
        if self.max_items_per_chapter == 0 {
            bail!("memory.max_items_per_chapter must be greater than zero");
        }
        if !(self.cleanup_threshold > 0.0 && self.cleanup_threshold <= 1.0) {
            bail!(
                "memory.cleanup_threshold must be in (0, 1], got {}",
                self.cleanup_threshold
            );
        }
        Ok(())
    }
}

/// Parameters for LLM-based narrative extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_extraction_temperature")]
    pub temperature: f32,

    #[serde(default = "default_extraction_max_tokens")]
    pub max_tokens: u32,

    /// Chapter text beyond this many characters is not sent to the model
    #[serde(default = "default_max_chapter_chars")]
    pub max_chapter_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            temperature: default_extraction_temperature(),
            max_tokens: default_extraction_max_tokens(),
            max_chapter_chars: default_max_chapter_chars(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("storykeeper"))
        .unwrap_or_else(|| PathBuf::from("novel_memory"))
}

fn default_entity_capacity() -> usize {
    500
}

fn default_chapter_capacity() -> usize {
    1000
}

fn default_cleanup_threshold() -> f64 {
    DEFAULT_CLEANUP_THRESHOLD
}

fn default_max_items_per_chapter() -> usize {
    DEFAULT_LIST_CAPACITY
}

fn default_extraction_temperature() -> f32 {
    0.3
}

fn default_extraction_max_tokens() -> u32 {
    4000
}

fn default_max_chapter_chars() -> usize {
    60_000
}

impl Config {
    /// Load config from working directory or user config directory
    #[allow(dead_code)]
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    /// Load configuration from a specific path, or use default search paths
    pub fn load_with_path(path: Option<String>) -> Result<Self> {
        // If explicit path provided, use it
        if let Some(config_path) = path {
            debug!("Loading config from explicit path: {}", config_path);
            return Self::load_from_path(&config_path);
        }

        // Try working directory first (per-project config)
        if let Some(config) = Self::load_if_present("storykeeper.toml")? {
            debug!("Loaded config from ./storykeeper.toml");
            return Ok(config);
        }

        // Try user config directory
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("storykeeper").join("config.toml");
            if let Some(config) = Self::load_if_present(&config_path)? {
                debug!("Loaded config from {:?}", config_path);
                return Ok(config);
            }
        }

        debug!("Using default config");
        Ok(Self::default())
    }

    fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Like `load_from_path`, but a missing file is `Ok(None)`.
    fn load_if_present<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read config {}", path.display()))
            }
        };
        Self::parse(&content)
            .map(Some)
            .with_context(|| format!("Invalid config {}", path.display()))
    }

    fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.memory.validate()?;
        Ok(config)
    }

    /// Get API key from environment variable specified in config
    pub fn get_api_key(&self) -> Result<String> {
        match &self.llm.api_key_env {
            Some(env_var) => {
                // Special case: "none" means no API key needed (e.g., Ollama)
                if env_var.to_lowercase() == "none" {
                    return Ok(String::new());
                }

                // openai-compatible: local models don't need keys, gateways do
                if self.llm.provider == "openai-compatible" {
                    return Ok(env::var(env_var).unwrap_or_default());
                }

                env::var(env_var).map_err(|_| {
                    anyhow::anyhow!("API key not found in environment variable: {}", env_var)
                })
            }
            None => Ok(String::new()),
        }
    }
}
