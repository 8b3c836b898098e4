//! Configuration loading, validation, and management for LysAI.
//!
//! Loads configuration from `~/.lysai/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.lysai/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Decision loop settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Reasoning backends, retry and failover
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Episodic store and similarity index
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Remote tool server
    #[serde(default)]
    pub tool_server: ToolServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Iteration budget per run
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Temperature for next-action decisions
    #[serde(default = "default_decision_temperature")]
    pub decision_temperature: f32,

    /// History records the loop detector inspects
    #[serde(default = "default_loop_window")]
    pub loop_window: usize,

    /// Identical consecutive decisions that count as a loop
    #[serde(default = "default_loop_threshold")]
    pub loop_threshold: usize,

    /// Reflection attempts allowed before the fallback gives up
    #[serde(default = "default_max_reflections")]
    pub max_reflections: usize,
}

fn default_max_steps() -> u32 {
    10
}
fn default_decision_temperature() -> f32 {
    0.1
}
fn default_loop_window() -> usize {
    5
}
fn default_loop_threshold() -> usize {
    3
}
fn default_max_reflections() -> usize {
    2
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            decision_temperature: default_decision_temperature(),
            loop_window: default_loop_window(),
            loop_threshold: default_loop_threshold(),
            max_reflections: default_max_reflections(),
        }
    }
}

/// One reasoning backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Provider name ("openrouter", "openai", "gemini", "ollama", ...)
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the provider's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "google/gemini-2.0-flash-001".into()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            api_url: None,
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub primary: BackendConfig,

    /// Failover target; no failover when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<BackendConfig>,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base; attempt `n` waits `base_delay_ms * 2^n`
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Per-call timeout inside the retry loop
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Answer from the canned heuristic responder when every backend is
    /// rate limited
    #[serde(default = "default_true")]
    pub heuristic_on_exhaustion: bool,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    800
}
fn default_call_timeout_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            primary: BackendConfig::default(),
            secondary: None,
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            call_timeout_secs: default_call_timeout_secs(),
            heuristic_on_exhaustion: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// SQLite database path; `~/.lysai/memory.db` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,

    /// Similarity index backend: "sqlite" or "none"
    #[serde(default = "default_index")]
    pub index: String,

    /// Embedding backend: "hashing" (offline) or "provider"
    #[serde(default = "default_embedder")]
    pub embedder: String,

    /// Model used when `embedder = "provider"`
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Vector size for the hashing embedder
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

fn default_index() -> String {
    "sqlite".into()
}
fn default_embedder() -> String {
    "hashing".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_dimensions() -> usize {
    256
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            index: default_index(),
            embedder: default_embedder(),
            embedding_model: default_embedding_model(),
            dimensions: default_dimensions(),
        }
    }
}

impl MemoryConfig {
    /// The database path, falling back to the config directory.
    pub fn resolved_db_path(&self) -> PathBuf {
        match &self.db_path {
            Some(path) => PathBuf::from(path),
            None => AppConfig::config_dir().join("memory.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    /// MCP endpoint URL
    #[serde(default = "default_tool_server_url")]
    pub url: String,

    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_tool_server_url() -> String {
    "http://localhost:8000/mcp".into()
}
fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            url: default_tool_server_url(),
            timeout_secs: default_tool_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.lysai/config.toml).
    ///
    /// Also checks environment variables:
    /// - `LYSAI_API_KEY`, then `OPENROUTER_API_KEY`, then `OPENAI_API_KEY`
    ///   (primary backend key, when the file sets none)
    /// - `LYSAI_PROVIDER`, `LYSAI_MODEL` (primary backend)
    /// - `LYSAI_MEMORY_DB`, `LYSAI_TOOL_SERVER_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (usually `std::env::var`).
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.oracle.primary.api_key.is_none() {
            self.oracle.primary.api_key = lookup("LYSAI_API_KEY")
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("LYSAI_PROVIDER") {
            self.oracle.primary.provider = provider;
        }

        if let Some(model) = lookup("LYSAI_MODEL") {
            self.oracle.primary.model = model;
        }

        if let Some(db) = lookup("LYSAI_MEMORY_DB") {
            self.memory.db_path = Some(db);
        }

        if let Some(url) = lookup("LYSAI_TOOL_SERVER_URL") {
            self.tool_server.url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".lysai")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let orch = &self.orchestrator;
        if orch.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_steps must be at least 1".into(),
            ));
        }

        if !(0.0..=2.0).contains(&orch.decision_temperature) {
            return Err(ConfigError::ValidationError(
                "orchestrator.decision_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if orch.loop_threshold < 2 || orch.loop_threshold > orch.loop_window {
            return Err(ConfigError::ValidationError(
                "orchestrator.loop_threshold must be >= 2 and <= loop_window".into(),
            ));
        }

        if self.oracle.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "oracle.max_retries must be at least 1".into(),
            ));
        }

        if self.oracle.call_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "oracle.call_timeout_secs must be > 0".into(),
            ));
        }

        if !matches!(self.memory.index.as_str(), "sqlite" | "none") {
            return Err(ConfigError::ValidationError(format!(
                "memory.index must be \"sqlite\" or \"none\", got \"{}\"",
                self.memory.index
            )));
        }

        if !matches!(self.memory.embedder.as_str(), "hashing" | "provider") {
            return Err(ConfigError::ValidationError(format!(
                "memory.embedder must be \"hashing\" or \"provider\", got \"{}\"",
                self.memory.embedder
            )));
        }

        if self.memory.dimensions == 0 {
            return Err(ConfigError::ValidationError(
                "memory.dimensions must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if the primary backend has an API key.
    pub fn has_api_key(&self) -> bool {
        self.oracle.primary.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
