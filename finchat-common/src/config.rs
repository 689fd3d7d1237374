//! Configuration management for finchat services.
//!
//! The gateway reads a single JSON file at `~/.finchat/config.json`. Every field is
//! optional; missing sections fall back to defaults.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (FINCHAT_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `FINCHAT_CONFIG` → path of the config file itself
//! - `FINCHAT_HOST` → server.host
//! - `FINCHAT_PORT` → server.port
//! - `FINCHAT_MODEL` → model.model
//! - `FINCHAT_MODEL_BASE_URL` → model.base_url
//! - `FINCHAT_LOG_LEVEL` → observability.log_level
//! - `FINCHAT_LOG_FORMAT` → observability.log_format
//!
//! The Gemini API key is resolved by the provider itself (`model.api_key`, then
//! `GEMINI_API_KEY`, then `GOOGLE_API_KEY`).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, ResultExt};
use crate::validation::Validate;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".finchat"),
        |dirs| dirs.home_dir().join(".finchat"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    std::env::var("FINCHAT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("config.json"))
}

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address. Default: "0.0.0.0"
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port. Default: 8000
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8000
}

// ============================================================================
// Model Configuration
// ============================================================================

/// Generative model (Gemini) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// API key. Falls back to GEMINI_API_KEY / GOOGLE_API_KEY when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model name, with or without the `models/` prefix
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL
    #[serde(default = "default_model_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,

    /// Sampling temperature; provider default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Output token cap; provider default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<i64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_model_base_url(),
            timeout_secs: default_model_timeout(),
            temperature: None,
            max_output_tokens: None,
        }
    }
}

fn default_model() -> String {
    "gemini-2.5-pro".into()
}

fn default_model_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}

fn default_model_timeout() -> u64 {
    120
}

// ============================================================================
// Chat Configuration
// ============================================================================

/// Conversation handling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Number of most recent turns sent to the model
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,

    /// Session id used when a request omits one
    #[serde(default = "default_session_id")]
    pub default_session_id: String,

    /// Upper bound on live sessions (least recently used evicted first).
    /// Unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sessions: Option<usize>,

    /// Replaces the built-in finance assistant persona
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            context_turns: default_context_turns(),
            default_session_id: default_session_id(),
            max_sessions: None,
            system_prompt: None,
        }
    }
}

fn default_context_turns() -> usize {
    6
}

fn default_session_id() -> String {
    "default".into()
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets pinned to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Generative model
    #[serde(default)]
    pub model: ModelConfig,

    /// Conversation handling
    #[serde(default)]
    pub chat: ChatConfig,

    /// Logging
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// What happened while loading the configuration.
///
/// Loading runs before the subscriber is installed, so anything worth reporting
/// is collected here and logged by the caller once logging is up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Path that was looked up.
    pub path: PathBuf,
    /// Whether the file existed and was read.
    pub from_file: bool,
    /// Overrides that were ignored.
    pub warnings: Vec<String>,
}

impl LoadReport {
    /// Emit the collected notes.
    pub fn log(&self) {
        if self.from_file {
            tracing::info!("Loaded config from {}", self.path.display());
        } else {
            tracing::info!(
                "Config file not found at {}, using defaults",
                self.path.display()
            );
        }
        for warning in &self.warnings {
            tracing::warn!("{warning}");
        }
    }
}

impl Config {
    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load the default config file, apply `FINCHAT_*` overrides and validate.
    pub fn load_with_env() -> Result<(Self, LoadReport)> {
        Self::resolve(&config_path(), |key| std::env::var(key).ok())
    }

    /// Load `path` (defaults when it does not exist), apply overrides from
    /// `lookup` and validate the result.
    pub fn resolve<F>(path: &Path, lookup: F) -> Result<(Self, LoadReport)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let from_file = path.exists();
        let mut config = if from_file {
            Self::load_from(path)?
        } else {
            Self::default()
        };

        let warnings = config.apply_overrides_from(lookup);
        config.validate()?;

        let report = LoadReport {
            path: path.to_path_buf(),
            from_file,
            warnings,
        };
        Ok((config, report))
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Returns one message per override that could not be applied.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();

        if let Some(host) = lookup("FINCHAT_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("FINCHAT_PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => warnings.push(format!(
                    "Ignoring invalid FINCHAT_PORT {port:?}, keeping port {}",
                    self.server.port
                )),
            }
        }

        if let Some(model) = lookup("FINCHAT_MODEL") {
            self.model.model = model;
        }
        if let Some(url) = lookup("FINCHAT_MODEL_BASE_URL") {
            self.model.base_url = url;
        }

        if let Some(level) = lookup("FINCHAT_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("FINCHAT_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        warnings
    }
}
