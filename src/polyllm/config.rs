//! Router and provider configuration.
//!
//! The structs derive [`serde::Deserialize`] so callers can load them from
//! whatever format their deployment uses (JSON via `serde_json`, or any
//! other serde backend); the crate itself parses no config files.
//!
//! Validation is eager: [`RouterConfig::validate`] runs at router
//! construction. An invalid *default* provider is fatal; an invalid
//! non-default provider only disables that provider.
//!
//! # Example
//!
//! ```rust
//! use polyllm::config::RouterConfig;
//!
//! let config: RouterConfig = serde_json::from_str(r#"{
//!     "default_provider": "local",
//!     "providers": {
//!         "local": {
//!             "kind": "ollama",
//!             "base_url": "http://localhost:11434",
//!             "model": "llama3.1",
//!             "max_tokens": 2048,
//!             "temperature": 0.2
//!         }
//!     }
//! }"#).unwrap();
//! assert!(config.validate_provider("local").is_ok());
//! ```

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value as JsonValue;

/// Which adapter implementation a provider entry selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Hosted Gemini-style API (native `contents` wire format).
    Gemini,
    /// OpenAI-style chat-completions API (also fits compatible vendors).
    Openai,
    /// Locally hosted Ollama-style API; no authentication.
    Ollama,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

/// Configuration for one backend provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// API key for hosted providers. Ollama ignores it.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Endpoint override. Required for Ollama; optional for the hosted
    /// providers, which fall back to their public endpoints.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model identifier injected into every request.
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Provider-specific passthrough knobs, forwarded opaquely.
    #[serde(default)]
    pub extra: HashMap<String, JsonValue>,
}

impl ProviderConfig {
    /// Check this entry for internal consistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("model name is empty".to_string());
        }
        if self.max_tokens == 0 {
            return Err("max_tokens must be greater than zero".to_string());
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(format!(
                "temperature {} is outside [0, 1]",
                self.temperature
            ));
        }
        match self.kind {
            ProviderKind::Gemini | ProviderKind::Openai => {
                if self.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
                    return Err("api_key is required for hosted providers".to_string());
                }
            }
            ProviderKind::Ollama => {
                if self.base_url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                    return Err("base_url is required for ollama providers".to_string());
                }
            }
        }
        Ok(())
    }
}

fn default_max_tool_iterations() -> usize {
    5
}

fn default_retry_attempts() -> usize {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    200
}

/// Top-level configuration: the provider table plus routing policy knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Id of the provider new sessions bind to by default.
    pub default_provider: String,
    pub providers: HashMap<String, ProviderConfig>,
    /// Optional system prompt applied to sessions created without an
    /// explicit override.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Maximum tool-call round trips within one `send` before the router
    /// gives up with a tool-loop error.
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,
    /// Attempts per dispatch iteration for transport faults (first try
    /// included).
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
    /// Base backoff delay, doubled after each failed attempt.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl RouterConfig {
    /// Validate the named provider entry.
    pub fn validate_provider(&self, id: &str) -> Result<(), String> {
        match self.providers.get(id) {
            Some(provider) => provider.validate(),
            None => Err(format!("no provider entry named '{}'", id)),
        }
    }

    /// Validate the whole document for router construction.
    ///
    /// Returns `Err` only for structurally fatal problems: a missing or
    /// invalid default provider, an empty provider table, or a zero
    /// iteration budget. Per-provider failures of non-default entries are
    /// left to the router, which disables those providers individually.
    pub fn validate(&self) -> Result<(), String> {
        if self.providers.is_empty() {
            return Err("no providers configured".to_string());
        }
        if self.max_tool_iterations == 0 {
            return Err("max_tool_iterations must be at least 1".to_string());
        }
        if self.retry_attempts == 0 {
            return Err("retry_attempts must be at least 1".to_string());
        }
        self.validate_provider(&self.default_provider)
            .map_err(|reason| {
                format!(
                    "default provider '{}' is unusable: {}",
                    self.default_provider, reason
                )
            })
    }
}
