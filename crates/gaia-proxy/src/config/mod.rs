use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::catalog::{IfuEntry, builtin_catalog};
use crate::error::{GaiaError, Result};
use crate::votes::default_vote_file;

/// Default upstream endpoint; `{assistantid}` is substituted per call
pub const DEFAULT_ASSISTANT_URL_TEMPLATE: &str =
    "https://api.gaia.draeger.net/api/assistants/{assistantid}/chat/completions";

/// Main configuration structure for the proxy
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Inbound HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream assistant service configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Payload logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Inbound HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:9000")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Comma-separated allowed CORS origins, "*" for any
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
    /// System prompt used when a chat request does not carry one
    #[serde(default = "default_system_prompt")]
    pub default_system_prompt: String,
    /// Document filter applied to chat requests that do not carry one
    #[serde(default)]
    pub default_document_filter: Option<String>,
    /// Where vote totals are stored; defaults to the user data directory
    #[serde(default)]
    pub vote_file: Option<PathBuf>,
    /// Device models served by `/get_ifu`
    #[serde(default = "builtin_catalog")]
    pub ifu_catalog: Vec<IfuEntry>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            cors_origins: default_cors_origins(),
            default_system_prompt: default_system_prompt(),
            default_document_filter: None,
            vote_file: None,
            ifu_catalog: builtin_catalog(),
        }
    }
}

impl ServerConfig {
    /// Configured vote file or the default location
    pub fn vote_path(&self) -> PathBuf {
        self.vote_file.clone().unwrap_or_else(default_vote_file)
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:9000".to_string()
}

fn default_cors_origins() -> String {
    "*".to_string()
}

fn default_system_prompt() -> String {
    "你是一个有帮助的助手，请用简洁中文回答。".to_string()
}

/// Upstream assistant service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Endpoint URL template, may contain `{assistantid}`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Template used when the caller names an assistant but `base_url` has no placeholder
    #[serde(default = "default_base_url")]
    pub assistant_url_template: String,
    /// Model name sent in bare-model mode
    #[serde(default = "default_model")]
    pub model: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum number of attempts per call
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,
    /// Backoff base; attempt `n` waits `backoff_base^n` seconds
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,
    /// Token ceiling of one logical upstream session
    #[serde(default = "default_session_token_limit")]
    pub session_token_limit: u64,
    /// Response cap sent as `max_tokens` and reserved per call
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: u64,
    /// Text returned when every attempt failed transiently
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    /// Bearer token for the upstream
    #[serde(default)]
    pub api_key: String,
    /// Fixed session id; generated once per process when absent
    #[serde(default)]
    pub session_id: Option<String>,
    /// Assistant used when a call does not name one
    #[serde(default)]
    pub default_assistant_id: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            assistant_url_template: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            max_retry: default_max_retry(),
            backoff_base: default_backoff_base(),
            session_token_limit: default_session_token_limit(),
            max_response_tokens: default_max_response_tokens(),
            placeholder: default_placeholder(),
            api_key: String::new(),
            session_id: None,
            default_assistant_id: None,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_ASSISTANT_URL_TEMPLATE.to_string()
}

fn default_model() -> String {
    "GPT 4.1".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retry() -> u32 {
    3
}

fn default_backoff_base() -> f64 {
    1.5
}

fn default_session_token_limit() -> u64 {
    120_000
}

fn default_max_response_tokens() -> u64 {
    102_400
}

fn default_placeholder() -> String {
    "对不起，服务繁忙，请稍后再试。".to_string()
}

/// Payload logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log request payloads and returned contents
    #[serde(default = "default_log_payloads")]
    pub log_payloads: bool,
    /// Clip logged payloads to this many characters
    #[serde(default = "default_max_log_chars")]
    pub max_log_chars: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_payloads: default_log_payloads(),
            max_log_chars: default_max_log_chars(),
        }
    }
}

fn default_log_payloads() -> bool {
    true
}

fn default_max_log_chars() -> usize {
    2000
}

impl Config {
    /// Load from a TOML file, or from the default locations, or fall back to defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".gaia").join("config.toml")),
            dirs::config_dir().map(|c| c.join("gaia-proxy").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GaiaError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| GaiaError::Config(format!("Failed to parse config: {e}")))
    }

    /// Overlay values from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable lookup
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GAIA_BASE_URL") {
            self.upstream.base_url = v;
        }
        if let Some(v) = get("GAIA_ASSISTANT_URL") {
            self.upstream.assistant_url_template = v;
        }
        if let Some(v) = get("GAIA_MODEL") {
            self.upstream.model = v;
        }
        if let Some(v) = get("GAIA_TIMEOUT") {
            self.upstream.timeout_secs = parse_env("GAIA_TIMEOUT", &v)?;
        }
        if let Some(v) = get("GAIA_MAX_RETRY") {
            self.upstream.max_retry = parse_env("GAIA_MAX_RETRY", &v)?;
        }
        if let Some(v) = get("GAIA_BACKOFF_BASE") {
            self.upstream.backoff_base = parse_env("GAIA_BACKOFF_BASE", &v)?;
        }
        if let Some(v) = get("GAIA_SESSION_TOKEN_LIMIT") {
            self.upstream.session_token_limit = parse_env("GAIA_SESSION_TOKEN_LIMIT", &v)?;
        }
        if let Some(v) = get("GAIA_MAX_RESPONSE_TOKENS") {
            self.upstream.max_response_tokens = parse_env("GAIA_MAX_RESPONSE_TOKENS", &v)?;
        }
        if let Some(v) = get("GAIA_PLACEHOLDER") {
            self.upstream.placeholder = v;
        }
        if let Some(v) = get("GAIA_API_KEY") {
            self.upstream.api_key = v;
        }
        if let Some(v) = get("GAIA_SESSION_ID") {
            self.upstream.session_id = Some(v);
        }
        if let Some(v) = get("GAIA_ASSISTANT_ID") {
            self.upstream.default_assistant_id = Some(v);
        }
        if let Some(v) = get("GAIA_LOG_PAYLOADS") {
            self.logging.log_payloads = parse_flag(&v);
        }
        if let Some(v) = get("GAIA_MAX_LOG_CHARS") {
            self.logging.max_log_chars = parse_env("GAIA_MAX_LOG_CHARS", &v)?;
        }
        if let Some(v) = get("GAIA_LISTEN_ADDR") {
            self.server.listen_addr = v;
        }
        if let Some(v) = get("CORS_ORIGINS") {
            self.server.cors_origins = v;
        }
        if let Some(v) = get("DEFAULT_SYSTEM_PROMPT") {
            self.server.default_system_prompt = v;
        }
        if let Some(v) = get("GAIA_DOCUMENT_FILTER") {
            self.server.default_document_filter = Some(v);
        }
        if let Some(v) = get("GAIA_VOTE_FILE") {
            self.server.vote_file = Some(PathBuf::from(v));
        }

        Ok(())
    }

    /// Reject settings the orchestrator cannot work with
    pub fn validate(&self) -> Result<()> {
        let upstream = &self.upstream;
        if upstream.max_retry == 0 {
            return Err(GaiaError::Config("max_retry must be at least 1".into()));
        }
        if upstream.backoff_base.is_nan() || upstream.backoff_base < 1.0 {
            return Err(GaiaError::Config(format!(
                "backoff_base must be >= 1.0, got {}",
                upstream.backoff_base
            )));
        }
        if upstream.max_response_tokens >= upstream.session_token_limit {
            return Err(GaiaError::Config(format!(
                "max_response_tokens ({}) must be below session_token_limit ({})",
                upstream.max_response_tokens, upstream.session_token_limit
            )));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| GaiaError::Config(format!("Invalid value for {key} ('{value}'): {e}")))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
