//! Upstream request payloads
//!
//! Three payload shapes share one wire struct; optional fields are left out
//! of the JSON entirely rather than sent as `null`.

use serde::Serialize;

use crate::error::{GaiaError, Result};

/// Sampling temperature for every call
pub const TEMPERATURE: f64 = 0.1;

/// Reasoning-effort hint sent with every call
pub const REASONING_EFFORT: &str = "low";

/// Which payload shape to send upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    /// Named model, no assistant
    BareModel,
    /// Assistant id plus our own system prompt
    Assistant,
    /// Assistant id only; the hosted assistant owns model and prompt
    AskAssistant,
}

impl CallMode {
    /// Resolve a caller-supplied mode string.
    ///
    /// Unknown or absent modes fall back to `Assistant` when an assistant id
    /// is available and `BareModel` otherwise.
    pub fn parse(mode: Option<&str>, has_assistant_id: bool) -> Self {
        let normalized = mode.map(|m| m.trim().to_lowercase());
        match normalized.as_deref() {
            Some("ask" | "ask_assistant" | "askassistant" | "ask-assistant") => {
                CallMode::AskAssistant
            }
            Some("assistant") => CallMode::Assistant,
            Some("model" | "bare" | "bare_model" | "baremodel") => CallMode::BareModel,
            _ if has_assistant_id => CallMode::Assistant,
            _ => CallMode::BareModel,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallMode::BareModel => "bare_model",
            CallMode::Assistant => "assistant",
            CallMode::AskAssistant => "ask_assistant",
        }
    }

    pub fn needs_assistant_id(&self) -> bool {
        !matches!(self, CallMode::BareModel)
    }
}

/// Chat message on the wire
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: &'static str,
    pub content: String,
}

/// Document-scope restriction for the upstream's retrieval tools
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagConfig {
    pub glob_filter: String,
}

/// JSON body POSTed to the upstream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(rename = "assistantId", skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub max_tokens: u64,
    pub stream: bool,
    pub reasoning_effort: &'static str,
    #[serde(rename = "ragConfig", skip_serializing_if = "Option::is_none")]
    pub rag_config: Option<RagConfig>,
    #[serde(skip)]
    pub mode: CallMode,
}

impl UpstreamRequest {
    pub fn user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.as_str())
    }
}

/// Append a recursive wildcard to plain container/folder filters.
///
/// Filters that already contain `*` or `?` are treated as globs and kept.
pub fn normalize_document_filter(filter: &str) -> Option<String> {
    let filter = filter.trim();
    if filter.is_empty() {
        return None;
    }
    if filter.contains('*') || filter.contains('?') {
        return Some(filter.to_string());
    }
    Some(format!("{}/**", filter.trim_end_matches('/')))
}

/// Builds payloads for a fixed model name and response cap
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    model: String,
    max_tokens: u64,
}

impl RequestBuilder {
    pub fn new(model: impl Into<String>, max_tokens: u64) -> Self {
        Self {
            model: model.into(),
            max_tokens,
        }
    }

    /// Build the payload for one attempt.
    ///
    /// `assistant_id` must already be resolved (call-site or default) for the
    /// assistant modes.
    pub fn build(
        &self,
        mode: CallMode,
        text: &str,
        system_prompt: &str,
        assistant_id: Option<&str>,
        document_filter: Option<&str>,
    ) -> Result<UpstreamRequest> {
        let user = Message {
            role: "user",
            content: text.to_string(),
        };
        let system = Message {
            role: "system",
            content: system_prompt.to_string(),
        };
        let rag_config = document_filter
            .and_then(normalize_document_filter)
            .map(|glob_filter| RagConfig { glob_filter });

        let (model, assistant_id, messages, rag_config) = match mode {
            CallMode::AskAssistant => (
                None,
                Some(require_assistant_id(mode, assistant_id)?),
                vec![user],
                None,
            ),
            CallMode::Assistant => (
                None,
                Some(require_assistant_id(mode, assistant_id)?),
                vec![system, user],
                rag_config,
            ),
            CallMode::BareModel => (Some(self.model.clone()), None, vec![system, user], rag_config),
        };

        Ok(UpstreamRequest {
            model,
            assistant_id,
            messages,
            temperature: TEMPERATURE,
            max_tokens: self.max_tokens,
            stream: true,
            reasoning_effort: REASONING_EFFORT,
            rag_config,
            mode,
        })
    }
}

fn require_assistant_id(mode: CallMode, assistant_id: Option<&str>) -> Result<String> {
    assistant_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            GaiaError::MissingParameter(format!("assistantid is required in {} mode", mode.as_str()))
        })
}
