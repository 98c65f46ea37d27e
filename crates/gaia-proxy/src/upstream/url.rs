//! Upstream endpoint resolution
//!
//! The configured endpoint is a template that may embed the assistant id in
//! its path (`.../assistants/{assistantid}/chat/completions`).

use url::Url;

use crate::config::UpstreamConfig;
use crate::error::{GaiaError, Result};

/// Placeholder substituted with the assistant id
pub const ASSISTANT_PLACEHOLDER: &str = "{assistantid}";

/// Resolves the URL each attempt is POSTed to
#[derive(Debug, Clone)]
pub struct UrlResolver {
    template: String,
    assistant_template: String,
    default_assistant_id: Option<String>,
}

impl UrlResolver {
    pub fn new(
        template: impl Into<String>,
        assistant_template: impl Into<String>,
        default_assistant_id: Option<String>,
    ) -> Self {
        Self {
            template: template.into(),
            assistant_template: assistant_template.into(),
            default_assistant_id: default_assistant_id.filter(|id| !id.trim().is_empty()),
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self::new(
            config.base_url.clone(),
            config.assistant_url_template.clone(),
            config.default_assistant_id.clone(),
        )
    }

    pub fn default_assistant_id(&self) -> Option<&str> {
        self.default_assistant_id.as_deref()
    }

    /// Call-site id if non-blank, else the configured default
    pub fn effective_assistant_id<'a>(&'a self, assistant_id: Option<&'a str>) -> Option<&'a str> {
        assistant_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .or(self.default_assistant_id.as_deref())
    }

    /// Resolve the endpoint for one call
    ///
    /// # Errors
    /// * `MissingParameter` - the template needs an assistant id and none is available
    /// * `InvalidRequest` - the id is a dot segment (`.` or `..`)
    /// * `Config` - the substituted URL still has braces or is not http(s)
    pub fn resolve(&self, assistant_id: Option<&str>) -> Result<Url> {
        let call_site_id = assistant_id.map(str::trim).filter(|id| !id.is_empty());

        let resolved = if self.template.contains(ASSISTANT_PLACEHOLDER) {
            let id = self.effective_assistant_id(call_site_id).ok_or_else(|| {
                GaiaError::MissingParameter(
                    "assistantid is required by the configured upstream URL".to_string(),
                )
            })?;
            self.template.replace(ASSISTANT_PLACEHOLDER, &path_segment(id)?)
        } else if let Some(id) = call_site_id {
            // A fixed URL cannot address the requested assistant; use the
            // per-assistant template instead.
            if self.assistant_template.contains(ASSISTANT_PLACEHOLDER) {
                self.assistant_template
                    .replace(ASSISTANT_PLACEHOLDER, &path_segment(id)?)
            } else {
                tracing::warn!(
                    "Assistant template has no {ASSISTANT_PLACEHOLDER} placeholder, using base URL"
                );
                self.template.clone()
            }
        } else {
            self.template.clone()
        };

        validate_url(&resolved)
    }
}

/// Encode an assistant id so it stays inside one path segment
fn path_segment(id: &str) -> Result<String> {
    if id == "." || id == ".." {
        return Err(GaiaError::InvalidRequest(format!(
            "assistantid '{id}' is not a valid path segment"
        )));
    }
    Ok(urlencoding::encode(id).into_owned())
}

fn validate_url(candidate: &str) -> Result<Url> {
    if candidate.contains('{') || candidate.contains('}') {
        return Err(GaiaError::Config(format!(
            "Upstream URL has unresolved placeholders: {candidate}"
        )));
    }

    let url = Url::parse(candidate)
        .map_err(|e| GaiaError::Config(format!("Invalid upstream URL '{candidate}': {e}")))?;

    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(GaiaError::Config(format!(
            "Unsupported URL scheme '{scheme}': only http and https are allowed"
        )));
    }

    Ok(url)
}
