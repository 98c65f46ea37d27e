//! Upstream session identity and connection handling
//!
//! The session id is fixed for the lifetime of the process. Rolling the
//! session over only replaces the HTTP client (and its connection pool);
//! requests already in flight keep the client handle they started with.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;

use crate::config::UpstreamConfig;
use crate::error::{GaiaError, Result};

/// Maximum length for session IDs
const MAX_SESSION_ID_LEN: usize = 128;

/// Header carrying the session id on every upstream request
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Errors that can occur during session ID validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionIdError {
    /// Session ID is empty
    #[error("Session ID cannot be empty")]
    Empty,

    /// Session ID contains invalid characters
    #[error("Session ID contains invalid characters: only visible ASCII is allowed")]
    InvalidChars,

    /// Session ID exceeds maximum length
    #[error("Session ID exceeds maximum length of {MAX_SESSION_ID_LEN} characters")]
    TooLong,
}

/// A validated session ID
///
/// Session IDs must be non-empty, at most 128 characters, and contain only
/// visible ASCII (no whitespace or control characters) so they are always a
/// valid header value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Fresh random id (32 lowercase hex chars)
    pub fn generate() -> Self {
        SessionId(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Configured id if present, otherwise a generated one
    pub fn from_config(configured: Option<&str>) -> Result<Self> {
        match configured {
            Some(id) => SessionId::try_from(id)
                .map_err(|e| GaiaError::Config(format!("Invalid session id '{id}': {e}"))),
            None => Ok(SessionId::generate()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> std::result::Result<(), SessionIdError> {
        if s.is_empty() {
            return Err(SessionIdError::Empty);
        }

        if s.len() > MAX_SESSION_ID_LEN {
            return Err(SessionIdError::TooLong);
        }

        if !s.chars().all(|c| c.is_ascii_graphic()) {
            return Err(SessionIdError::InvalidChars);
        }

        Ok(())
    }
}

impl TryFrom<&str> for SessionId {
    type Error = SessionIdError;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        Self::validate(value)?;
        Ok(SessionId(value.to_string()))
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One live upstream session: a configured HTTP client plus its identity
#[derive(Debug, Clone)]
pub struct UpstreamSession {
    client: reqwest::Client,
    session_id: SessionId,
    generation: u64,
}

impl UpstreamSession {
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// How many times the session has been rolled over before this one
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Owns the current upstream session and rebuilds it on rollover
pub struct SessionManager {
    api_key: String,
    session_id: SessionId,
    timeout: Duration,
    current: UpstreamSession,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("api_key_len", &self.api_key.len())
            .field("session_id", &self.session_id)
            .field("timeout", &self.timeout)
            .field("generation", &self.current.generation)
            .finish()
    }
}

impl SessionManager {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let session_id = SessionId::from_config(config.session_id.as_deref())?;
        let timeout = Duration::from_secs(config.timeout_secs);

        if config.api_key.is_empty() {
            tracing::warn!("GAIA_API_KEY is not set; upstream requests will likely fail with 401");
        } else {
            tracing::info!(
                key_len = config.api_key.len(),
                session_id = %session_id,
                "Upstream auth configured"
            );
        }

        let client = build_client(&config.api_key, &session_id, timeout)?;
        Ok(Self {
            api_key: config.api_key.clone(),
            session_id: session_id.clone(),
            timeout,
            current: UpstreamSession {
                client,
                session_id,
                generation: 0,
            },
        })
    }

    /// Snapshot of the live session
    pub fn current(&self) -> UpstreamSession {
        self.current.clone()
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Drop the current client and build a fresh one with the same identity
    pub fn reset(&mut self) -> Result<UpstreamSession> {
        let client = build_client(&self.api_key, &self.session_id, self.timeout)?;
        let generation = self.current.generation + 1;
        // Replacing the slot releases our handle on the old pool; clones held
        // by in-flight requests stay valid until they finish.
        self.current = UpstreamSession {
            client,
            session_id: self.session_id.clone(),
            generation,
        };
        tracing::info!(generation, session_id = %self.session_id, "Upstream session reset");
        Ok(self.current.clone())
    }
}

/// Static headers applied to every request of a session
pub fn default_headers(api_key: &str, session_id: &SessionId) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    if !api_key.is_empty() {
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| GaiaError::Config(format!("API key is not a valid header value: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
    }

    let session_value = HeaderValue::from_str(session_id.as_str())
        .map_err(|e| GaiaError::Config(format!("Session id is not a valid header value: {e}")))?;
    headers.insert(HeaderName::from_static(SESSION_ID_HEADER), session_value);
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );

    Ok(headers)
}

fn build_client(api_key: &str, session_id: &SessionId, timeout: Duration) -> Result<reqwest::Client> {
    // Per-read timeout rather than a whole-request deadline: a healthy stream
    // may run far longer than `timeout` in total.
    reqwest::Client::builder()
        .default_headers(default_headers(api_key, session_id)?)
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
        .map_err(|e| GaiaError::Proxy(format!("Failed to create HTTP client: {e}")))
}
