//! Error types for the Gaia proxy

use axum::http::StatusCode;
use thiserror::Error;

/// Main error type for proxy and upstream operations
#[derive(Error, Debug)]
pub enum GaiaError {
    /// Server-side configuration problems (bad URL template, invalid values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A parameter the caller must supply was absent (e.g. assistant id)
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    /// Malformed client input
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream rejected our credentials (HTTP 401/403)
    #[error("Upstream authorization failed (HTTP {status}); check GAIA_API_KEY and permissions")]
    Unauthorized { status: u16 },

    /// Upstream returned a non-retryable HTTP status
    #[error("Upstream returned HTTP {status}")]
    UpstreamStatus { status: u16, body: String },

    /// Connection, timeout or body-read failures
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream body did not match any known response shape
    #[error("Unexpected upstream response format: {0}")]
    ResponseFormat(String),

    /// Server lifecycle errors (bind, serve)
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GaiaError {
    /// HTTP status this error should surface as to downstream clients
    pub fn status_code(&self) -> StatusCode {
        match self {
            GaiaError::MissingParameter(_) | GaiaError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            GaiaError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            GaiaError::Config(_) | GaiaError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short machine-readable error category
    pub fn error_type(&self) -> &'static str {
        match self {
            GaiaError::Config(_) => "configuration_error",
            GaiaError::MissingParameter(_) => "missing_parameter",
            GaiaError::InvalidRequest(_) => "invalid_request_error",
            GaiaError::Unauthorized { .. } => "upstream_unauthorized",
            GaiaError::UpstreamStatus { .. } => "upstream_error",
            GaiaError::Network(_) => "network_error",
            GaiaError::ResponseFormat(_) => "response_format_error",
            GaiaError::Proxy(_) | GaiaError::Io(_) | GaiaError::Serialization(_) => "proxy_error",
        }
    }
}

impl From<serde_json::Error> for GaiaError {
    fn from(e: serde_json::Error) -> Self {
        GaiaError::Serialization(e.to_string())
    }
}

/// Result type alias for Gaia proxy operations
pub type Result<T> = std::result::Result<T, GaiaError>;
