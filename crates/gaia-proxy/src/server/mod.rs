//! Inbound HTTP server
//!
//! Thin axum layer over the [`Orchestrator`]: request validation, JSON
//! shaping, CORS and graceful shutdown.

mod handlers;

use axum::{
    Router,
    body::Body,
    extract::rejection::{JsonRejection, QueryRejection},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::{GaiaError, Result};
use crate::upstream::Orchestrator;
use crate::votes::VoteCounter;

pub use handlers::{GaiaRequest, GaiaResponse, IfuParams, QaRequest, SearchParams, VoteRequest};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Upstream call orchestration, shared by every request
    pub orchestrator: Arc<Orchestrator>,
    /// Feedback totals behind `/api/vote`
    pub votes: Arc<VoteCounter>,
    /// Server configuration (defaults, IFU catalog)
    pub config: ServerConfig,
}

/// The HTTP front end
pub struct ProxyServer {
    orchestrator: Arc<Orchestrator>,
    config: ServerConfig,
}

impl ProxyServer {
    pub fn new(orchestrator: Arc<Orchestrator>, config: ServerConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Bind and serve until Ctrl+C or SIGTERM
    pub async fn serve(&self) -> Result<()> {
        let votes = VoteCounter::open(self.config.vote_path()).await;
        tracing::info!("Vote totals stored at {}", votes.path().display());

        let state = Arc::new(AppState {
            orchestrator: self.orchestrator.clone(),
            votes: Arc::new(votes),
            config: self.config.clone(),
        });
        let app = create_router(state);

        let addr: SocketAddr = self
            .config
            .listen_addr
            .parse()
            .map_err(|e| GaiaError::Config(format!("Invalid listen address: {e}")))?;

        tracing::info!("Starting Gaia proxy on {addr}");
        tracing::info!("CORS origins: {}", self.config.cors_origins);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GaiaError::Proxy(format!("Failed to bind to {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| GaiaError::Proxy(format!("Server error: {e}")))?;

        tracing::info!("Gaia proxy shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/", get(handlers::landing))
        .route("/health", get(handlers::health))
        .route("/api/health", get(handlers::health))
        .route("/favicon.ico", get(handlers::favicon))
        .route("/api/gaia", post(handlers::gaia))
        .route("/api/qa", post(handlers::qa))
        .route("/search_ifu", get(handlers::search_ifu))
        .route("/api/search_ifu", get(handlers::search_ifu))
        .route("/get_ifu", get(handlers::get_ifu))
        .route("/api/get_ifu", get(handlers::get_ifu))
        .route("/api/vote", get(handlers::votes).post(handlers::vote))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// CORS from a comma-separated origin list; `*` allows any origin
fn cors_layer(origins: &str) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    let origins: Vec<&str> = origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .collect();

    if origins.is_empty() || origins.contains(&"*") {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring invalid CORS origin '{origin}': {e}");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Create a JSON error response
fn create_error_response(status: StatusCode, error_type: &str, message: &str) -> Response<Body> {
    let body = serde_json::json!({
        "error": {
            "type": error_type,
            "message": message,
        }
    });

    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

impl IntoResponse for GaiaError {
    fn into_response(self) -> Response<Body> {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {self}");
        } else {
            tracing::warn!("Request rejected: {self}");
        }
        create_error_response(status, self.error_type(), &self.to_string())
    }
}

impl From<JsonRejection> for GaiaError {
    fn from(rejection: JsonRejection) -> Self {
        GaiaError::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for GaiaError {
    fn from(rejection: QueryRejection) -> Self {
        GaiaError::InvalidRequest(rejection.body_text())
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
