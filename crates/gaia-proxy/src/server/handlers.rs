//! Route handlers

use axum::{
    Json,
    body::Body,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::{self, IfuLocation};
use crate::error::{GaiaError, Result};
use crate::votes::{VoteCounts, VoteKind};

use super::AppState;

/// Body of `POST /api/gaia`
#[derive(Debug, Deserialize)]
pub struct GaiaRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub assistantid: Option<String>,
    #[serde(default)]
    pub glob_filter: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

/// Reply of `POST /api/gaia`
#[derive(Debug, Serialize, Deserialize)]
pub struct GaiaResponse {
    pub content: String,
}

/// Body of `POST /api/qa`
#[derive(Debug, Deserialize)]
pub struct QaRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub assistantid: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

/// Query of `GET /search_ifu`
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub assistantid: Option<String>,
    #[serde(default)]
    pub containerid: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

/// Query of `GET /get_ifu`
#[derive(Debug, Deserialize)]
pub struct IfuParams {
    #[serde(default)]
    pub model: Option<String>,
}

/// Body of `POST /api/vote`
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    #[serde(rename = "type", default)]
    pub kind: String,
}

const LANDING_PAGE: &str = concat!(
    "<html><head><title>Gaia Proxy API</title></head>",
    "<body style='font-family:system-ui,Segoe UI,Arial,sans-serif;padding:24px;'>",
    "<h2>Gaia Proxy API</h2>",
    "<p>Service is running. Useful links:</p>",
    "<ul>",
    "<li><a href='/health'>/health</a></li>",
    "<li><a href='/api/vote'>/api/vote</a></li>",
    "</ul>",
    "</body></html>"
);

pub(super) async fn landing() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

pub(super) async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub(super) async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub(super) async fn gaia(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<GaiaRequest>, JsonRejection>,
) -> Result<Json<GaiaResponse>> {
    let Json(request) = payload?;
    let text = required(&request.text, "text")?;
    let system_prompt = non_blank(request.system_prompt.as_deref())
        .unwrap_or(state.config.default_system_prompt.as_str());
    let document_filter = non_blank(request.glob_filter.as_deref())
        .or(state.config.default_document_filter.as_deref());

    let content = state
        .orchestrator
        .call_core_orchestrated(
            text,
            system_prompt,
            request.assistantid.as_deref(),
            document_filter,
            request.mode.as_deref(),
        )
        .await?;

    Ok(Json(GaiaResponse { content }))
}

pub(super) async fn qa(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<QaRequest>, JsonRejection>,
) -> Result<Response<Body>> {
    let Json(request) = payload?;
    let question = required(&request.question, "question")?;
    let content = state
        .orchestrator
        .call_qa(
            question,
            request.assistantid.as_deref().unwrap_or_default(),
            request.mode.as_deref(),
        )
        .await?;

    Ok(citation_json(content))
}

pub(super) async fn search_ifu(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Query<SearchParams>, QueryRejection>,
) -> Result<Response<Body>> {
    let Query(params) = params?;
    let keyword = required(params.keyword.as_deref().unwrap_or_default(), "keyword")?;
    let assistant_id = non_blank(params.assistantid.as_deref()).map(decode_assistant_id);

    let content = state
        .orchestrator
        .call_document_search(
            keyword,
            assistant_id.as_deref(),
            non_blank(params.containerid.as_deref()),
            params.mode.as_deref(),
        )
        .await?;

    Ok(citation_json(content))
}

pub(super) async fn get_ifu(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Query<IfuParams>, QueryRejection>,
) -> Result<Json<IfuLocation>> {
    let Query(params) = params?;
    let model = required(params.model.as_deref().unwrap_or_default(), "model")?;

    let location = match catalog::lookup(&state.config.ifu_catalog, model) {
        Some(entry) => {
            tracing::debug!(model, matched = %entry.model, "IFU lookup");
            IfuLocation::from(entry)
        }
        None => {
            tracing::debug!(model, "IFU lookup found no match");
            IfuLocation::default()
        }
    };
    Ok(Json(location))
}

pub(super) async fn votes(State(state): State<Arc<AppState>>) -> Json<VoteCounts> {
    Json(state.votes.counts().await)
}

pub(super) async fn vote(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<VoteCounts>> {
    let Json(request) = payload?;
    let kind = VoteKind::parse(&request.kind)
        .ok_or_else(|| GaiaError::InvalidRequest("type must be 'up' or 'down'".into()))?;
    Ok(Json(state.votes.record(kind).await?))
}

/// Citation payloads are already serialized JSON
fn citation_json(content: String) -> Response<Body> {
    ([(header::CONTENT_TYPE, "application/json")], content).into_response()
}

fn required<'a>(value: &'a str, name: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(GaiaError::InvalidRequest(format!("{name} must not be empty")));
    }
    Ok(value)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Clients may send the id percent-encoded a second time
fn decode_assistant_id(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
