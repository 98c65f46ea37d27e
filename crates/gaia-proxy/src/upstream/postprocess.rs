//! Response post-processing
//!
//! Everything here is best-effort: text that does not look like a citation
//! payload is passed through (or wrapped) rather than rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Relevance score given to wrapped free text
pub const SYNTHETIC_SCORE: f64 = 1.0;

/// Page given to wrapped free text and to search hits without a usable page
pub const DEFAULT_PAGE: i64 = 1;

/// Longest snippet kept in a document-search hit, in characters
pub const MAX_SNIPPET_CHARS: usize = 3000;

/// One citation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub doc: String,
    pub page: i64,
    #[serde(rename = "refId")]
    pub ref_id: String,
    pub score: f64,
    pub snippet: String,
}

/// `{"results": [...]}` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet<T> {
    pub results: Vec<T>,
}

/// Sort `results[]` by numeric `page` if `content` is a citation payload,
/// otherwise return `content` untouched.
pub fn finalize(content: &str) -> String {
    sort_results_by_page(content).unwrap_or_else(|| content.to_string())
}

fn sort_results_by_page(content: &str) -> Option<String> {
    let mut value: Value = serde_json::from_str(content).ok()?;
    let results = value.as_object_mut()?.get_mut("results")?.as_array_mut()?;
    // `sort_by` is stable, so unpaged entries keep their relative order.
    results.sort_by(|a, b| page_key(a).total_cmp(&page_key(b)));
    serde_json::to_string(&value).ok()
}

fn page_key(item: &Value) -> f64 {
    item.get("page")
        .and_then(Value::as_f64)
        .unwrap_or(f64::INFINITY)
}

fn is_result_set(text: &str) -> bool {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|value| value.get("results").map(Value::is_array))
        .unwrap_or(false)
}

/// Forces arbitrary upstream text into the citation schema
pub struct SchemaCoercer;

impl SchemaCoercer {
    /// Pass a `{results: [...]}` payload through verbatim, otherwise wrap the
    /// text into a single synthetic result attributed to `fallback_doc`.
    pub fn coerce(text: &str, fallback_doc: &str) -> String {
        if is_result_set(text) {
            return text.to_string();
        }

        let wrapped = ResultSet {
            results: vec![NormalizedResult {
                doc: fallback_doc.to_string(),
                page: DEFAULT_PAGE,
                ref_id: uuid::Uuid::new_v4().to_string(),
                score: SYNTHETIC_SCORE,
                snippet: text.to_string(),
            }],
        };
        // A struct of strings and numbers always serializes.
        serde_json::to_string(&wrapped).unwrap_or_else(|_| String::from("{\"results\":[]}"))
    }
}

/// A validated document-search hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub doc: String,
    pub page: i64,
    #[serde(rename = "refId", skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub snippet: String,
}

impl SearchHit {
    fn from_value(item: &Value, fallback_doc: &str) -> Option<Self> {
        let item = item.as_object()?;

        let doc = match item.get("doc") {
            None | Some(Value::Null) => fallback_doc.trim().to_string(),
            Some(value) => value_to_text(value).trim().to_string(),
        };
        if doc.is_empty() {
            return None;
        }

        let page = item.get("page").and_then(page_number).unwrap_or(DEFAULT_PAGE);
        let ref_id = item
            .get("refId")
            .filter(|v| !v.is_null())
            .map(value_to_text)
            .filter(|id| !id.is_empty());
        let score = item.get("score").and_then(Value::as_f64);
        let snippet = item
            .get("snippet")
            .filter(|v| !v.is_null())
            .map(value_to_text)
            .unwrap_or_default();

        Some(Self {
            doc,
            page: page.max(DEFAULT_PAGE),
            ref_id,
            score,
            snippet: snippet.trim().chars().take(MAX_SNIPPET_CHARS).collect(),
        })
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn page_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Validate a document-search reply into `{"results": [...]}`.
///
/// Non-JSON or non-object content yields an empty result list.
pub fn sanitize_search_results(content: &str, fallback_doc: &str) -> ResultSet<SearchHit> {
    let results = serde_json::from_str::<Value>(content)
        .ok()
        .as_ref()
        .and_then(|value| value.get("results"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| SearchHit::from_value(item, fallback_doc))
                .collect()
        })
        .unwrap_or_default();

    ResultSet { results }
}
