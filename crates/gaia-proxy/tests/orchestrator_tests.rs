//! Integration tests for upstream orchestration
//!
//! Every test runs the real orchestrator against a wiremock upstream; only the
//! backoff sleeper is replaced so retries finish instantly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

use gaia_proxy::GaiaError;
use gaia_proxy::config::Config;
use gaia_proxy::upstream::{Orchestrator, Sleeper};

const PLACEHOLDER: &str = "对不起，服务繁忙，请稍后再试。";
const CHAT_PATH: &str = "/assistants/a-1/chat/completions";

// =============================================================================
// Test Fixtures
// =============================================================================

#[derive(Default)]
struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

fn test_config(server: &MockServer) -> Config {
    let template = format!("{}/assistants/{{assistantid}}/chat/completions", server.uri());
    let mut config = Config::default();
    config.upstream.base_url = template.clone();
    config.upstream.assistant_url_template = template;
    config.upstream.api_key = "test-key".to_string();
    config.upstream.session_id = Some("test-session".to_string());
    config.upstream.timeout_secs = 5;
    config.upstream.max_retry = 3;
    config.upstream.backoff_base = 1.5;
    config.logging.max_log_chars = 200;
    config
}

fn orchestrator(config: &Config) -> (Orchestrator, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let orchestrator = Orchestrator::with_sleeper(config, sleeper.clone()).unwrap();
    (orchestrator, sleeper)
}

fn sse(chunks: &[&str]) -> ResponseTemplate {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str("data: ");
        body.push_str(chunk);
        body.push_str("\n\n");
    }
    body.push_str("data: [DONE]\n\n");
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

async fn received_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

// =============================================================================
// Response Reading
// =============================================================================

mod response_reading_tests {
    use super::*;

    #[tokio::test]
    async fn test_event_stream_is_accumulated() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path(CHAT_PATH))
            .respond_with(sse(&[
                r#"{"choices":[{"delta":{"content":"Hello"}}]}"#,
                r#"{"content":", world"}"#,
                "{malformed",
                r#"{"choices":[{"delta":{"content":"!"}}],"completionTokenCount":3}"#,
            ]))
            .expect(1)
            .mount(&server)
            .await;

        let (orchestrator, sleeper) = orchestrator(&test_config(&server));
        let content = orchestrator
            .call_text("hi", "be brief", Some("a-1"), None)
            .await
            .unwrap();

        assert_eq!(content, "Hello, world!");
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn test_json_body_is_read() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "  plain answer  "}}],
                "usage": {"completion_tokens": 7}
            })))
            .mount(&server)
            .await;

        let (orchestrator, _) = orchestrator(&test_config(&server));
        let content = orchestrator
            .call_text("hi", "be brief", Some("a-1"), None)
            .await
            .unwrap();
        assert_eq!(content, "plain answer");
    }

    #[tokio::test]
    async fn test_citation_results_are_sorted_by_page() {
        let server = MockServer::start().await;
        let answer = json!({"results": [
            {"doc": "ifu", "page": 9, "refId": "b", "score": 0.5, "snippet": "late"},
            {"doc": "ifu", "page": 2, "refId": "a", "score": 0.9, "snippet": "early"}
        ]})
        .to_string();
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": answer})))
            .mount(&server)
            .await;

        let (orchestrator, _) = orchestrator(&test_config(&server));
        let content = orchestrator
            .call_text("hi", "be brief", Some("a-1"), None)
            .await
            .unwrap();

        let parsed: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["results"][0]["refId"], "a");
        assert_eq!(parsed["results"][1]["refId"], "b");
    }
}

// =============================================================================
// Outbound Request Shape
// =============================================================================

mod request_shape_tests {
    use super::*;

    #[tokio::test]
    async fn test_static_headers_are_sent() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path(CHAT_PATH))
            .and(matchers::header("authorization", "Bearer test-key"))
            .and(matchers::header("x-session-id", "test-session"))
            .and(matchers::header("accept", "text/event-stream"))
            .and(matchers::header("content-type", "application/json; charset=utf-8"))
            .respond_with(sse(&[r#"{"content":"ok"}"#]))
            .expect(1)
            .mount(&server)
            .await;

        let (orchestrator, _) = orchestrator(&test_config(&server));
        let content = orchestrator
            .call_text("hi", "be brief", Some("a-1"), None)
            .await
            .unwrap();
        assert_eq!(content, "ok");
    }

    #[tokio::test]
    async fn test_assistant_payload() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(sse(&[r#"{"content":"ok"}"#]))
            .mount(&server)
            .await;

        let (orchestrator, _) = orchestrator(&test_config(&server));
        orchestrator
            .call_text("question", "system rules", Some("a-1"), Some("container-7"))
            .await
            .unwrap();

        let bodies = received_bodies(&server).await;
        assert_eq!(bodies.len(), 1);
        let body = &bodies[0];
        assert_eq!(body["assistantId"], "a-1");
        assert!(body.get("model").is_none());
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "system rules"}));
        assert_eq!(body["messages"][1], json!({"role": "user", "content": "question"}));
        assert_eq!(body["ragConfig"], json!({"globFilter": "container-7/**"}));
        assert_eq!(body["temperature"], 0.1);
        assert_eq!(body["stream"], true);
        assert_eq!(body["reasoning_effort"], "low");
    }

    #[tokio::test]
    async fn test_ask_mode_payload_has_only_the_user_message() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(sse(&[r#"{"content":"ok"}"#]))
            .mount(&server)
            .await;

        let (orchestrator, _) = orchestrator(&test_config(&server));
        orchestrator
            .call_core_orchestrated("question", "ignored", Some("a-1"), Some("kc"), Some("ask"))
            .await
            .unwrap();

        let body = &received_bodies(&server).await[0];
        assert_eq!(body["assistantId"], "a-1");
        assert!(body.get("model").is_none());
        assert!(body.get("ragConfig").is_none());
        assert_eq!(body["messages"], json!([{"role": "user", "content": "question"}]));
    }

    #[tokio::test]
    async fn test_bare_model_on_fixed_endpoint() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/v1/chat/completions"))
            .respond_with(sse(&[r#"{"content":"ok"}"#]))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = test_config(&server);
        config.upstream.base_url = format!("{}/v1/chat/completions", server.uri());
        config.upstream.model = "GPT 4.1".to_string();
        let (orchestrator, _) = orchestrator(&config);

        orchestrator
            .call_text("question", "rules", None, Some("kc/*.pdf"))
            .await
            .unwrap();

        let body = &received_bodies(&server).await[0];
        assert_eq!(body["model"], "GPT 4.1");
        assert!(body.get("assistantId").is_none());
        assert_eq!(body["ragConfig"]["globFilter"], "kc/*.pdf");
    }

    #[tokio::test]
    async fn test_default_assistant_id_fills_the_template() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/assistants/d-1/chat/completions"))
            .respond_with(sse(&[r#"{"content":"ok"}"#]))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = test_config(&server);
        config.upstream.default_assistant_id = Some("d-1".to_string());
        let (orchestrator, _) = orchestrator(&config);

        orchestrator
            .call_text("question", "rules", None, None)
            .await
            .unwrap();
        assert_eq!(received_bodies(&server).await[0]["assistantId"], "d-1");
    }

    #[tokio::test]
    async fn test_assistant_id_stays_inside_its_path_segment() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(sse(&[r#"{"content":"ok"}"#]))
            .mount(&server)
            .await;

        let (orchestrator, _) = orchestrator(&test_config(&server));
        orchestrator
            .call_text("question", "rules", Some("../../internal/secret#"), None)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let path = requests[0].url.path();
        assert!(path.starts_with("/assistants/"), "unexpected path {path}");
        assert!(path.ends_with("/chat/completions"), "unexpected path {path}");
        assert_ne!(path, "/internal/secret");
        // The payload keeps the id as given
        assert_eq!(
            received_bodies(&server).await[0]["assistantId"],
            "../../internal/secret#"
        );
    }
}

// =============================================================================
// Retry Behavior
// =============================================================================

mod retry_tests {
    use super::*;

    #[tokio::test]
    async fn test_transient_status_then_success() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(matchers::method("POST"))
            .respond_with(sse(&[r#"{"content":"recovered"}"#]))
            .mount(&server)
            .await;

        let (orchestrator, sleeper) = orchestrator(&test_config(&server));
        let content = orchestrator
            .call_text("hi", "rules", Some("a-1"), None)
            .await
            .unwrap();

        assert_eq!(content, "recovered");
        assert_eq!(sleeper.slept(), vec![Duration::from_secs_f64(1.5)]);
        assert_eq!(received_bodies(&server).await.len(), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_is_raised_without_retry() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .expect(1)
            .mount(&server)
            .await;

        let (orchestrator, sleeper) = orchestrator(&test_config(&server));
        let err = orchestrator
            .call_text("hi", "rules", Some("a-1"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, GaiaError::Unauthorized { status: 401 }));
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn test_exhaustion_returns_placeholder() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let (orchestrator, sleeper) = orchestrator(&test_config(&server));
        let content = orchestrator
            .call_text("hi", "rules", Some("a-1"), None)
            .await
            .unwrap();

        assert_eq!(content, PLACEHOLDER);
        assert_eq!(
            sleeper.slept(),
            vec![Duration::from_secs_f64(1.5), Duration::from_secs_f64(2.25)]
        );
    }

    #[tokio::test]
    async fn test_unparseable_body_is_retried_like_overload() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("not json", "application/json"))
            .expect(3)
            .mount(&server)
            .await;

        let (orchestrator, _) = orchestrator(&test_config(&server));
        let content = orchestrator
            .call_text("hi", "rules", Some("a-1"), None)
            .await
            .unwrap();
        assert_eq!(content, PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_other_status_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such assistant"))
            .expect(1)
            .mount(&server)
            .await;

        let (orchestrator, sleeper) = orchestrator(&test_config(&server));
        let err = orchestrator
            .call_text("hi", "rules", Some("a-1"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, GaiaError::UpstreamStatus { status: 404, .. }));
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let mut config = Config::default();
        // Port 9 (discard) is not expected to accept connections in test environments.
        config.upstream.base_url = "http://127.0.0.1:9/chat".to_string();
        config.upstream.max_retry = 2;
        config.upstream.timeout_secs = 2;
        let (orchestrator, sleeper) = orchestrator(&config);

        let content = orchestrator
            .call_text("hi", "rules", None, None)
            .await
            .unwrap();
        assert_eq!(content, orchestrator.placeholder());
        assert_eq!(sleeper.slept().len(), 1);
    }
}

// =============================================================================
// Token Budget And Session Rollover
// =============================================================================

mod budget_tests {
    use super::*;

    #[tokio::test]
    async fn test_tokens_are_reserved_and_recorded() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(sse(&[r#"{"content":"ok","completionTokenCount":11}"#]))
            .mount(&server)
            .await;

        let (orchestrator, _) = orchestrator(&test_config(&server));
        orchestrator
            .call_text("abcd", "ab", Some("a-1"), None)
            .await
            .unwrap();

        // prompt: 2 + 1 + 50 overhead, completion: 11
        assert_eq!(orchestrator.tokens_used().await, 64);
        assert_eq!(orchestrator.session_generation().await, 0);
    }

    #[tokio::test]
    async fn test_session_rolls_over_when_budget_is_exhausted() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::header("x-session-id", "test-session"))
            .respond_with(sse(&[r#"{"content":"ok","completionTokenCount":10}"#]))
            .expect(2)
            .mount(&server)
            .await;

        let mut config = test_config(&server);
        config.upstream.session_token_limit = 190;
        config.upstream.max_response_tokens = 80;
        let (orchestrator, _) = orchestrator(&config);

        // 0 + 53 + 80 < 190
        orchestrator
            .call_text("abcd", "ab", Some("a-1"), None)
            .await
            .unwrap();
        assert_eq!(orchestrator.tokens_used().await, 63);
        assert_eq!(orchestrator.session_generation().await, 0);

        // 63 + 53 + 80 >= 190: budget zeroed, new session, same id
        orchestrator
            .call_text("abcd", "ab", Some("a-1"), None)
            .await
            .unwrap();
        assert_eq!(orchestrator.tokens_used().await, 63);
        assert_eq!(orchestrator.session_generation().await, 1);
        assert_eq!(orchestrator.session_id().await.as_str(), "test-session");
    }

    #[tokio::test]
    async fn test_concurrent_calls_account_every_token_without_serializing_io() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(
                sse(&[r#"{"content":"ok","completionTokenCount":10}"#])
                    .set_delay(Duration::from_millis(400)),
            )
            .expect(4)
            .mount(&server)
            .await;

        let mut config = test_config(&server);
        config.upstream.session_token_limit = 100_000;
        config.upstream.max_response_tokens = 80;
        let (orchestrator, _) = orchestrator(&config);

        let started = std::time::Instant::now();
        let call = || orchestrator.call_text("abcd", "ab", Some("a-1"), None);
        let (a, b, c, d) = tokio::join!(call(), call(), call(), call());
        let elapsed = started.elapsed();

        for content in [a, b, c, d] {
            assert_eq!(content.unwrap(), "ok");
        }
        // 4 x (53 reserved + 10 recorded)
        assert_eq!(orchestrator.tokens_used().await, 252);
        assert_eq!(orchestrator.session_generation().await, 0);
        // Four 400ms replies in well under 1.6s: the state lock is not held
        // while waiting on upstream.
        assert!(elapsed < Duration::from_millis(1200), "calls ran serially: {elapsed:?}");
    }

    #[tokio::test]
    async fn test_rollover_does_not_disturb_in_flight_call() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::body_string_contains("slow"))
            .respond_with(
                sse(&[r#"{"content":"slow answer","completionTokenCount":10}"#])
                    .set_delay(Duration::from_millis(500)),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(matchers::method("POST"))
            .and(matchers::body_string_contains("fast"))
            .respond_with(sse(&[r#"{"content":"fast answer","completionTokenCount":10}"#]))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = test_config(&server);
        config.upstream.session_token_limit = 150;
        config.upstream.max_response_tokens = 80;
        let (orchestrator, _) = orchestrator(&config);

        // slow: 0 + 53 + 80 < 150, reserved and in flight
        // fast: 53 + 53 + 80 >= 150, rolls the session over mid-flight
        let slow = orchestrator.call_text("slow", "ab", Some("a-1"), None);
        let fast = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let content = orchestrator.call_text("fast", "ab", Some("a-1"), None).await;
            let generation = orchestrator.session_generation().await;
            (content, generation)
        };
        let (slow, (fast, generation_after_fast)) = tokio::join!(slow, fast);

        assert_eq!(generation_after_fast, 1);
        assert_eq!(fast.unwrap(), "fast answer");
        assert_eq!(slow.unwrap(), "slow answer");

        // Budget restarted at fast's 53; both completions land in the new session
        assert_eq!(orchestrator.tokens_used().await, 73);
        assert_eq!(orchestrator.session_generation().await, 1);

        let requests = server.received_requests().await.unwrap();
        assert!(requests.iter().all(|r| {
            r.headers.get("x-session-id").map(|v| v.as_bytes()) == Some(b"test-session".as_slice())
        }));
    }
}

// =============================================================================
// Citation Entry Points
// =============================================================================

mod citation_tests {
    use super::*;

    #[tokio::test]
    async fn test_qa_wraps_free_text() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(sse(&[r#"{"content":"Set the alarm limit in the menu."}"#]))
            .mount(&server)
            .await;

        let (orchestrator, _) = orchestrator(&test_config(&server));
        let content = orchestrator.call_qa("how?", "a-1", None).await.unwrap();

        let parsed: Value = serde_json::from_str(&content).unwrap();
        let results = parsed["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["doc"], "a-1");
        assert_eq!(results[0]["page"], 1);
        assert_eq!(results[0]["snippet"], "Set the alarm limit in the menu.");
        assert!(results[0]["refId"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_qa_passes_result_sets_through() {
        let server = MockServer::start().await;
        let answer = json!({"results": [{"doc": "IFU", "page": 4, "refId": "r", "score": 0.7, "snippet": "s"}]})
            .to_string();
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": answer})))
            .mount(&server)
            .await;

        let (orchestrator, _) = orchestrator(&test_config(&server));
        let content = orchestrator.call_qa("how?", "a-1", None).await.unwrap();

        let parsed: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["results"][0]["doc"], "IFU");
        assert_eq!(parsed["results"][0]["refId"], "r");
    }

    #[tokio::test]
    async fn test_document_search_sanitizes_hits() {
        let server = MockServer::start().await;
        let answer = json!({"results": [
            {"page": 0, "snippet": "  first  "},
            {"doc": "IFU.pdf", "page": 3, "refId": "r3", "score": 0.8, "snippet": "third"}
        ]})
        .to_string();
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": answer})))
            .expect(1)
            .mount(&server)
            .await;

        let (orchestrator, _) = orchestrator(&test_config(&server));
        let content = orchestrator
            .call_document_search("alarm", Some("a-1"), Some("kc-1"), None)
            .await
            .unwrap();

        let parsed: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(
            parsed,
            json!({"results": [
                {"doc": "a-1", "page": 1, "snippet": "first"},
                {"doc": "IFU.pdf", "page": 3, "refId": "r3", "score": 0.8, "snippet": "third"}
            ]})
        );

        let body = &received_bodies(&server).await[0];
        assert_eq!(body["messages"][1]["content"], "keyword: alarm");
        assert_eq!(body["ragConfig"]["globFilter"], "kc-1/**");
    }

    #[tokio::test]
    async fn test_document_search_hides_upstream_failures() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (orchestrator, _) = orchestrator(&test_config(&server));
        let content = orchestrator
            .call_document_search("alarm", Some("a-1"), None, None)
            .await
            .unwrap();
        assert_eq!(content, r#"{"results":[]}"#);
    }

    #[tokio::test]
    async fn test_document_search_propagates_auth_failures() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let (orchestrator, _) = orchestrator(&test_config(&server));
        let err = orchestrator
            .call_document_search("alarm", Some("a-1"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GaiaError::Unauthorized { status: 403 }));
    }

    #[tokio::test]
    async fn test_ask_mode_document_search_wraps_prose_answer() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(sse(&[r#"{"content":"Press the alarm silence key to mute."}"#]))
            .expect(1)
            .mount(&server)
            .await;

        let (orchestrator, _) = orchestrator(&test_config(&server));
        let content = orchestrator
            .call_document_search("alarm", Some("a-1"), Some("kc-1"), Some("ask"))
            .await
            .unwrap();

        let parsed: Value = serde_json::from_str(&content).unwrap();
        let results = parsed["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["doc"], "a-1");
        assert_eq!(results[0]["page"], 1);
        assert_eq!(results[0]["score"], 1.0);
        assert_eq!(results[0]["snippet"], "Press the alarm silence key to mute.");
        assert!(results[0]["refId"].as_str().is_some());

        let body = &received_bodies(&server).await[0];
        assert_eq!(body["messages"], json!([{"role": "user", "content": "keyword: alarm"}]));
    }

    #[tokio::test]
    async fn test_document_search_wraps_prose_in_assistant_mode() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": "See page 12."})))
            .mount(&server)
            .await;

        let (orchestrator, _) = orchestrator(&test_config(&server));
        let content = orchestrator
            .call_document_search("alarm", Some("a-1"), None, None)
            .await
            .unwrap();

        let parsed: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["results"][0]["snippet"], "See page 12.");
    }

    #[tokio::test]
    async fn test_document_search_exhaustion_yields_no_results() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let (orchestrator, _) = orchestrator(&test_config(&server));
        let content = orchestrator
            .call_document_search("alarm", Some("a-1"), None, Some("ask"))
            .await
            .unwrap();
        assert_eq!(content, r#"{"results":[]}"#);
    }
}
