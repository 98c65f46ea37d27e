//! Upstream call orchestration
//!
//! One [`Orchestrator`] is built at startup and shared by every request
//! handler. Per call it:
//! 1. resolves the call mode and validates the URL and payload,
//! 2. reserves the estimated prompt cost (rolling the session over if needed),
//! 3. runs up to `max_retry` attempts of POST, status check and body read,
//! 4. records completion tokens and post-processes the content.
//!
//! Only step 2 and the token recording take the state lock.

use std::sync::Arc;

use tokio::sync::Mutex as TokioMutex;
use url::Url;

use crate::config::{Config, LoggingConfig};
use crate::error::{GaiaError, Result};
use crate::logging::clip_for_log;

use super::budget::{TokenBudget, estimate_prompt_tokens};
use super::postprocess::{SchemaCoercer, finalize, sanitize_search_results};
use super::request::{CallMode, RequestBuilder, UpstreamRequest};
use super::retry::{Outcome, RetryController, RetryPolicy, Sleeper, TokioSleeper, transport_error};
use super::session::{SessionId, SessionManager};
use super::streaming::StreamingResponseReader;
use super::url::UrlResolver;

/// System prompt for single-question answering with citations
pub const QA_SYSTEM_PROMPT: &str = concat!(
    "你是医疗设备说明书问答助手。仅依据 ragConfig.globFilter 或助手知识库中的 IFU 文档回答问题。\n",
    "返回严格的 JSON（仅 JSON，无多余文字）。\n",
    "输出格式: {\"results\":[{\"doc\":string,\"page\":number,\"refId\":string,\"score\":number,\"snippet\":string}]}\n",
    "要求: snippet 为回答内容并引用原文依据；若无法确定页码，使用1。"
);

/// System prompt for keyword search inside one document container
pub const SEARCH_SYSTEM_PROMPT: &str = concat!(
    "你是医疗设备说明书检索助手。仅在 ragConfig.globFilter 指定的 IFU 文档中检索。\n",
    "根据用户关键词返回严格的 JSON（仅 JSON，无多余文字）。\n",
    "snippet 必须为原文截取：以命中关键词为中心，向前后扩展若干句，尽量接近长度上限。\n",
    "输出格式: {\"results\":[{\"doc\":string,\"page\":number,\"refId\":string,\"score\":number,\"snippet\":string}]}\n",
    "要求: 每条 snippet 300–800字，允许换行与标点；尽量接近上限；若无法确定页码，使用1；返回最多1000条。"
);

/// Token budget and upstream session, always mutated together
#[derive(Debug)]
pub struct OrchestratorState {
    budget: TokenBudget,
    sessions: SessionManager,
}

impl OrchestratorState {
    /// Reserve prompt tokens, replacing the session when the budget rolls over
    fn reserve(&mut self, prompt_tokens: u64) -> Result<()> {
        let used_before = self.budget.used();
        if self.budget.reserve(prompt_tokens) {
            tracing::info!(
                used_before,
                prompt_tokens,
                limit = self.budget.limit(),
                "Token limit reached, resetting session"
            );
            self.sessions.reset()?;
        }
        Ok(())
    }
}

/// Arguments of one orchestrated call, shared by every attempt
#[derive(Debug, Clone, Copy)]
struct CallPlan<'a> {
    mode: CallMode,
    text: &'a str,
    system_prompt: &'a str,
    /// Id given by the caller; drives URL selection
    call_site_assistant_id: Option<&'a str>,
    /// Caller id or configured default; goes into the payload
    assistant_id: Option<&'a str>,
    document_filter: Option<&'a str>,
}

/// Long-lived entry point for all upstream calls
pub struct Orchestrator {
    state: TokioMutex<OrchestratorState>,
    builder: RequestBuilder,
    urls: UrlResolver,
    retry: RetryController,
    logging: LoggingConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("builder", &self.builder)
            .field("urls", &self.urls)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_sleeper(config, Arc::new(TokioSleeper))
    }

    /// Build with a custom backoff sleeper
    pub fn with_sleeper(config: &Config, sleeper: Arc<dyn Sleeper>) -> Result<Self> {
        let upstream = &config.upstream;
        let state = OrchestratorState {
            budget: TokenBudget::new(upstream.session_token_limit, upstream.max_response_tokens),
            sessions: SessionManager::new(upstream)?,
        };
        let policy = RetryPolicy::new(
            upstream.max_retry,
            upstream.backoff_base,
            upstream.placeholder.clone(),
        );

        Ok(Self {
            state: TokioMutex::new(state),
            builder: RequestBuilder::new(upstream.model.clone(), upstream.max_response_tokens),
            urls: UrlResolver::from_config(upstream),
            retry: RetryController::new(policy, sleeper),
            logging: config.logging.clone(),
        })
    }

    /// Text returned when every attempt failed transiently
    pub fn placeholder(&self) -> &str {
        &self.retry.policy().placeholder
    }

    /// Estimated tokens used in the current session
    pub async fn tokens_used(&self) -> u64 {
        self.state.lock().await.budget.used()
    }

    /// Number of session rollovers so far
    pub async fn session_generation(&self) -> u64 {
        self.state.lock().await.sessions.current().generation()
    }

    pub async fn session_id(&self) -> SessionId {
        self.state.lock().await.sessions.session_id().clone()
    }

    /// Generic chat call; the mode follows from whether an assistant id is available
    pub async fn call_text(
        &self,
        text: &str,
        system_prompt: &str,
        assistant_id: Option<&str>,
        document_filter: Option<&str>,
    ) -> Result<String> {
        self.call_core_orchestrated(text, system_prompt, assistant_id, document_filter, None)
            .await
    }

    /// Mode-aware chat call.
    ///
    /// Returns the post-processed upstream content, or the placeholder when all
    /// attempts failed transiently.
    ///
    /// # Errors
    /// * `MissingParameter` - an assistant mode (or the URL template) needs an id and none is available
    /// * `Config` - the resolved URL is invalid
    /// * `Unauthorized` - upstream answered 401/403
    /// * `UpstreamStatus` - upstream answered a non-retryable status
    pub async fn call_core_orchestrated(
        &self,
        text: &str,
        system_prompt: &str,
        assistant_id: Option<&str>,
        document_filter: Option<&str>,
        mode: Option<&str>,
    ) -> Result<String> {
        let call_site_assistant_id = assistant_id.map(str::trim).filter(|id| !id.is_empty());
        let effective_id = self.urls.effective_assistant_id(call_site_assistant_id);
        let plan = CallPlan {
            mode: CallMode::parse(mode, effective_id.is_some()),
            text,
            system_prompt,
            call_site_assistant_id,
            assistant_id: effective_id,
            document_filter: document_filter.map(str::trim).filter(|f| !f.is_empty()),
        };

        // Fail on caller/config mistakes before anything is reserved.
        let (url, request) = self.prepare(&plan)?;

        if self.logging.log_payloads {
            tracing::info!(
                mode = plan.mode.as_str(),
                "Upstream request: text={} | system_prompt={}",
                self.clip(text),
                self.clip(request.system_prompt().unwrap_or_default())
            );
        }
        tracing::debug!(%url, mode = plan.mode.as_str(), "Resolved upstream endpoint");

        let prompt_tokens = estimate_prompt_tokens(text, request.system_prompt().unwrap_or_default());
        self.state.lock().await.reserve(prompt_tokens)?;

        let content = self
            .retry
            .execute(|attempt| self.attempt(attempt, plan))
            .await?;
        let content = finalize(&content);

        if self.logging.log_payloads {
            tracing::info!("Upstream content: {}", self.clip(&content));
        }
        Ok(content)
    }

    /// Ask one question and return citation JSON, wrapping free-text answers
    pub async fn call_qa(
        &self,
        question: &str,
        assistant_id: &str,
        mode: Option<&str>,
    ) -> Result<String> {
        let fallback_doc = self
            .urls
            .effective_assistant_id(Some(assistant_id))
            .ok_or_else(|| {
                GaiaError::MissingParameter("assistantid is required for question answering".into())
            })?
            .to_string();

        let content = self
            .call_core_orchestrated(question, QA_SYSTEM_PROMPT, Some(assistant_id), None, mode)
            .await?;
        Ok(SchemaCoercer::coerce(&content, &fallback_doc))
    }

    /// Keyword search restricted to one document container.
    ///
    /// Authorization and configuration problems are raised; any other
    /// failure, and the retry placeholder, yield an empty result list.
    /// A prose answer (always the case in ask mode, where the search prompt
    /// is not sent) is wrapped into a single hit.
    pub async fn call_document_search(
        &self,
        keyword: &str,
        assistant_id: Option<&str>,
        container_id: Option<&str>,
        mode: Option<&str>,
    ) -> Result<String> {
        let fallback_doc = self
            .urls
            .effective_assistant_id(assistant_id)
            .unwrap_or_default()
            .to_string();
        let text = format!("keyword: {}", keyword.trim());

        let content = match self
            .call_core_orchestrated(&text, SEARCH_SYSTEM_PROMPT, assistant_id, container_id, mode)
            .await
        {
            Ok(content) => content,
            Err(
                err @ (GaiaError::Unauthorized { .. }
                | GaiaError::MissingParameter(_)
                | GaiaError::InvalidRequest(_)
                | GaiaError::Config(_)),
            ) => return Err(err),
            Err(err) => {
                tracing::warn!("Document search failed, returning no results: {err}");
                String::new()
            }
        };

        let content = if content.trim().is_empty() || content == self.placeholder() {
            String::new()
        } else {
            SchemaCoercer::coerce(&content, &fallback_doc)
        };
        let results = sanitize_search_results(&content, &fallback_doc);
        tracing::debug!(hits = results.results.len(), "Document search finished");
        Ok(serde_json::to_string(&results)?)
    }

    fn prepare(&self, plan: &CallPlan<'_>) -> Result<(Url, UpstreamRequest)> {
        let url = self.urls.resolve(plan.call_site_assistant_id)?;
        let request = self.builder.build(
            plan.mode,
            plan.text,
            plan.system_prompt,
            plan.assistant_id,
            plan.document_filter,
        )?;
        Ok((url, request))
    }

    /// One POST plus body read, classified for the retry loop
    async fn attempt(&self, attempt: u32, plan: CallPlan<'_>) -> Outcome {
        let (url, request) = match self.prepare(&plan) {
            Ok(prepared) => prepared,
            Err(err) => return Outcome::from_error(err),
        };
        let body = match serde_json::to_vec(&request) {
            Ok(body) => body,
            Err(err) => return Outcome::Fatal(err.into()),
        };

        if self.logging.log_payloads && attempt == 1 {
            tracing::info!("Upstream payload: {}", self.clip(&String::from_utf8_lossy(&body)));
        }

        let session = self.state.lock().await.sessions.current();
        tracing::debug!(
            attempt,
            generation = session.generation(),
            session_id = %session.session_id(),
            "Calling upstream"
        );

        // The body is sent pre-serialized so the session's
        // `application/json; charset=utf-8` header is kept.
        let response = match session.client().post(url).body(body).send().await {
            Ok(response) => response,
            Err(err) => return Outcome::from_error(transport_error(err)),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            if self.logging.log_payloads {
                tracing::warn!(
                    status = status.as_u16(),
                    "Upstream returned error body: {}",
                    self.clip(&body)
                );
            }
            return Outcome::from_status(status, body);
        }

        match StreamingResponseReader::read(response).await {
            Ok(completion) => {
                self.state.lock().await.budget.record(completion.completion_tokens);
                Outcome::Success(completion)
            }
            Err(err) => Outcome::from_error(err),
        }
    }

    fn clip(&self, text: &str) -> String {
        clip_for_log(text, self.logging.max_log_chars)
    }
}
