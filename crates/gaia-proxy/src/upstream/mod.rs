//! Upstream call orchestration: budget, session, payload, transport, retry
//! and post-processing.

pub mod budget;
mod orchestrator;
pub mod postprocess;
pub mod request;
pub mod retry;
mod session;
pub mod streaming;
mod url;

pub use budget::{TokenBudget, estimate_prompt_tokens, estimate_tokens};
pub use orchestrator::{Orchestrator, OrchestratorState, QA_SYSTEM_PROMPT, SEARCH_SYSTEM_PROMPT};
pub use postprocess::{NormalizedResult, ResultSet, SchemaCoercer, SearchHit, finalize};
pub use request::{CallMode, RequestBuilder, UpstreamRequest};
pub use retry::{Outcome, RetryController, RetryPolicy, Sleeper, TokioSleeper};
pub use session::{SESSION_ID_HEADER, SessionId, SessionIdError, SessionManager, UpstreamSession};
pub use streaming::{Completion, SseAccumulator, SseEvent, StreamingResponseReader};
pub use self::url::UrlResolver;
