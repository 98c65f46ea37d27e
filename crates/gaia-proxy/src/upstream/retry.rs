//! Bounded retry with exponential backoff
//!
//! Each attempt reports a classified [`Outcome`]; the controller only decides
//! whether to sleep and try again, give up with the placeholder, or raise.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::{GaiaError, Result};
use crate::upstream::streaming::Completion;

/// Statuses that indicate an overloaded or flapping upstream
const TRANSIENT_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Result of a single upstream attempt
#[derive(Debug)]
pub enum Outcome {
    Success(Completion),
    /// Worth retrying; carries a human-readable reason for the logs
    Transient(String),
    /// Raised immediately, never retried
    Fatal(GaiaError),
    /// Credentials rejected; raised immediately, never masked
    AuthFailure(GaiaError),
}

impl Outcome {
    /// Classify a non-success HTTP status
    pub fn from_status(status: StatusCode, body: String) -> Self {
        let code = status.as_u16();
        match code {
            401 | 403 => Outcome::AuthFailure(GaiaError::Unauthorized { status: code }),
            _ if TRANSIENT_STATUSES.contains(&code) => {
                Outcome::Transient(format!("upstream returned HTTP {code}"))
            }
            _ => Outcome::Fatal(GaiaError::UpstreamStatus { status: code, body }),
        }
    }

    /// Classify an error raised while sending or reading an attempt
    pub fn from_error(err: GaiaError) -> Self {
        match err {
            GaiaError::Unauthorized { .. } => Outcome::AuthFailure(err),
            // Deterministic format failures are retried like overload; known quirk.
            GaiaError::Network(_) | GaiaError::ResponseFormat(_) | GaiaError::Serialization(_) => {
                Outcome::Transient(err.to_string())
            }
            GaiaError::UpstreamStatus { status, .. } if TRANSIENT_STATUSES.contains(&status) => {
                Outcome::Transient(err.to_string())
            }
            other => Outcome::Fatal(other),
        }
    }
}

/// Map a reqwest transport error onto the crate error type
pub fn transport_error(err: reqwest::Error) -> GaiaError {
    if err.is_builder() {
        GaiaError::Proxy(format!("Failed to build upstream request: {err}"))
    } else if err.is_timeout() {
        GaiaError::Network(format!("Upstream request timed out: {err}"))
    } else if err.is_connect() {
        GaiaError::Network(format!("Failed to connect to upstream: {err}"))
    } else {
        GaiaError::Network(format!("Upstream request failed: {err}"))
    }
}

/// Waits between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Attempt ceiling, backoff base and the text returned on exhaustion
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: f64,
    pub placeholder: String,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: f64, placeholder: impl Into<String>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
            placeholder: placeholder.into(),
        }
    }

    /// Delay after the failed attempt number `attempt` (1-based): `base^attempt` seconds
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        Duration::try_from_secs_f64(self.backoff_base.powi(exponent)).unwrap_or(Duration::MAX)
    }
}

/// Drives attempts according to a [`RetryPolicy`]
#[derive(Clone)]
pub struct RetryController {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryController")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryController {
    pub fn new(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `attempt_fn` (called with the 1-based attempt number) until it
    /// succeeds, fails fatally, or the attempt ceiling is reached.
    ///
    /// Exhaustion is not an error: the configured placeholder is returned.
    pub async fn execute<F, Fut>(&self, mut attempt_fn: F) -> Result<String>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let max_attempts = self.policy.max_attempts;

        for attempt in 1..=max_attempts {
            match attempt_fn(attempt).await {
                Outcome::Success(completion) => return Ok(completion.content),
                Outcome::AuthFailure(err) => {
                    tracing::error!("Upstream rejected credentials: {err}");
                    return Err(err);
                }
                Outcome::Fatal(err) => {
                    tracing::error!("Upstream call failed on attempt {attempt}/{max_attempts}: {err}");
                    return Err(err);
                }
                Outcome::Transient(reason) => {
                    if attempt == max_attempts {
                        tracing::error!(
                            "Upstream call failed after {max_attempts} attempts, returning placeholder: {reason}"
                        );
                        break;
                    }
                    let delay = self.policy.backoff(attempt);
                    tracing::warn!(
                        "Upstream attempt {attempt}/{max_attempts} failed, retrying in {delay:?}: {reason}"
                    );
                    self.sleeper.sleep(delay).await;
                }
            }
        }

        Ok(self.policy.placeholder.clone())
    }
}
