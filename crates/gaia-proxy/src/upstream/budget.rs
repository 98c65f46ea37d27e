//! Session-scoped token accounting
//!
//! Counts are estimates. What matters is that they only grow within one
//! upstream session and drop to zero exactly when the session rolls over.

/// Fixed per-call allowance for the system prompt framing
pub const SYSTEM_PROMPT_OVERHEAD_TOKENS: u64 = 50;

/// Estimate token count as half the character count.
///
/// Empty text costs nothing; any non-empty text costs at least one token.
/// Characters rather than bytes so CJK text is not counted three times over.
pub fn estimate_tokens(text: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }
    ((text.chars().count() / 2) as u64).max(1)
}

/// Estimated cost of sending `text` with `system_prompt`
pub fn estimate_prompt_tokens(text: &str, system_prompt: &str) -> u64 {
    estimate_tokens(text) + estimate_tokens(system_prompt) + SYSTEM_PROMPT_OVERHEAD_TOKENS
}

/// Running token count for the current upstream session
#[derive(Debug, Clone)]
pub struct TokenBudget {
    used: u64,
    limit: u64,
    max_response_tokens: u64,
}

impl TokenBudget {
    pub fn new(limit: u64, max_response_tokens: u64) -> Self {
        Self {
            used: 0,
            limit,
            max_response_tokens,
        }
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn max_response_tokens(&self) -> u64 {
        self.max_response_tokens
    }

    /// Whether reserving `prompt_tokens` now requires a fresh session
    pub fn needs_rollover(&self, prompt_tokens: u64) -> bool {
        self.used
            .saturating_add(prompt_tokens)
            .saturating_add(self.max_response_tokens)
            >= self.limit
    }

    /// Reserve `prompt_tokens` before a call.
    ///
    /// Returns `true` when the budget was zeroed first; the caller must then
    /// replace the upstream session while still holding the same lock.
    pub fn reserve(&mut self, prompt_tokens: u64) -> bool {
        let rolled_over = self.needs_rollover(prompt_tokens);
        if rolled_over {
            self.used = 0;
        }
        self.used = self.used.saturating_add(prompt_tokens);
        rolled_over
    }

    /// Add completion tokens reported (or estimated) after a call
    pub fn record(&mut self, completion_tokens: u64) {
        self.used = self.used.saturating_add(completion_tokens);
    }
}
