//! Resilient summarization
//!
//! The generative service sheds load with a distinguishable "overloaded"
//! failure. [`ResilientSummarizer`] retries only that failure, waiting
//! `initial_backoff`, then twice as long each time, until the retry budget
//! is spent. Every other failure is returned immediately.
//!
//! ```text
//! Attempting --ok--------------------------------> Done
//! Attempting --overloaded, retries left----------> Waiting --backoff--> Attempting
//! Attempting --overloaded, no retries left-------> Failed(Overloaded)
//! Attempting --any other failure-----------------> Failed(Upstream)
//! ```

use crate::error::{DigestError, GenerationError};
use crate::progress::ProgressSink;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub mod transcript;

pub use transcript::{build_prompt, build_transcript};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 2000;

/// Single-prompt text generation
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
        }
    }
}

struct RetryState {
    attempts_remaining: u32,
    backoff: Duration,
}

impl RetryState {
    fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempts_remaining: policy.max_retries,
            backoff: policy.initial_backoff,
        }
    }

    /// Consume one retry; returns how long to wait before it.
    fn next_wait(&mut self) -> Option<Duration> {
        if self.attempts_remaining == 0 {
            return None;
        }
        self.attempts_remaining -= 1;
        let wait = self.backoff;
        self.backoff = self.backoff.saturating_mul(2);
        Some(wait)
    }
}

pub struct ResilientSummarizer {
    model: Arc<dyn GenerativeModel>,
    policy: RetryPolicy,
}

impl ResilientSummarizer {
    pub fn new(model: Arc<dyn GenerativeModel>, policy: RetryPolicy) -> Self {
        Self { model, policy }
    }

    pub async fn summarize(&self, prompt: &str, sink: &dyn ProgressSink) -> crate::Result<String> {
        let mut state = RetryState::new(&self.policy);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match self.model.generate(prompt).await {
                Ok(summary) => {
                    info!(attempt, summary_chars = summary.len(), "Summary generated");
                    return Ok(summary);
                }
                Err(error) if error.is_transient() => {
                    let Some(wait) = state.next_wait() else {
                        warn!(attempt, "Summarization still overloaded, giving up");
                        return Err(DigestError::Overloaded { attempts: attempt });
                    };

                    warn!(
                        attempt,
                        retries_left = state.attempts_remaining,
                        wait_ms = wait.as_millis() as u64,
                        "Summarization overloaded ({}), backing off",
                        error
                    );
                    sink.emit(
                        "retry_wait",
                        json!({
                            "attempt": attempt,
                            "retries_left": state.attempts_remaining,
                            "wait_ms": wait.as_millis() as u64,
                        }),
                    );

                    tokio::time::sleep(wait).await;
                }
                Err(error) => {
                    warn!(attempt, "Summarization failed: {}", error);
                    return Err(DigestError::Upstream(error.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Plays back scripted responses and records when each call happened.
    pub struct ScriptedModel {
        responses: Mutex<VecDeque<Result<String, GenerationError>>>,
        calls: Mutex<Vec<Instant>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub fn new(responses: Vec<Result<String, GenerationError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn overloaded(times: usize, then: Option<&str>) -> Self {
            let mut responses: Vec<_> = (0..times)
                .map(|_| Err(GenerationError::Overloaded("503".into())))
                .collect();
            if let Some(text) = then {
                responses.push(Ok(text.to_string()));
            }
            Self::new(responses)
        }

        pub fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerativeModel for ScriptedModel {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GenerationError::Failed("script exhausted".into())))
        }
    }
}
