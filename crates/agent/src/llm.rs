//! Generation backend abstraction and the circuit breaker that guards it.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use econ_core::{ConversationMessage, ToolInvocation};

/// One chat completion request. `tools` carries the catalogue in the wire
/// format of the backend; `None` means the backend must answer in prose.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub messages: Vec<ConversationMessage>,
    pub tools: Option<Value>,
}

/// Normalized backend reply: free text plus any structured tool requests.
#[derive(Clone, Debug, Default)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolInvocation>,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Transport(String),
    #[error("llm returned a malformed response: {0}")]
    Malformed(String),
    #[error("llm backend unavailable, retry in {retry_after_secs}s")]
    CircuitOpen { retry_after_secs: i64 },
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { since: DateTime<Utc> },
    HalfOpen,
}

/// Trip-wire around the backend: after `failure_threshold` consecutive
/// failures the breaker opens and calls fail fast for `cooldown`. Once the
/// cooldown elapses a single probe call is let through; its outcome decides
/// whether the breaker closes again or re-opens for a fresh cooldown.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            state: Mutex::new(BreakerState::Closed { consecutive_failures: 0 }),
        }
    }

    /// Gate a call attempt. Errors with `CircuitOpen` while cooling down or
    /// while another probe is in flight.
    pub fn preflight(&self) -> Result<(), LlmError> {
        self.preflight_at(Utc::now())
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != (BreakerState::Closed { consecutive_failures: 0 }) {
            info!(event_name = "llm.circuit_closed", "backend recovered, circuit closed");
        }
        *state = BreakerState::Closed { consecutive_failures: 0 };
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Utc::now());
    }

    pub fn is_open(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(*state, BreakerState::Open { .. })
    }

    fn preflight_at(&self, now: DateTime<Utc>) -> Result<(), LlmError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            BreakerState::Closed { .. } => Ok(()),
            BreakerState::Open { since } => {
                let elapsed = now - since;
                if elapsed >= self.cooldown {
                    *state = BreakerState::HalfOpen;
                    info!(event_name = "llm.circuit_half_open", "cooldown elapsed, probing backend");
                    Ok(())
                } else {
                    let retry_after_secs = (self.cooldown - elapsed).num_seconds().max(1);
                    Err(LlmError::CircuitOpen { retry_after_secs })
                }
            }
            // A probe is already in flight; do not stack more load on a
            // backend we believe is down.
            BreakerState::HalfOpen => {
                Err(LlmError::CircuitOpen { retry_after_secs: self.cooldown.num_seconds() })
            }
        }
    }

    fn record_failure_at(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = match *state {
            BreakerState::Closed { consecutive_failures } => {
                let failures = consecutive_failures + 1;
                if failures >= self.failure_threshold {
                    warn!(
                        event_name = "llm.circuit_opened",
                        failures, "failure threshold reached, opening circuit"
                    );
                    BreakerState::Open { since: now }
                } else {
                    BreakerState::Closed { consecutive_failures: failures }
                }
            }
            BreakerState::HalfOpen => {
                warn!(event_name = "llm.circuit_reopened", "probe failed, reopening circuit");
                BreakerState::Open { since: now }
            }
            open @ BreakerState::Open { .. } => open,
        };
    }
}

/// Backend client wrapped with the circuit breaker. All runtime traffic goes
/// through this type rather than the raw client.
pub struct ResilientClient<C> {
    inner: C,
    breaker: CircuitBreaker,
}

impl<C: LlmClient> ResilientClient<C> {
    pub fn new(inner: C, failure_threshold: u32, cooldown: Duration) -> Self {
        Self { inner, breaker: CircuitBreaker::new(failure_threshold, cooldown) }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for ResilientClient<C> {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        self.breaker.preflight()?;
        match self.inner.chat(request).await {
            Ok(response) => {
                self.breaker.record_success();
                Ok(response)
            }
            Err(error) => {
                self.breaker.record_failure();
                Err(error)
            }
        }
    }
}
