//! Input/output validation: content filtering, PII detection, rate limiting.
//!
//! Input checks run in a fixed order (empty, length, rate limit, harmful
//! content) so the cheapest rejection wins. On the output side only empty
//! and harmful answers are fatal; oversized answers are truncated and
//! detected PII is logged without blocking the reply.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use tracing::warn;

use econ_core::config::GuardrailConfig;
use econ_core::AgentError;

const HARMFUL_PATTERNS: &[&str] = &[
    r"(?i)\b(?:kill|murder|hurt|harm)\s+(?:yourself|yourselves|myself|himself|herself|themselves|someone|somebody)\b",
    r"(?i)(?:\bsuicide\b|\bself[- ]harm\b)",
    r"(?i)\b(?:how\s+to\s+)?(?:make|build|create)\s+(?:a\s+)?(?:bomb|weapon|explosive)",
    r"(?i)\b(?:hack|steal|attack)\s+(?:into\s+)?(?:a\s+)?(?:system|account|database|bank)",
    r"(?i)\b(?:steal|fraud|scam|phish)(?:ing|ed|s)?\b.*\b(?:money|credit|bank|password)",
    r"(?i)ignore\s+(?:all\s+)?(?:previous|prior|above)\s+instructions",
    r"(?i)\bdisregard\s+(?:your|the)\s+(?:system\s+prompt|guidelines|rules)",
];

const PII_PATTERNS: &[(&str, &str)] = &[
    ("email", r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
    ("phone", r"\+?\d[\d\s\-()]{8,}\d"),
    ("national_id", r"\b\d{3}-?\d{2}-?\d{4}\b"),
    ("card_number", r"\b(?:\d[ -]?){13,16}\b"),
];

pub struct Guardrails {
    config: GuardrailConfig,
    harmful: Vec<Regex>,
    pii: Vec<(&'static str, Regex)>,
    request_log: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl Guardrails {
    pub fn new(config: GuardrailConfig) -> Result<Self, regex::Error> {
        let harmful =
            HARMFUL_PATTERNS.iter().map(|pattern| Regex::new(pattern)).collect::<Result<_, _>>()?;
        let pii = PII_PATTERNS
            .iter()
            .map(|(kind, pattern)| Regex::new(pattern).map(|regex| (*kind, regex)))
            .collect::<Result<_, _>>()?;
        Ok(Self { config, harmful, pii, request_log: Mutex::new(HashMap::new()) })
    }

    /// Normalize text before it enters the transcript: strip non-printable
    /// characters, collapse whitespace runs, and cap repeated punctuation at
    /// three characters.
    pub fn sanitize(&self, text: &str) -> String {
        let mut output = String::with_capacity(text.len());
        let mut pending_space = false;
        let mut last_punct = '\0';
        let mut punct_run = 0usize;

        for ch in text.chars() {
            if ch.is_control() || ch.is_whitespace() {
                if !ch.is_whitespace() {
                    continue;
                }
                pending_space = !output.is_empty();
                punct_run = 0;
                continue;
            }

            if pending_space {
                output.push(' ');
                pending_space = false;
            }

            if ch.is_ascii_punctuation() && ch == last_punct {
                punct_run += 1;
                if punct_run >= 3 {
                    continue;
                }
            } else {
                last_punct = if ch.is_ascii_punctuation() { ch } else { '\0' };
                punct_run = if ch.is_ascii_punctuation() { 0 } else { punct_run };
            }

            output.push(ch);
        }

        output
    }

    pub fn validate_input(&self, text: &str, user_id: &str) -> Result<(), AgentError> {
        self.validate_input_at(text, user_id, Utc::now())
    }

    /// Validation for text the agent itself generates mid-run (recovery
    /// queries, learned snippets). Same checks as user input minus the rate
    /// limit, which only meters external callers.
    pub fn validate_followup(&self, text: &str) -> Result<(), AgentError> {
        self.check_empty(text)?;
        self.check_length(text)?;
        self.check_harmful(text)
    }

    /// Screen an outgoing answer. Empty or harmful output is fatal for the
    /// turn; oversized output is truncated and PII is logged without blocking.
    pub fn validate_output(&self, text: &str) -> Result<String, AgentError> {
        if text.trim().is_empty() {
            return Err(AgentError::Guardrail {
                category: "empty_output".to_string(),
                message: "The assistant produced no answer.".to_string(),
            });
        }
        self.check_harmful(text)?;

        if self.config.enable_pii_detection {
            for (kind, regex) in &self.pii {
                if regex.is_match(text) {
                    warn!(event_name = "guardrail.pii_detected", kind, "answer contains possible PII");
                }
            }
        }

        let limit = self.config.max_length;
        if text.chars().count() > limit {
            let truncated: String = text.chars().take(limit).collect();
            warn!(
                event_name = "guardrail.output_truncated",
                limit, "answer exceeded length bound"
            );
            return Ok(format!("{truncated}... [truncated]"));
        }
        Ok(text.to_string())
    }

    fn validate_input_at(
        &self,
        text: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AgentError> {
        self.check_empty(text)?;
        self.check_length(text)?;
        if self.config.enable_rate_limiting {
            self.check_rate_at(user_id, now)?;
        }
        self.check_harmful(text)
    }

    fn check_empty(&self, text: &str) -> Result<(), AgentError> {
        if text.trim().is_empty() {
            return Err(AgentError::Guardrail {
                category: "empty_input".to_string(),
                message: "Please provide a question.".to_string(),
            });
        }
        Ok(())
    }

    fn check_length(&self, text: &str) -> Result<(), AgentError> {
        if text.chars().count() > self.config.max_length {
            return Err(AgentError::Guardrail {
                category: "input_too_long".to_string(),
                message: format!(
                    "Question is too long (limit {} characters).",
                    self.config.max_length
                ),
            });
        }
        Ok(())
    }

    fn check_harmful(&self, text: &str) -> Result<(), AgentError> {
        if !self.config.enable_content_filter {
            return Ok(());
        }
        if self.harmful.iter().any(|regex| regex.is_match(text)) {
            warn!(event_name = "guardrail.harmful_content", "input rejected by content filter");
            return Err(AgentError::Guardrail {
                category: "harmful_content".to_string(),
                message: "I can't help with that request.".to_string(),
            });
        }
        Ok(())
    }

    /// Per-user sliding-window rate limiter: at most `rate_limit_requests`
    /// accepted requests within the trailing window. The window is pruned on
    /// every check and rejected requests do not consume a slot.
    fn check_rate_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<(), AgentError> {
        let window = Duration::seconds(self.config.rate_limit_window_secs as i64);
        let mut log = self.request_log.lock().unwrap_or_else(PoisonError::into_inner);
        let timestamps = log.entry(user_id.to_string()).or_default();

        while let Some(&oldest) = timestamps.front() {
            if now - oldest > window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.config.rate_limit_requests {
            warn!(
                event_name = "guardrail.rate_limited",
                user_id,
                in_window = timestamps.len(),
                "request rejected by rate limiter"
            );
            return Err(AgentError::Guardrail {
                category: "rate_limit".to_string(),
                message: "Too many requests. Please wait a moment and try again.".to_string(),
            });
        }

        timestamps.push_back(now);
        Ok(())
    }
}
