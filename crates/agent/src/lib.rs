//! Agent runtime - LLM-driven question answering over an economic dataset
//!
//! This crate provides the orchestration layer of the assistant:
//! - Sends the conversation to a generation backend and interprets its
//!   tool requests (`llm`, `ollama`)
//! - Enforces input/output guardrails and rate limits (`guardrails`)
//! - Executes dataset, forecasting, knowledge, and web tools (`tools`)
//! - Recovers tool intent from free text when the backend cannot emit
//!   structured calls (`parser`)
//!
//! # Architecture
//!
//! `AgentRuntime::run` drives a bounded loop: think, call tools, observe,
//! answer. Tools are offered to the backend only on the first turn; follow-up
//! turns must synthesize the observations into a final answer. The loop never
//! exceeds the configured iteration budget and always returns something usable.
//!
//! # Safety Principle
//!
//! The LLM decides which tools to invoke and how to phrase the answer. It
//! never computes numbers: statistics and forecasts come from deterministic
//! code in `econ-core`, and the raw tool output travels back to the caller
//! alongside the prose.

pub mod guardrails;
pub mod llm;
pub mod ollama;
pub mod parser;
pub mod runtime;
pub mod tools;
