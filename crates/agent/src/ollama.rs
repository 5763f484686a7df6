//! HTTP client for an Ollama-compatible chat endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use econ_core::config::LlmConfig;
use econ_core::ToolInvocation;

use crate::llm::{ChatRequest, ChatResponse, LlmClient, LlmError};

pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| LlmError::Transport("ollama base_url is not configured".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    #[serde(default)]
    message: ApiMessage,
}

#[derive(Debug, Default, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        debug!(
            event_name = "llm.request",
            model = %self.model,
            messages = request.messages.len(),
            "sending chat request"
        );

        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "stream": false,
        });
        if let Some(tools) = request.tools {
            body["tools"] = tools;
        }

        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::Transport(format!("backend returned {status}: {detail}")));
        }

        let parsed: ApiChatResponse = response
            .json()
            .await
            .map_err(|error| LlmError::Malformed(error.to_string()))?;

        let tool_calls = parsed
            .message
            .tool_calls
            .into_iter()
            .map(|call| ToolInvocation::new(call.function.name, call.function.arguments))
            .collect();

        Ok(ChatResponse { content: parsed.message.content, tool_calls })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::ApiChatResponse;

    #[test]
    fn parses_structured_tool_calls() {
        let raw = json!({
            "model": "mistral",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{
                    "function": {
                        "name": "analyze_column",
                        "arguments": {"column": "Exports"}
                    }
                }]
            },
            "done": true
        });
        let parsed: ApiChatResponse = serde_json::from_value(raw).expect("parse");
        assert_eq!(parsed.message.tool_calls.len(), 1);
        assert_eq!(parsed.message.tool_calls[0].function.name, "analyze_column");
    }

    #[test]
    fn tolerates_missing_tool_calls() {
        let raw = json!({"message": {"role": "assistant", "content": "Exports grew 5%."}});
        let parsed: ApiChatResponse = serde_json::from_value(raw).expect("parse");
        assert!(parsed.message.tool_calls.is_empty());
        assert_eq!(parsed.message.content, "Exports grew 5%.");
    }
}
