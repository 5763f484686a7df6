use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message role in the conversation transcript sent to the generation backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One turn in the transcript. The message list is rebuilt fresh per request;
/// messages are never shared across in-flight queries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
}

impl ConversationMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into(), tool_calls: Vec::new() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), tool_calls: Vec::new() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), tool_calls: Vec::new() }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self { role: Role::Tool, content: content.into(), tool_calls: Vec::new() }
    }
}

/// A tool call requested by the backend, either structurally or recovered
/// from free text by the fallback parser.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self { name: name.into(), arguments }
    }

    /// String-valued argument lookup, tolerant of missing keys.
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }

    pub fn arg_u32(&self, key: &str) -> Option<u32> {
        let value = self.arguments.get(key)?;
        value
            .as_u64()
            .map(|n| n as u32)
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
    }
}

/// Outcome of one tool execution. Appended to the per-query trace and never
/// mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: String,
    pub arguments: Value,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization: Option<Value>,
}

impl ToolResult {
    pub fn text(tool: impl Into<String>, arguments: Value, result: impl Into<String>) -> Self {
        Self { tool: tool.into(), arguments, result: result.into(), visualization: None }
    }
}

/// Final payload returned to the caller for one question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    pub answer: String,
    pub tool_calls: Vec<ToolResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followup: Option<String>,
}

impl AgentReply {
    pub fn answered(answer: impl Into<String>, tool_calls: Vec<ToolResult>) -> Self {
        Self { answer: answer.into(), tool_calls, followup: None }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ConversationMessage, Role, ToolInvocation};

    #[test]
    fn role_serializes_lowercase() {
        let message = ConversationMessage::tool("result text");
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value["role"], "tool");
        assert!(value.get("tool_calls").is_none());
    }

    #[test]
    fn invocation_argument_accessors_tolerate_shapes() {
        let invocation = ToolInvocation::new(
            "forecast_economic_indicator",
            json!({"indicator": "exports", "time_periods": "6"}),
        );
        assert_eq!(invocation.arg_str("indicator"), Some("exports"));
        assert_eq!(invocation.arg_u32("time_periods"), Some(6));
        assert_eq!(invocation.arg_str("method"), None);
    }

    #[test]
    fn transcript_roundtrips_through_json() {
        let messages = vec![
            ConversationMessage::system("you are a data analyst"),
            ConversationMessage::user("what were exports in 2024?"),
        ];
        let raw = serde_json::to_string(&messages).expect("serialize");
        let parsed: Vec<ConversationMessage> = serde_json::from_str(&raw).expect("parse");
        assert_eq!(parsed, messages);
        assert_eq!(parsed[0].role, Role::System);
    }
}
