//! Fallback extraction of tool intent from free-form backend text.
//!
//! Smaller models often narrate a tool call instead of emitting the
//! structured form. This parser first looks for embedded JSON tool objects;
//! failing that, it scans for call-like text (`tool_name(key="value", ...)`)
//! against the known tool names in a fixed precedence order. It never
//! errors: text with no recognizable intent yields no invocations and is
//! treated as a final answer.

use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::debug;

use econ_core::ToolInvocation;

/// Known tool names, in extraction precedence order.
const CALL_PRECEDENCE: &[&str] = &[
    "web_search",
    "analyze_column",
    "search_dataset",
    "forecast_economic_indicator",
    "forecast_trade_balance",
];

pub struct TextToolParser {
    calls: Vec<(&'static str, Regex)>,
    argument: Regex,
}

impl TextToolParser {
    pub fn new() -> Result<Self, regex::Error> {
        let calls = CALL_PRECEDENCE
            .iter()
            .map(|name| Regex::new(&format!(r"\b{name}\s*\(([^)]*)\)")).map(|regex| (*name, regex)))
            .collect::<Result<_, _>>()?;
        let argument = Regex::new(r#"(\w+)\s*=\s*(?:"([^"]*)"|'([^']*)'|(-?\d+(?:\.\d+)?))"#)?;
        Ok(Self { calls, argument })
    }

    /// Recover tool invocations from `text`. Embedded JSON objects win and
    /// stop the scan; otherwise every call-syntax match is collected, with
    /// ties between tools broken by the precedence list above.
    pub fn parse(&self, text: &str) -> Vec<ToolInvocation> {
        let from_json = Self::parse_json(text);
        if !from_json.is_empty() {
            debug!(
                event_name = "parser.json_tool_calls",
                count = from_json.len(),
                "recovered tool calls from embedded JSON"
            );
            return from_json;
        }

        let mut invocations = Vec::new();
        for (name, regex) in &self.calls {
            for captures in regex.captures_iter(text) {
                let raw_args = captures.get(1).map_or("", |m| m.as_str());
                invocations.push(ToolInvocation::new(*name, self.parse_arguments(raw_args)));
            }
        }
        if !invocations.is_empty() {
            debug!(
                event_name = "parser.call_syntax",
                count = invocations.len(),
                "recovered tool calls from call-like text"
            );
        }
        invocations
    }

    /// `key="value"` and `key=number` pairs inside one call's parentheses.
    fn parse_arguments(&self, raw: &str) -> Value {
        let mut arguments = Map::new();
        for captures in self.argument.captures_iter(raw) {
            let key = captures[1].to_string();
            let value = if let Some(text) = captures.get(2).or_else(|| captures.get(3)) {
                Value::String(text.as_str().to_string())
            } else if let Some(number) = captures.get(4) {
                serde_json::from_str(number.as_str()).unwrap_or(Value::Null)
            } else {
                Value::Null
            };
            arguments.insert(key, value);
        }
        Value::Object(arguments)
    }

    /// Every balanced `{...}` block that parses as a tool object, in order
    /// of appearance. Nested blocks inside a recognized object are skipped.
    fn parse_json(text: &str) -> Vec<ToolInvocation> {
        let mut invocations = Vec::new();
        let bytes = text.as_bytes();
        let mut index = 0;
        while index < bytes.len() {
            if bytes[index] != b'{' {
                index += 1;
                continue;
            }
            match balanced_object_end(text, index) {
                Some(end) => {
                    if let Some(invocation) = Self::invocation_from_value(&text[index..end]) {
                        invocations.push(invocation);
                        index = end;
                    } else {
                        index += 1;
                    }
                }
                None => index += 1,
            }
        }
        invocations
    }

    fn invocation_from_value(raw: &str) -> Option<ToolInvocation> {
        let value: Value = serde_json::from_str(raw).ok()?;
        let object = value.as_object()?;
        let name = object
            .get("name")
            .or_else(|| object.get("tool"))
            .and_then(Value::as_str)?
            .to_string();
        let arguments = object
            .get("arguments")
            .or_else(|| object.get("parameters"))
            .cloned()
            .unwrap_or_else(|| json!({}));
        Some(ToolInvocation::new(name, arguments))
    }
}

/// Byte offset one past the `}` that balances the `{` at `start`, honoring
/// string literals and escapes. `None` when the braces never balance.
fn balanced_object_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, byte) in text.as_bytes().iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::TextToolParser;

    fn parser() -> TextToolParser {
        TextToolParser::new().expect("patterns compile")
    }

    #[test]
    fn embedded_json_wins_over_call_syntax() {
        let text = r#"I could run web_search(query="gdp"), but instead: {"name": "analyze_column", "arguments": {"column": "GDP"}}"#;
        let calls = parser().parse(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "analyze_column");
        assert_eq!(calls[0].arguments, json!({"column": "GDP"}));
    }

    #[test]
    fn multiple_json_objects_are_all_recovered() {
        let text = r#"First {"name": "web_search", "arguments": {"query": "inflation"}}
            then {"tool": "analyze_column", "parameters": {"column": "CPI"}}"#;
        let calls = parser().parse(text);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "web_search");
        assert_eq!(calls[1].name, "analyze_column");
        assert_eq!(calls[1].arg_str("column"), Some("CPI"));
    }

    #[test]
    fn call_syntax_with_string_argument() {
        let calls = parser().parse(r#"Let me run web_search(query="Moldova GDP 2024") first."#);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "web_search");
        assert_eq!(calls[0].arg_str("query"), Some("Moldova GDP 2024"));
    }

    #[test]
    fn call_syntax_with_single_quotes() {
        let calls = parser().parse("I'll call analyze_column(column='Exports')");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "analyze_column");
        assert_eq!(calls[0].arg_str("column"), Some("Exports"));
    }

    #[test]
    fn call_syntax_with_numeric_argument() {
        let calls =
            parser().parse(r#"forecast_economic_indicator(indicator="exports", periods=6)"#);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "forecast_economic_indicator");
        assert_eq!(calls[0].arg_str("indicator"), Some("exports"));
        assert_eq!(calls[0].arg_u32("periods"), Some(6));
    }

    #[test]
    fn multiple_calls_follow_precedence_order() {
        let text = r#"analyze_column(column="Exports") and also web_search(query="trade news")"#;
        let calls = parser().parse(text);
        assert_eq!(calls.len(), 2);
        // web_search outranks analyze_column regardless of text order.
        assert_eq!(calls[0].name, "web_search");
        assert_eq!(calls[1].name, "analyze_column");
    }

    #[test]
    fn trade_balance_call_without_arguments() {
        let calls = parser().parse("Next step: forecast_trade_balance()");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "forecast_trade_balance");
        assert_eq!(calls[0].arguments, json!({}));
    }

    #[test]
    fn plain_prose_yields_no_calls() {
        let calls = parser().parse("Exports grew by roughly 5% year over year.");
        assert!(calls.is_empty());
    }

    #[test]
    fn malformed_text_yields_no_calls() {
        assert!(parser().parse(r#"web_search(query="dangling"#).is_empty());
        assert!(parser().parse(r#"{"name": "web_search", "arguments": "#).is_empty());
        assert!(parser().parse("{}{}{").is_empty());
    }
}
