//! The think / call-tools / observe loop.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use econ_core::config::AgentConfig;
use econ_core::{
    AgentError, AgentReply, ConversationMessage, DatasetInfo, PreconditionError, ToolInvocation,
    ToolResult,
};

use crate::guardrails::Guardrails;
use crate::llm::{ChatRequest, LlmClient};
use crate::parser::TextToolParser;
use crate::tools::{KnowledgeStore, SharedDataset, ToolRegistry};

pub struct AgentRuntime {
    config: AgentConfig,
    llm: Arc<dyn LlmClient>,
    registry: ToolRegistry,
    guardrails: Guardrails,
    parser: TextToolParser,
    dataset: SharedDataset,
    knowledge: Arc<dyn KnowledgeStore>,
}

impl AgentRuntime {
    pub fn new(
        config: AgentConfig,
        llm: Arc<dyn LlmClient>,
        registry: ToolRegistry,
        guardrails: Guardrails,
        dataset: SharedDataset,
        knowledge: Arc<dyn KnowledgeStore>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            config,
            llm,
            registry,
            guardrails,
            parser: TextToolParser::new()?,
            dataset,
            knowledge,
        })
    }

    /// Answer one question. Always returns a usable reply unless the backend
    /// itself is unreachable or a guardrail rejects the input.
    pub async fn run(&self, question: &str, user_id: &str) -> Result<AgentReply, AgentError> {
        let question = self.guardrails.sanitize(question);
        if question.is_empty() {
            return Err(PreconditionError::EmptyQuestion.into());
        }

        let dataset_info = {
            let guard = self
                .dataset
                .read()
                .map_err(|_| AgentError::Internal("dataset lock poisoned".to_string()))?;
            let dataset = guard.as_ref().ok_or(PreconditionError::NoDatasetLoaded)?;
            dataset.info()
        };

        self.guardrails.validate_input(&question, user_id)?;
        info!(event_name = "agent.question", rows = dataset_info.rows, "starting run");

        let mut messages = vec![
            ConversationMessage::system(self.system_prompt(&dataset_info)),
            ConversationMessage::user(question),
        ];
        let catalogue = self.registry.catalogue();
        let mut trace: Vec<ToolResult> = Vec::new();
        let mut first_statistical: Option<String> = None;
        let mut recovered: HashSet<String> = HashSet::new();

        for iteration in 0..self.config.max_iterations {
            // Tools are offered only on the first turn; follow-up turns must
            // synthesize the observations into an answer.
            let tools = (iteration == 0).then(|| catalogue.clone());
            let response = self
                .llm
                .chat(ChatRequest { messages: messages.clone(), tools })
                .await
                .map_err(|error| AgentError::Backend(error.to_string()))?;

            let mut calls = response.tool_calls.clone();
            if calls.is_empty() {
                calls = self.parser.parse(&response.content);
            }

            if calls.is_empty() {
                let answer = self.guardrails.validate_output(&response.content)?;
                info!(
                    event_name = "agent.answered",
                    iteration,
                    tool_calls = trace.len(),
                    "run complete"
                );
                let followup = suggest_followup(&trace);
                return Ok(AgentReply { answer, tool_calls: trace, followup });
            }

            let mut assistant = ConversationMessage::assistant(response.content.clone());
            assistant.tool_calls = calls.clone();
            messages.push(assistant);

            for call in &calls {
                debug!(event_name = "agent.tool_call", tool = %call.name, "executing tool");
                let result = self.registry.dispatch(call).await;

                if let Some(indicator) = missing_indicator(&result.result) {
                    if self.config.auto_recovery && recovered.insert(indicator.clone()) {
                        if let Some(note) = self.recover_indicator(&indicator).await {
                            messages.push(ConversationMessage::tool(note));
                        }
                    }
                }

                let is_statistical = result.tool == "analyze_column"
                    || result.tool.starts_with("forecast");
                if first_statistical.is_none()
                    && is_statistical
                    && !result.result.starts_with("Error:")
                {
                    first_statistical = Some(result.result.clone());
                }

                messages
                    .push(ConversationMessage::tool(format!("{}: {}", result.tool, result.result)));
                trace.push(result);
            }
        }

        warn!(
            event_name = "agent.iterations_exhausted",
            budget = self.config.max_iterations,
            "answering from collected tool output"
        );
        let (answer, followup) = match first_statistical {
            Some(result) => {
                (format!("Based on the dataset analysis: {result}"), suggest_followup(&trace))
            }
            None => (
                "I was unable to complete the analysis within the allotted steps.".to_string(),
                Some("Try asking about a specific dataset column or indicator.".to_string()),
            ),
        };
        Ok(AgentReply {
            answer: self.guardrails.validate_output(&answer)?,
            tool_calls: trace,
            followup,
        })
    }

    fn system_prompt(&self, info: &DatasetInfo) -> String {
        format!(
            "You are an economic data analyst for {region}. A dataset with {rows} rows is loaded; \
             its columns are: {columns}. Use the available tools to ground every number you state, \
             in this priority: search_dataset first, then analyze_column, then the forecast tools; \
             use web_search only when the dataset cannot answer. Statistics and forecasts must come \
             from tool results, never from memory. When you have enough information, answer \
             concisely in plain language.",
            region = self.config.region_context,
            rows = info.rows,
            columns = info.columns.join(", "),
        )
    }

    /// One-shot recovery for an indicator the dataset does not carry: check
    /// the knowledge corpus, look the indicator up on the web, persist what
    /// was found, then re-query the corpus and hand the combined context back
    /// to the conversation as an explicit instruction.
    async fn recover_indicator(&self, indicator: &str) -> Option<String> {
        let query = format!("{indicator} statistics");
        if self.guardrails.validate_followup(&query).is_err() {
            return None;
        }

        info!(event_name = "agent.auto_recovery", indicator, "recovering missing indicator");
        let prior = self.knowledge.search(indicator, 3).await.unwrap_or_default();

        let search = self
            .registry
            .dispatch(&ToolInvocation::new("web_search", json!({"query": query})))
            .await;
        let found = !search.result.starts_with("Error:")
            && !search.result.starts_with("No web results");
        if found {
            if let Err(error) = self.knowledge.add(indicator, &search.result, "web_search").await {
                warn!(
                    event_name = "agent.recovery_save_failed",
                    indicator,
                    error = %error,
                    "could not persist recovered fact"
                );
            }
        }

        // Re-query so the payload reflects what the corpus holds now.
        let mut context = self.knowledge.search(indicator, 3).await.unwrap_or(prior);
        if context.is_empty() && found {
            context.push(search.result.clone());
        }
        if context.is_empty() {
            warn!(event_name = "agent.recovery_failed", indicator, "no context recovered");
            return None;
        }

        Some(format!(
            "Recovered information about '{indicator}':\n{}\n\
             Answer the question using this information directly; do not tell the user \
             to consult external sources.",
            context.join("\n")
        ))
    }
}

/// Every answer carries a nudge toward the next useful question, shaped by
/// what the run already looked at.
fn suggest_followup(trace: &[ToolResult]) -> Option<String> {
    if trace.iter().any(|result| result.tool.starts_with("forecast")) {
        return Some(
            "Ask for the same forecast with a specific method, such as trend or growth, \
             to compare estimators."
                .to_string(),
        );
    }
    if let Some(analyzed) = trace.iter().find(|result| result.tool == "analyze_column") {
        if let Some(column) = analyzed.arguments.get("column").and_then(Value::as_str) {
            return Some(format!("Ask for a forecast of '{column}' to see where it is heading."));
        }
    }
    Some("You can also ask for a forecast of any numeric indicator in the dataset.".to_string())
}

/// Extract the indicator name from a column-lookup failure message.
fn missing_indicator(result: &str) -> Option<String> {
    let marker = "No column matching '";
    let start = result.find(marker)? + marker.len();
    let rest = &result[start..];
    let end = rest.find('\'')?;
    Some(rest[..end].to_string())
}
