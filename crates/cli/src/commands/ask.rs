use std::path::Path;
use std::sync::{Arc, RwLock};

use serde_json::json;
use tracing::{debug, warn};

use econ_agent::guardrails::Guardrails;
use econ_agent::llm::ResilientClient;
use econ_agent::ollama::OllamaClient;
use econ_agent::runtime::AgentRuntime;
use econ_agent::tools::{
    AddLearnedInfoTool, AnalyzeColumnTool, CalculateTool, ForecastIndicatorTool,
    SearchDatasetTool, SharedDataset, ToolRegistry, TradeBalanceTool, WebSearchTool,
};
use econ_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use econ_core::{AgentReply, ForecastCache, SearchCache};

use crate::collaborators::{DuckDuckGoSearch, InMemoryKnowledgeStore};
use crate::commands::CommandResult;
use crate::dataset;

pub async fn run(
    question: &str,
    data: &Path,
    model: Option<String>,
    iterations: Option<u32>,
    json_output: bool,
) -> CommandResult {
    let config = match AppConfig::load(LoadOptions {
        overrides: ConfigOverrides {
            llm_model: model,
            max_iterations: iterations,
            ..ConfigOverrides::default()
        },
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("ask", "config", error.to_string(), 2),
    };

    let dataset = match dataset::load_csv(data) {
        Ok(dataset) => dataset,
        Err(error) => return CommandResult::failure("ask", "dataset", error.to_string(), 2),
    };
    let shared: SharedDataset = Arc::new(RwLock::new(Some(dataset)));

    let handles = match build_runtime(&config, shared) {
        Ok(handles) => handles,
        Err(result) => return *result,
    };

    let outcome = handles.runtime.run(question, "cli").await;
    log_cache_stats(&handles);

    match outcome {
        Ok(reply) => CommandResult { exit_code: 0, output: render_reply(&reply, json_output) },
        Err(error) => {
            // Full detail goes to the log; the caller sees the bounded message.
            warn!(event_name = "ask.failed", error = %error, "run failed");
            let message = error.user_message();
            let output = if json_output {
                json!({"error": message}).to_string()
            } else {
                message
            };
            CommandResult { exit_code: 1, output }
        }
    }
}

struct RuntimeHandles {
    runtime: AgentRuntime,
    forecast_cache: Arc<ForecastCache>,
    search_cache: Arc<SearchCache>,
}

fn log_cache_stats(handles: &RuntimeHandles) {
    let forecast = handles.forecast_cache.stats();
    let search = handles.search_cache.stats();
    debug!(
        event_name = "cache.stats",
        forecast_active = forecast.active_entries,
        forecast_total = forecast.total_entries,
        search_active = search.active_entries,
        search_total = search.total_entries,
        "cache occupancy after run"
    );
}

fn build_runtime(
    config: &AppConfig,
    shared: SharedDataset,
) -> Result<RuntimeHandles, Box<CommandResult>> {
    let client = OllamaClient::new(&config.llm)
        .map_err(|error| Box::new(CommandResult::failure("ask", "llm", error.to_string(), 2)))?;
    let resilient = ResilientClient::new(
        client,
        config.agent.circuit_failure_threshold,
        chrono::Duration::seconds(config.agent.circuit_cooldown_secs as i64),
    );

    let search = DuckDuckGoSearch::new(config.llm.timeout_secs)
        .map_err(|error| Box::new(CommandResult::failure("ask", "search", error.to_string(), 2)))?;
    let store = Arc::new(InMemoryKnowledgeStore::new());
    let forecast_cache = Arc::new(ForecastCache::new(
        chrono::Duration::seconds(config.cache.forecast_ttl_secs as i64),
        config.cache.forecast_max_entries,
    ));
    let search_cache = Arc::new(SearchCache::new(
        chrono::Duration::seconds(config.cache.search_ttl_secs as i64),
        config.cache.search_max_entries,
    ));

    let mut registry = ToolRegistry::default();
    registry.register(SearchDatasetTool::new(shared.clone()));
    registry.register(WebSearchTool::new(
        Arc::new(search),
        search_cache.clone(),
        config.agent.region_context.clone(),
    ));
    registry.register(CalculateTool);
    registry.register(AnalyzeColumnTool::new(shared.clone()));
    registry.register(AddLearnedInfoTool::new(store.clone()));
    registry.register(ForecastIndicatorTool::new(shared.clone(), forecast_cache.clone()));
    registry.register(TradeBalanceTool::new(shared.clone()));

    let guardrails = Guardrails::new(config.guardrails.clone()).map_err(|error| {
        Box::new(CommandResult::failure("ask", "guardrails", error.to_string(), 2))
    })?;

    let runtime = AgentRuntime::new(
        config.agent.clone(),
        Arc::new(resilient),
        registry,
        guardrails,
        shared,
        store,
    )
    .map_err(|error| Box::new(CommandResult::failure("ask", "runtime", error.to_string(), 2)))?;

    Ok(RuntimeHandles { runtime, forecast_cache, search_cache })
}

fn render_reply(reply: &AgentReply, json_output: bool) -> String {
    if json_output {
        return serde_json::to_string_pretty(reply)
            .unwrap_or_else(|error| json!({"error": error.to_string()}).to_string());
    }

    let mut lines = vec![reply.answer.clone()];
    if !reply.tool_calls.is_empty() {
        lines.push(String::new());
        lines.push("Tools used:".to_string());
        for call in &reply.tool_calls {
            lines.push(format!("- {}: {}", call.tool, call.result));
        }
    }
    if let Some(followup) = &reply.followup {
        lines.push(String::new());
        lines.push(format!("Suggestion: {followup}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use econ_core::{AgentReply, ToolResult};

    use super::render_reply;

    #[test]
    fn human_rendering_lists_tool_trace() {
        let reply = AgentReply::answered(
            "Exports averaged 116.",
            vec![ToolResult::text("analyze_column", json!({"column": "Exports"}), "{\"mean\":116}")],
        );
        let rendered = render_reply(&reply, false);
        assert!(rendered.starts_with("Exports averaged 116."));
        assert!(rendered.contains("- analyze_column:"));
    }

    #[test]
    fn json_rendering_roundtrips() {
        let reply = AgentReply::answered("ok", Vec::new());
        let rendered = render_reply(&reply, true);
        let parsed: AgentReply = serde_json::from_str(&rendered).expect("parse");
        assert_eq!(parsed, reply);
    }
}
