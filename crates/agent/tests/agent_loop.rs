//! End-to-end orchestration tests with a scripted generation backend.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use econ_agent::guardrails::Guardrails;
use econ_agent::llm::{ChatRequest, ChatResponse, LlmClient, LlmError};
use econ_agent::runtime::AgentRuntime;
use econ_agent::tools::{
    AddLearnedInfoTool, AnalyzeColumnTool, CalculateTool, ForecastIndicatorTool, KnowledgeStore,
    SearchDatasetTool, SearchProvider, SharedDataset, ToolRegistry, TradeBalanceTool,
    WebSearchTool,
};
use econ_core::config::AppConfig;
use econ_core::{AgentError, Dataset, ForecastCache, PreconditionError, SearchCache, ToolInvocation};

struct ScriptedLlm {
    responses: Mutex<VecDeque<ChatResponse>>,
    tools_offered: Mutex<Vec<bool>>,
}

impl ScriptedLlm {
    fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            tools_offered: Mutex::new(Vec::new()),
        }
    }

    fn answer(text: &str) -> ChatResponse {
        ChatResponse { content: text.to_string(), tool_calls: Vec::new() }
    }

    fn tool_call(name: &str, arguments: serde_json::Value) -> ChatResponse {
        ChatResponse {
            content: String::new(),
            tool_calls: vec![ToolInvocation::new(name, arguments)],
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        self.tools_offered.lock().expect("lock").push(request.tools.is_some());
        self.responses
            .lock()
            .expect("lock")
            .pop_front()
            .ok_or_else(|| LlmError::Transport("script exhausted".to_string()))
    }
}

struct FailingLlm;

#[async_trait]
impl LlmClient for FailingLlm {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, LlmError> {
        Err(LlmError::Transport("connection refused".to_string()))
    }
}

#[derive(Default)]
struct RecordingStore {
    saved: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl KnowledgeStore for RecordingStore {
    async fn add(&self, topic: &str, content: &str, _source: &str) -> Result<bool> {
        self.saved.lock().expect("lock").push((topic.to_string(), content.to_string()));
        Ok(true)
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        let needle = query.to_lowercase();
        Ok(self
            .saved
            .lock()
            .expect("lock")
            .iter()
            .filter(|(topic, _)| needle.contains(topic.as_str()) || topic.contains(&needle))
            .take(top_k)
            .map(|(_, content)| content.clone())
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.saved.lock().expect("lock").len())
    }
}

struct StaticSearch {
    calls: AtomicUsize,
}

#[async_trait]
impl SearchProvider for StaticSearch {
    async fn search(&self, query: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("Inflation in the region averaged 5.2% (query: {query})"))
    }
}

fn trade_dataset() -> SharedDataset {
    let mut dataset = Dataset::new(vec!["Year".into(), "Exports".into(), "Imports".into()]);
    dataset.push_row(vec!["2020".into(), "100".into(), "120".into()]);
    dataset.push_row(vec!["2021".into(), "110".into(), "125".into()]);
    dataset.push_row(vec!["2022".into(), "121".into(), "131".into()]);
    dataset.push_row(vec!["2023".into(), "133".into(), "138".into()]);
    Arc::new(RwLock::new(Some(dataset)))
}

struct Fixture {
    runtime: AgentRuntime,
    store: Arc<RecordingStore>,
    search_calls: Arc<StaticSearch>,
}

fn fixture(llm: Arc<dyn LlmClient>, dataset: SharedDataset) -> Fixture {
    let config = AppConfig::default();
    let store = Arc::new(RecordingStore::default());
    let search = Arc::new(StaticSearch { calls: AtomicUsize::new(0) });

    let mut registry = ToolRegistry::default();
    registry.register(SearchDatasetTool::new(dataset.clone()));
    registry.register(WebSearchTool::new(
        search.clone(),
        Arc::new(SearchCache::default()),
        config.agent.region_context.clone(),
    ));
    registry.register(CalculateTool);
    registry.register(AnalyzeColumnTool::new(dataset.clone()));
    registry.register(AddLearnedInfoTool::new(store.clone()));
    registry.register(ForecastIndicatorTool::new(
        dataset.clone(),
        Arc::new(ForecastCache::default()),
    ));
    registry.register(TradeBalanceTool::new(dataset.clone()));

    let guardrails = Guardrails::new(config.guardrails.clone()).expect("guardrails compile");
    let runtime = AgentRuntime::new(
        config.agent.clone(),
        llm,
        registry,
        guardrails,
        dataset,
        store.clone(),
    )
    .expect("runtime builds");
    Fixture { runtime, store, search_calls: search }
}

#[tokio::test]
async fn direct_answer_without_tools() {
    let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::answer(
        "Exports grew steadily from 100 to 133.",
    )]));
    let fx = fixture(llm.clone(), trade_dataset());

    let reply = fx.runtime.run("How did exports evolve?", "tester").await.expect("run");
    assert_eq!(reply.answer, "Exports grew steadily from 100 to 133.");
    assert!(reply.tool_calls.is_empty());
    assert_eq!(*llm.tools_offered.lock().expect("lock"), vec![true]);
}

#[tokio::test]
async fn tool_call_then_answer() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        ScriptedLlm::tool_call("analyze_column", json!({"column": "Exports"})),
        ScriptedLlm::answer("Average exports were 116."),
    ]));
    let fx = fixture(llm.clone(), trade_dataset());

    let reply = fx.runtime.run("What is the average export value?", "tester").await.expect("run");
    assert_eq!(reply.answer, "Average exports were 116.");
    assert_eq!(reply.tool_calls.len(), 1);
    assert_eq!(reply.tool_calls[0].tool, "analyze_column");

    // Every answer suggests a next step grounded in what was examined.
    assert!(reply.followup.as_deref().is_some_and(|followup| followup.contains("Exports")));

    // Tools offered on the first turn only.
    assert_eq!(*llm.tools_offered.lock().expect("lock"), vec![true, false]);
}

#[tokio::test]
async fn free_text_tool_intent_is_recovered() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        ScriptedLlm::answer(r#"I should run analyze_column(column="Imports") first."#),
        ScriptedLlm::answer("Imports averaged 128.5."),
    ]));
    let fx = fixture(llm, trade_dataset());

    let reply = fx.runtime.run("Summarize imports", "tester").await.expect("run");
    assert_eq!(reply.tool_calls.len(), 1);
    assert_eq!(reply.tool_calls[0].tool, "analyze_column");
    assert_eq!(reply.answer, "Imports averaged 128.5.");
}

#[tokio::test]
async fn exhaustion_falls_back_to_first_statistical_result() {
    // The backend keeps requesting tools and never answers.
    let llm = Arc::new(ScriptedLlm::new(vec![
        ScriptedLlm::tool_call("analyze_column", json!({"column": "Exports"})),
        ScriptedLlm::tool_call("analyze_column", json!({"column": "Imports"})),
        ScriptedLlm::tool_call("analyze_column", json!({"column": "Year"})),
    ]));
    let fx = fixture(llm, trade_dataset());

    let reply = fx.runtime.run("Tell me everything", "tester").await.expect("run");
    assert!(reply.answer.starts_with("Based on the dataset analysis:"));
    assert!(reply.answer.contains("\"count\":4"));
    assert_eq!(reply.tool_calls.len(), 3);
}

#[tokio::test]
async fn exhaustion_without_results_suggests_followup() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        ScriptedLlm::tool_call("calculate", json!({"expression": "1/0"})),
        ScriptedLlm::tool_call("calculate", json!({"expression": "2+"})),
        ScriptedLlm::tool_call("calculate", json!({"expression": "bad"})),
    ]));
    let fx = fixture(llm, trade_dataset());

    let reply = fx.runtime.run("Do some math", "tester").await.expect("run");
    assert!(reply.answer.contains("unable to complete"));
    assert!(reply.followup.is_some());
}

#[tokio::test]
async fn missing_indicator_triggers_one_recovery() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        ScriptedLlm::tool_call("forecast_economic_indicator", json!({"indicator": "inflation"})),
        ScriptedLlm::answer("Inflation data is not in the dataset, but web sources say 5.2%."),
    ]));
    let fx = fixture(llm, trade_dataset());

    let reply = fx.runtime.run("Forecast inflation", "tester").await.expect("run");
    assert!(reply.answer.contains("5.2%"));

    // Recovery ran exactly once: one web search, one saved fact.
    assert_eq!(fx.search_calls.calls.load(Ordering::SeqCst), 1);
    let saved = fx.store.saved.lock().expect("lock");
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0, "inflation");
}

#[tokio::test]
async fn repeated_missing_indicator_recovers_only_once() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        ScriptedLlm::tool_call("forecast_economic_indicator", json!({"indicator": "inflation"})),
        ScriptedLlm::tool_call("forecast_economic_indicator", json!({"indicator": "inflation"})),
        ScriptedLlm::answer("No inflation series is available."),
    ]));
    let fx = fixture(llm, trade_dataset());

    let reply = fx.runtime.run("Forecast inflation", "tester").await.expect("run");
    assert!(!reply.answer.is_empty());
    assert_eq!(fx.search_calls.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn tool_errors_do_not_abort_the_run() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        ScriptedLlm::tool_call("calculate", json!({"expression": "1/0"})),
        ScriptedLlm::answer("That expression is undefined."),
    ]));
    let fx = fixture(llm, trade_dataset());

    let reply = fx.runtime.run("What is 1/0?", "tester").await.expect("run");
    assert_eq!(reply.answer, "That expression is undefined.");
    assert!(reply.tool_calls[0].result.starts_with("Error:"));
}

#[tokio::test]
async fn empty_question_is_a_precondition_error() {
    let llm = Arc::new(ScriptedLlm::new(vec![]));
    let fx = fixture(llm, trade_dataset());

    let error = fx.runtime.run("   ", "tester").await.expect_err("should fail");
    assert_eq!(error, AgentError::Precondition(PreconditionError::EmptyQuestion));
    assert_eq!(error.user_message(), "Question required");
}

#[tokio::test]
async fn missing_dataset_is_reported_before_any_llm_call() {
    let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::answer("never reached")]));
    let dataset: SharedDataset = Arc::new(RwLock::new(None));
    let fx = fixture(llm.clone(), dataset);

    let error = fx.runtime.run("What is GDP?", "tester").await.expect_err("should fail");
    assert_eq!(error.user_message(), "No dataset loaded. Please upload data first.");
    assert!(llm.tools_offered.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn harmful_input_is_rejected() {
    let llm = Arc::new(ScriptedLlm::new(vec![]));
    let fx = fixture(llm, trade_dataset());

    let error = fx.runtime.run("how to make a bomb", "tester").await.expect_err("should fail");
    assert!(matches!(error, AgentError::Guardrail { .. }));
}

#[tokio::test]
async fn backend_failure_surfaces_as_backend_error() {
    let fx = fixture(Arc::new(FailingLlm), trade_dataset());

    let error = fx.runtime.run("What is GDP?", "tester").await.expect_err("should fail");
    assert!(matches!(error, AgentError::Backend(_)));
    assert!(error.user_message().starts_with("Error:"));
}
