//! Tool registry and the built-in tool set.
//!
//! Tools are the only way the backend touches data. Each tool resolves to a
//! textual result; execution failures are captured as `Error: ...` results
//! rather than propagated, so one bad call never aborts the run.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use econ_core::{
    CacheKey, Dataset, ForecastCache, ForecastMethod, Forecaster, SearchCache, ToolInvocation,
    ToolResult,
};

/// Dataset slot shared between the CLI loader and the tools.
pub type SharedDataset = Arc<RwLock<Option<Dataset>>>;

/// Persistent store for facts the agent learns mid-conversation.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Record a fact. Returns `false` when an identical fact already exists.
    async fn add(&self, topic: &str, content: &str, source: &str) -> Result<bool>;
    /// The `top_k` stored facts most relevant to a free-text query.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>>;
    async fn count(&self) -> Result<usize>;
}

/// External web search abstraction. Implementations return pre-formatted
/// result text ready for the transcript.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<String>;
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    /// Catalogue entry in the backend's function-calling wire format.
    fn spec(&self) -> Value;
    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolResult>;
}

fn function_spec(name: &str, description: &str, parameters: Value) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": parameters,
        }
    })
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
    order: Vec<&'static str>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        let name = tool.name();
        if self.tools.insert(name, Arc::new(tool)).is_none() {
            self.order.push(name);
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Full tool catalogue, in registration order.
    pub fn catalogue(&self) -> Value {
        Value::Array(self.order.iter().filter_map(|name| self.tools.get(name)).map(|t| t.spec()).collect())
    }

    /// Execute one invocation. Never errors: unknown tools and tool failures
    /// become textual results the loop can observe.
    pub async fn dispatch(&self, invocation: &ToolInvocation) -> ToolResult {
        if let Some(correction) = misdirected_calculate(invocation) {
            debug!(
                event_name = "tools.misdirected_call",
                tool = %invocation.name,
                "calculate invoked with forecast-shaped arguments"
            );
            return ToolResult::text(invocation.name.clone(), invocation.arguments.clone(), correction);
        }

        let Some(tool) = self.tools.get(invocation.name.as_str()) else {
            debug!(event_name = "tools.unknown", tool = %invocation.name, "unknown tool requested");
            return ToolResult::text(
                invocation.name.clone(),
                invocation.arguments.clone(),
                format!("Error: unknown tool '{}'", invocation.name),
            );
        };

        match tool.execute(&invocation).await {
            Ok(result) => result,
            Err(error) => ToolResult::text(
                invocation.name.clone(),
                invocation.arguments.clone(),
                format!("Error: {error}"),
            ),
        }
    }

}

/// Backends sometimes route forecast requests through `calculate`. Rather
/// than guessing at the intended call, the registry answers with a
/// correction naming the right tool so the backend can retry properly.
fn misdirected_calculate(invocation: &ToolInvocation) -> Option<String> {
    if invocation.name != "calculate" {
        return None;
    }
    let has_forecast_args = ["indicator", "periods", "method"]
        .iter()
        .any(|key| invocation.arguments.get(key).is_some());
    if !has_forecast_args {
        return None;
    }
    Some(
        "Error: 'calculate' evaluates arithmetic expressions only (an 'expression' argument). \
         To forecast an indicator, call 'forecast_economic_indicator' with arguments \
         {indicator, periods, method}."
            .to_string(),
    )
}

// ---------------------------------------------------------------------------
// search_dataset

pub struct SearchDatasetTool {
    dataset: SharedDataset,
}

impl SearchDatasetTool {
    pub fn new(dataset: SharedDataset) -> Self {
        Self { dataset }
    }
}

#[async_trait]
impl Tool for SearchDatasetTool {
    fn name(&self) -> &'static str {
        "search_dataset"
    }

    fn spec(&self) -> Value {
        function_spec(
            self.name(),
            "Try this first: search the loaded dataset for columns related to a query. Returns matching column names with sample values.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Term to look for in column names"}
                },
                "required": ["query"]
            }),
        )
    }

    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolResult> {
        let query = invocation.arg_str("query").ok_or_else(|| anyhow!("missing 'query'"))?;
        let guard = self.dataset.read().map_err(|_| anyhow!("dataset lock poisoned"))?;
        let dataset = guard.as_ref().ok_or_else(|| anyhow!("No dataset loaded."))?;

        let needle = query.to_lowercase();
        let matches: Vec<String> = dataset
            .columns()
            .iter()
            .filter(|column| column.to_lowercase().contains(&needle))
            .map(|column| {
                let sample: Vec<&str> = dataset
                    .column(column)
                    .unwrap_or(&[])
                    .iter()
                    .take(5)
                    .map(String::as_str)
                    .collect();
                format!("{column}: [{}]", sample.join(", "))
            })
            .collect();

        let text = if matches.is_empty() {
            format!(
                "No columns matching '{query}'. Available columns: {}",
                dataset.columns().join(", ")
            )
        } else {
            format!(
                "Found {} matching column(s) across {} rows:\n{}",
                matches.len(),
                dataset.row_count(),
                matches.join("\n")
            )
        };

        Ok(ToolResult::text(self.name(), invocation.arguments.clone(), text))
    }
}

// ---------------------------------------------------------------------------
// web_search

const ECONOMIC_KEYWORDS: &[&str] = &[
    "gdp", "inflation", "export", "import", "trade", "unemployment", "economy", "economic",
    "fiscal", "remittance", "industrial", "agricultur", "wage", "budget",
];

pub struct WebSearchTool {
    provider: Arc<dyn SearchProvider>,
    cache: Arc<SearchCache>,
    region_context: String,
}

impl WebSearchTool {
    pub fn new(provider: Arc<dyn SearchProvider>, cache: Arc<SearchCache>, region_context: impl Into<String>) -> Self {
        Self { provider, cache, region_context: region_context.into() }
    }

    /// Economic queries with no geographic anchor are scoped to the
    /// configured region so generic terms resolve to local statistics.
    fn scoped_query(&self, query: &str) -> String {
        let lowered = query.to_lowercase();
        let is_economic = ECONOMIC_KEYWORDS.iter().any(|keyword| lowered.contains(keyword));
        let mentions_region = lowered.contains(&self.region_context.to_lowercase());
        if is_economic && !mentions_region {
            format!("{} {query}", self.region_context)
        } else {
            query.to_string()
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn spec(&self) -> Value {
        function_spec(
            self.name(),
            "Last resort: search the web for current economic information, only when the dataset cannot answer.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query"}
                },
                "required": ["query"]
            }),
        )
    }

    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolResult> {
        let query = invocation.arg_str("query").ok_or_else(|| anyhow!("missing 'query'"))?;
        let scoped = self.scoped_query(query);

        let key = SearchCache::key(&scoped);
        if let Some(cached) = self.cache.get(&key) {
            debug!(event_name = "tools.search_cache_hit", query = %scoped, "serving cached search");
            return Ok(ToolResult::text(self.name(), invocation.arguments.clone(), cached));
        }

        let results = self.provider.search(&scoped).await?;
        self.cache.set(key, results.clone());
        Ok(ToolResult::text(self.name(), invocation.arguments.clone(), results))
    }
}

// ---------------------------------------------------------------------------
// calculate

pub struct CalculateTool;

#[async_trait]
impl Tool for CalculateTool {
    fn name(&self) -> &'static str {
        "calculate"
    }

    fn spec(&self) -> Value {
        function_spec(
            self.name(),
            "Evaluate an arithmetic expression with +, -, *, /, % and parentheses.",
            json!({
                "type": "object",
                "properties": {
                    "expression": {"type": "string", "description": "Arithmetic expression, e.g. (120 - 100) / 100 * 100"}
                },
                "required": ["expression"]
            }),
        )
    }

    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolResult> {
        let expression =
            invocation.arg_str("expression").ok_or_else(|| anyhow!("missing 'expression'"))?;
        let value = evaluate_expression(expression)?;
        let rendered =
            if value.fract() == 0.0 { format!("{value}") } else { format!("{value:.6}") };
        Ok(ToolResult::text(
            self.name(),
            invocation.arguments.clone(),
            format!("{expression} = {rendered}"),
        ))
    }
}

/// Recursive-descent evaluation over +, -, *, /, %, parentheses and unary
/// minus. No function calls, no variables.
pub fn evaluate_expression(input: &str) -> Result<f64> {
    let mut parser = ExprParser { bytes: input.as_bytes(), position: 0 };
    let value = parser.expression()?;
    parser.skip_whitespace();
    if parser.position != parser.bytes.len() {
        bail!("unexpected trailing input at position {}", parser.position);
    }
    Ok(value)
}

struct ExprParser<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl ExprParser<'_> {
    fn expression(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'+') => {
                    self.position += 1;
                    value += self.term()?;
                }
                Some(b'-') => {
                    self.position += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.factor()?;
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'*') => {
                    self.position += 1;
                    value *= self.factor()?;
                }
                Some(b'/') => {
                    self.position += 1;
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        bail!("division by zero");
                    }
                    value /= divisor;
                }
                Some(b'%') => {
                    self.position += 1;
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        bail!("modulo by zero");
                    }
                    value %= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    fn factor(&mut self) -> Result<f64> {
        self.skip_whitespace();
        match self.peek() {
            Some(b'-') => {
                self.position += 1;
                Ok(-self.factor()?)
            }
            Some(b'(') => {
                self.position += 1;
                let value = self.expression()?;
                self.skip_whitespace();
                if self.peek() != Some(b')') {
                    bail!("missing closing parenthesis");
                }
                self.position += 1;
                Ok(value)
            }
            Some(byte) if byte.is_ascii_digit() || byte == b'.' => self.number(),
            Some(byte) => bail!("unexpected character '{}'", byte as char),
            None => bail!("unexpected end of expression"),
        }
    }

    fn number(&mut self) -> Result<f64> {
        let start = self.position;
        while let Some(byte) = self.peek() {
            if byte.is_ascii_digit() || byte == b'.' {
                self.position += 1;
            } else {
                break;
            }
        }
        let raw = std::str::from_utf8(&self.bytes[start..self.position])
            .map_err(|_| anyhow!("invalid number"))?;
        raw.parse::<f64>().map_err(|_| anyhow!("invalid number '{raw}'"))
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.position).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(byte) if byte.is_ascii_whitespace()) {
            self.position += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// analyze_column

pub struct AnalyzeColumnTool {
    dataset: SharedDataset,
}

impl AnalyzeColumnTool {
    pub fn new(dataset: SharedDataset) -> Self {
        Self { dataset }
    }
}

#[async_trait]
impl Tool for AnalyzeColumnTool {
    fn name(&self) -> &'static str {
        "analyze_column"
    }

    fn spec(&self) -> Value {
        function_spec(
            self.name(),
            "Use after search_dataset has located a column. Compute statistics: summary (count, mean, min, max, std_dev) or distribution (top values with counts).",
            json!({
                "type": "object",
                "properties": {
                    "column": {"type": "string", "description": "Column name or a fragment of it"},
                    "analysis": {"type": "string", "enum": ["summary", "distribution"], "description": "Analysis kind, defaults to summary"}
                },
                "required": ["column"]
            }),
        )
    }

    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolResult> {
        let requested = invocation.arg_str("column").ok_or_else(|| anyhow!("missing 'column'"))?;
        let analysis = invocation.arg_str("analysis").unwrap_or("summary");

        let guard = self.dataset.read().map_err(|_| anyhow!("dataset lock poisoned"))?;
        let dataset = guard.as_ref().ok_or_else(|| anyhow!("No dataset loaded."))?;
        let column = dataset.find_column(requested).ok_or_else(|| {
            anyhow!(
                "No column matching '{requested}' in the dataset. Available columns: {}",
                dataset.columns().join(", ")
            )
        })?;

        let payload = match analysis {
            "distribution" => distribution_payload(dataset, column),
            _ => {
                let series = dataset.numeric_series(column);
                if series.is_empty() {
                    // Non-numeric column: fall back to value counts.
                    distribution_payload(dataset, column)
                } else {
                    summary_payload(column, &series)
                }
            }
        };

        Ok(ToolResult::text(
            self.name(),
            invocation.arguments.clone(),
            serde_json::to_string(&payload)?,
        ))
    }
}

fn summary_payload(column: &str, series: &[f64]) -> Value {
    let count = series.len();
    let sum: f64 = series.iter().sum();
    let mean = sum / count as f64;
    let min = series.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = series.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let variance = series.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / count as f64;
    json!({
        "column": column,
        "analysis": "summary",
        "count": count,
        "mean": mean,
        "min": min,
        "max": max,
        "std_dev": variance.sqrt(),
    })
}

fn distribution_payload(dataset: &Dataset, column: &str) -> Value {
    let counts: Vec<Value> = dataset
        .value_counts(column, 10)
        .into_iter()
        .map(|(value, count)| json!({"value": value, "count": count}))
        .collect();
    json!({
        "column": column,
        "analysis": "distribution",
        "top_values": counts,
    })
}

// ---------------------------------------------------------------------------
// add_learned_info

pub struct AddLearnedInfoTool {
    store: Arc<dyn KnowledgeStore>,
}

impl AddLearnedInfoTool {
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AddLearnedInfoTool {
    fn name(&self) -> &'static str {
        "add_learned_info"
    }

    fn spec(&self) -> Value {
        function_spec(
            self.name(),
            "Save a newly learned fact to the knowledge base for future questions.",
            json!({
                "type": "object",
                "properties": {
                    "topic": {"type": "string", "description": "Short topic label"},
                    "content": {"type": "string", "description": "The fact to remember"},
                    "source": {"type": "string", "description": "Where the fact came from"}
                },
                "required": ["topic", "content"]
            }),
        )
    }

    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolResult> {
        let topic = invocation.arg_str("topic").ok_or_else(|| anyhow!("missing 'topic'"))?;
        let content = invocation.arg_str("content").ok_or_else(|| anyhow!("missing 'content'"))?;
        let source = invocation.arg_str("source").unwrap_or("agent");

        let inserted = self.store.add(topic, content, source).await?;
        let text = if inserted {
            info!(event_name = "tools.knowledge_saved", topic, source, "learned fact saved");
            format!("Saved under topic '{topic}'.")
        } else {
            format!("Already recorded under topic '{topic}'.")
        };
        Ok(ToolResult::text(self.name(), invocation.arguments.clone(), text))
    }
}

// ---------------------------------------------------------------------------
// forecast_economic_indicator

const DEFAULT_FORECAST_PERIODS: u32 = 6;
const MAX_FORECAST_PERIODS: u32 = 24;

pub struct ForecastIndicatorTool {
    dataset: SharedDataset,
    cache: Arc<ForecastCache>,
    forecaster: Forecaster,
}

impl ForecastIndicatorTool {
    pub fn new(dataset: SharedDataset, cache: Arc<ForecastCache>) -> Self {
        Self { dataset, cache, forecaster: Forecaster::new() }
    }
}

#[async_trait]
impl Tool for ForecastIndicatorTool {
    fn name(&self) -> &'static str {
        "forecast_economic_indicator"
    }

    fn spec(&self) -> Value {
        function_spec(
            self.name(),
            "Preferred for any projection question: forecast future values of an economic indicator from its historical series in the dataset.",
            json!({
                "type": "object",
                "properties": {
                    "indicator": {"type": "string", "description": "Indicator name, matched against dataset columns"},
                    "periods": {"type": "integer", "description": "Forecast horizon, defaults to 6"},
                    "method": {"type": "string", "enum": ForecastMethod::ALL, "description": "Estimator, defaults to ensemble"}
                },
                "required": ["indicator"]
            }),
        )
    }

    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolResult> {
        let indicator =
            invocation.arg_str("indicator").ok_or_else(|| anyhow!("missing 'indicator'"))?;
        let periods = invocation
            .arg_u32("periods")
            .unwrap_or(DEFAULT_FORECAST_PERIODS)
            .clamp(1, MAX_FORECAST_PERIODS);
        let method_name = invocation.arg_str("method").unwrap_or("ensemble");
        let method: ForecastMethod = method_name.parse()?;

        let (column, series) = {
            let guard = self.dataset.read().map_err(|_| anyhow!("dataset lock poisoned"))?;
            let dataset = guard.as_ref().ok_or_else(|| anyhow!("No dataset loaded."))?;
            let column = dataset
                .find_column(indicator)
                .ok_or_else(|| {
                    anyhow!(
                        "No column matching '{indicator}' in the dataset. Available columns: {}",
                        dataset.columns().join(", ")
                    )
                })?
                .to_string();
            (column.clone(), dataset.numeric_series(&column))
        };

        let fingerprint = CacheKey::of("series", &json!(series)).as_str().to_string();
        let key = ForecastCache::key(indicator, periods, method_name, &fingerprint);
        if let Some(cached) = self.cache.get(&key) {
            debug!(event_name = "tools.forecast_cache_hit", indicator, "serving cached forecast");
            return Ok(ToolResult::text(self.name(), invocation.arguments.clone(), cached));
        }

        let mut outcome = self.forecaster.run(method, &series, periods as usize)?;
        outcome.annotate(&column, &series, periods as usize);
        let rendered = serde_json::to_string(&outcome)?;
        self.cache.set(key, rendered.clone());

        let visualization = json!({
            "type": "line",
            "indicator": column,
            "historical": series,
            "forecast": outcome.forecasts,
        });

        Ok(ToolResult {
            tool: self.name().to_string(),
            arguments: invocation.arguments.clone(),
            result: rendered,
            visualization: Some(visualization),
        })
    }
}

// ---------------------------------------------------------------------------
// forecast_trade_balance

const DEFAULT_BALANCE_PERIODS: u32 = 4;

pub struct TradeBalanceTool {
    dataset: SharedDataset,
    forecaster: Forecaster,
}

impl TradeBalanceTool {
    pub fn new(dataset: SharedDataset) -> Self {
        Self { dataset, forecaster: Forecaster::new() }
    }

    /// Pull exports and imports series. Prefers dedicated columns; falls back
    /// to a value column split by a flow/direction column.
    fn trade_series(dataset: &Dataset) -> Result<(Vec<f64>, Vec<f64>)> {
        if let (Some(exports_column), Some(imports_column)) =
            (dataset.find_column("export"), dataset.find_column("import"))
        {
            let exports = dataset.numeric_series(exports_column);
            let imports = dataset.numeric_series(imports_column);
            if !exports.is_empty() && !imports.is_empty() {
                return Ok((exports, imports));
            }
        }

        if let (Some(flow_column), Some(value_column)) =
            (dataset.find_column("flow"), dataset.find_column("value"))
        {
            let exports = dataset.numeric_series_where(value_column, flow_column, "export");
            let imports = dataset.numeric_series_where(value_column, flow_column, "import");
            if !exports.is_empty() && !imports.is_empty() {
                return Ok((exports, imports));
            }
        }

        bail!("dataset has no export/import columns and no flow split to derive them")
    }
}

#[async_trait]
impl Tool for TradeBalanceTool {
    fn name(&self) -> &'static str {
        "forecast_trade_balance"
    }

    fn spec(&self) -> Value {
        function_spec(
            self.name(),
            "Use instead of forecast_economic_indicator for trade-balance questions: forecast the trade balance (exports minus imports) from the dataset's trade series.",
            json!({
                "type": "object",
                "properties": {
                    "periods": {"type": "integer", "description": "Forecast horizon, defaults to 4"}
                }
            }),
        )
    }

    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolResult> {
        let periods = invocation
            .arg_u32("periods")
            .unwrap_or(DEFAULT_BALANCE_PERIODS)
            .clamp(1, MAX_FORECAST_PERIODS);

        let (exports, imports) = {
            let guard = self.dataset.read().map_err(|_| anyhow!("dataset lock poisoned"))?;
            let dataset = guard.as_ref().ok_or_else(|| anyhow!("No dataset loaded."))?;
            Self::trade_series(dataset)?
        };

        let horizon = periods as usize;
        let export_outcome = self.forecaster.run(ForecastMethod::Ensemble, &exports, horizon)?;
        let import_outcome = self.forecaster.run(ForecastMethod::Ensemble, &imports, horizon)?;

        let balance: Vec<f64> = export_outcome
            .forecasts
            .iter()
            .zip(import_outcome.forecasts.iter())
            .map(|(e, i)| e - i)
            .collect();
        let last_balance = match (exports.last(), imports.last()) {
            (Some(e), Some(i)) => Some(e - i),
            _ => None,
        };

        let payload = json!({
            "periods": horizon,
            "export_forecast": export_outcome.forecasts,
            "import_forecast": import_outcome.forecasts,
            "balance_forecast": balance,
            "last_actual_balance": last_balance,
            "method": "ensemble",
        });

        let visualization = json!({
            "type": "line",
            "indicator": "trade_balance",
            "forecast": balance,
        });

        Ok(ToolResult {
            tool: self.name().to_string(),
            arguments: invocation.arguments.clone(),
            result: serde_json::to_string(&payload)?,
            visualization: Some(visualization),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, RwLock};

    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;

    use econ_core::{Dataset, ForecastCache, SearchCache, ToolInvocation};

    use super::{
        evaluate_expression, AnalyzeColumnTool, CalculateTool, ForecastIndicatorTool,
        SearchDatasetTool, SearchProvider, SharedDataset, Tool, ToolRegistry, TradeBalanceTool,
        WebSearchTool,
    };

    fn shared_dataset() -> SharedDataset {
        let mut dataset = Dataset::new(vec!["Year".into(), "Exports".into(), "Imports".into()]);
        dataset.push_row(vec!["2020".into(), "100".into(), "120".into()]);
        dataset.push_row(vec!["2021".into(), "110".into(), "125".into()]);
        dataset.push_row(vec!["2022".into(), "121".into(), "131".into()]);
        dataset.push_row(vec!["2023".into(), "133".into(), "138".into()]);
        Arc::new(RwLock::new(Some(dataset)))
    }

    struct CountingSearch {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl SearchProvider for CountingSearch {
        async fn search(&self, query: &str) -> Result<String> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(format!("results for {query}"))
        }
    }

    #[test]
    fn arithmetic_respects_precedence_and_parens() {
        assert_eq!(evaluate_expression("2 + 3 * 4").expect("eval"), 14.0);
        assert_eq!(evaluate_expression("(2 + 3) * 4").expect("eval"), 20.0);
        assert_eq!(evaluate_expression("-5 + 10").expect("eval"), 5.0);
        assert_eq!(evaluate_expression("(120 - 100) / 100 * 100").expect("eval"), 20.0);
        assert!(evaluate_expression("1 / 0").is_err());
        assert!(evaluate_expression("2 +").is_err());
        assert!(evaluate_expression("import os").is_err());
    }

    #[test]
    fn tool_descriptions_declare_relative_priority() {
        let dataset = shared_dataset();
        let provider = Arc::new(CountingSearch { calls: std::sync::atomic::AtomicUsize::new(0) });

        let description = |spec: serde_json::Value| {
            spec["function"]["description"].as_str().expect("description").to_lowercase()
        };

        assert!(description(SearchDatasetTool::new(dataset.clone()).spec()).contains("first"));
        assert!(description(
            WebSearchTool::new(provider, Arc::new(SearchCache::default()), "Moldova").spec()
        )
        .contains("last resort"));
        assert!(description(AnalyzeColumnTool::new(dataset).spec()).contains("after search_dataset"));
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_result() {
        let registry = ToolRegistry::default();
        let result = registry.dispatch(&ToolInvocation::new("no_such_tool", json!({}))).await;
        assert!(result.result.starts_with("Error: unknown tool"));
    }

    #[tokio::test]
    async fn calculate_with_forecast_args_names_the_right_tool() {
        let mut registry = ToolRegistry::default();
        registry.register(CalculateTool);

        let result = registry
            .dispatch(&ToolInvocation::new(
                "calculate",
                json!({"indicator": "exports", "periods": 3}),
            ))
            .await;
        assert_eq!(result.tool, "calculate");
        assert!(result.result.starts_with("Error:"));
        assert!(result.result.contains("forecast_economic_indicator"));
    }

    #[tokio::test]
    async fn tool_failure_becomes_error_text() {
        let mut registry = ToolRegistry::default();
        registry.register(CalculateTool);
        let result =
            registry.dispatch(&ToolInvocation::new("calculate", json!({"expression": "1/0"}))).await;
        assert!(result.result.starts_with("Error:"));
    }

    #[tokio::test]
    async fn analyze_column_reports_summary_statistics() {
        let tool = AnalyzeColumnTool::new(shared_dataset());
        let result = tool
            .execute(&ToolInvocation::new("analyze_column", json!({"column": "exports"})))
            .await
            .expect("execute");
        let payload: serde_json::Value = serde_json::from_str(&result.result).expect("json");
        assert_eq!(payload["count"], 4);
        assert_eq!(payload["min"], 100.0);
        assert_eq!(payload["max"], 133.0);
    }

    #[tokio::test]
    async fn analyze_missing_column_lists_available() {
        let tool = AnalyzeColumnTool::new(shared_dataset());
        let error = tool
            .execute(&ToolInvocation::new("analyze_column", json!({"column": "inflation"})))
            .await
            .expect_err("should fail");
        let message = error.to_string();
        assert!(message.contains("No column matching 'inflation'"));
        assert!(message.contains("Exports"));
    }

    #[tokio::test]
    async fn search_dataset_returns_matches_with_samples() {
        let tool = SearchDatasetTool::new(shared_dataset());
        let result = tool
            .execute(&ToolInvocation::new("search_dataset", json!({"query": "port"})))
            .await
            .expect("execute");
        assert!(result.result.contains("Exports"));
        assert!(result.result.contains("Imports"));
    }

    #[tokio::test]
    async fn web_search_scopes_economic_queries_and_caches() {
        let provider = Arc::new(CountingSearch { calls: std::sync::atomic::AtomicUsize::new(0) });
        let tool =
            WebSearchTool::new(provider.clone(), Arc::new(SearchCache::default()), "Moldova");

        let invocation = ToolInvocation::new("web_search", json!({"query": "gdp growth 2025"}));
        let first = tool.execute(&invocation).await.expect("execute");
        assert!(first.result.contains("Moldova gdp growth 2025"));

        let second = tool.execute(&invocation).await.expect("execute");
        assert_eq!(second.result, first.result);
        assert_eq!(provider.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn forecast_tool_caches_by_arguments_and_data() {
        let dataset = shared_dataset();
        let cache = Arc::new(ForecastCache::default());
        let tool = ForecastIndicatorTool::new(dataset, cache.clone());

        let invocation = ToolInvocation::new(
            "forecast_economic_indicator",
            json!({"indicator": "exports", "periods": 3}),
        );
        let first = tool.execute(&invocation).await.expect("execute");
        let second = tool.execute(&invocation).await.expect("execute");
        assert_eq!(first.result, second.result);
        assert_eq!(cache.stats().total_entries, 1);
    }

    #[tokio::test]
    async fn trade_balance_subtracts_imports_from_exports() {
        let tool = TradeBalanceTool::new(shared_dataset());
        let result = tool
            .execute(&ToolInvocation::new("forecast_trade_balance", json!({"periods": 2})))
            .await
            .expect("execute");
        let payload: serde_json::Value = serde_json::from_str(&result.result).expect("json");
        let exports = payload["export_forecast"].as_array().expect("exports");
        let imports = payload["import_forecast"].as_array().expect("imports");
        let balance = payload["balance_forecast"].as_array().expect("balance");
        for index in 0..2 {
            let expected = exports[index].as_f64().expect("f64") - imports[index].as_f64().expect("f64");
            assert!((balance[index].as_f64().expect("f64") - expected).abs() < 1e-9);
        }
        assert_eq!(payload["last_actual_balance"], json!(133.0 - 138.0));
    }
}
