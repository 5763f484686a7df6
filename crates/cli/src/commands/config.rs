use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use econ_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "llm.provider",
        &format!("{:?}", config.llm.provider),
        source("llm.provider", "ECON_LLM_PROVIDER"),
    ));
    lines.push(render_line("llm.model", &config.llm.model, source("llm.model", "ECON_LLM_MODEL")));
    lines.push(render_line(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("<unset>"),
        source("llm.base_url", "ECON_LLM_BASE_URL"),
    ));
    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line("llm.api_key", api_key, source("llm.api_key", "ECON_LLM_API_KEY")));
    lines.push(render_line(
        "llm.timeout_secs",
        &config.llm.timeout_secs.to_string(),
        source("llm.timeout_secs", "ECON_LLM_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "agent.max_iterations",
        &config.agent.max_iterations.to_string(),
        source("agent.max_iterations", "ECON_AGENT_MAX_ITERATIONS"),
    ));
    lines.push(render_line(
        "agent.region_context",
        &config.agent.region_context,
        source("agent.region_context", "ECON_AGENT_REGION_CONTEXT"),
    ));
    lines.push(render_line(
        "agent.auto_recovery",
        &config.agent.auto_recovery.to_string(),
        source("agent.auto_recovery", "ECON_AGENT_AUTO_RECOVERY"),
    ));
    lines.push(render_line(
        "agent.circuit_failure_threshold",
        &config.agent.circuit_failure_threshold.to_string(),
        source("agent.circuit_failure_threshold", "ECON_AGENT_CIRCUIT_FAILURE_THRESHOLD"),
    ));
    lines.push(render_line(
        "agent.circuit_cooldown_secs",
        &config.agent.circuit_cooldown_secs.to_string(),
        source("agent.circuit_cooldown_secs", "ECON_AGENT_CIRCUIT_COOLDOWN_SECS"),
    ));

    lines.push(render_line(
        "guardrails.max_length",
        &config.guardrails.max_length.to_string(),
        source("guardrails.max_length", "ECON_GUARDRAILS_MAX_LENGTH"),
    ));
    lines.push(render_line(
        "guardrails.rate_limit_requests",
        &config.guardrails.rate_limit_requests.to_string(),
        source("guardrails.rate_limit_requests", "ECON_GUARDRAILS_RATE_LIMIT_REQUESTS"),
    ));
    lines.push(render_line(
        "guardrails.rate_limit_window_secs",
        &config.guardrails.rate_limit_window_secs.to_string(),
        source("guardrails.rate_limit_window_secs", "ECON_GUARDRAILS_RATE_LIMIT_WINDOW_SECS"),
    ));

    lines.push(render_line(
        "cache.forecast_ttl_secs",
        &config.cache.forecast_ttl_secs.to_string(),
        source("cache.forecast_ttl_secs", "ECON_CACHE_FORECAST_TTL_SECS"),
    ));
    lines.push(render_line(
        "cache.search_ttl_secs",
        &config.cache.search_ttl_secs.to_string(),
        source("cache.search_ttl_secs", "ECON_CACHE_SEARCH_TTL_SECS"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "ECON_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "ECON_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("econ.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/econ.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
