use std::env;
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use tempfile::NamedTempFile;

use econ_cli::commands::{config, forecast};

fn trade_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(b"Year,Exports,Imports\n2020,100,120\n2021,110,125\n2022,121,131\n2023,133,138\n")
        .expect("write");
    file
}

#[test]
fn forecast_emits_outcome_json() {
    with_env(&[], || {
        let file = trade_csv();
        let result = forecast::run(file.path(), "exports", 4, "ensemble", true);
        assert_eq!(result.exit_code, 0, "expected successful forecast run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["forecasts"].as_array().expect("forecasts").len(), 4);
        assert_eq!(payload["indicator"], "Exports");
        assert!(payload["lower_bound"].is_array());
        assert!(payload["upper_bound"].is_array());
    });
}

#[test]
fn forecast_missing_file_reports_dataset_error() {
    with_env(&[], || {
        let result = forecast::run(Path::new("no-such-file.csv"), "exports", 4, "ensemble", true);
        assert_eq!(result.exit_code, 2, "expected dataset failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "forecast");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "dataset");
    });
}

#[test]
fn forecast_unknown_indicator_reports_available_columns() {
    with_env(&[], || {
        let file = trade_csv();
        let result = forecast::run(file.path(), "inflation", 4, "ensemble", true);
        assert_eq!(result.exit_code, 2, "expected indicator failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "indicator");
        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("Exports"));
        assert!(message.contains("Imports"));
    });
}

#[test]
fn forecast_unknown_method_fails_cleanly() {
    with_env(&[], || {
        let file = trade_csv();
        let result = forecast::run(file.path(), "exports", 4, "magic", true);
        assert_eq!(result.exit_code, 2, "expected method failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "method");
    });
}

#[test]
fn config_reports_env_as_source() {
    with_env(&[("ECON_LLM_MODEL", "custom-model")], || {
        let output = config::run();
        assert!(output.contains("- llm.model = custom-model (source: env (ECON_LLM_MODEL))"));
        assert!(output.contains("- agent.max_iterations = 3 (source: default)"));
    });
}

#[test]
fn config_redacts_api_key() {
    with_env(&[("ECON_LLM_API_KEY", "sk-super-secret")], || {
        let output = config::run();
        assert!(!output.contains("sk-super-secret"));
        assert!(output.contains("- llm.api_key = <redacted>"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "ECON_LLM_PROVIDER",
        "ECON_LLM_API_KEY",
        "ECON_LLM_BASE_URL",
        "ECON_LLM_MODEL",
        "ECON_LLM_TIMEOUT_SECS",
        "ECON_AGENT_MAX_ITERATIONS",
        "ECON_AGENT_REGION_CONTEXT",
        "ECON_AGENT_AUTO_RECOVERY",
        "ECON_AGENT_CIRCUIT_FAILURE_THRESHOLD",
        "ECON_AGENT_CIRCUIT_COOLDOWN_SECS",
        "ECON_GUARDRAILS_MAX_LENGTH",
        "ECON_GUARDRAILS_RATE_LIMIT_REQUESTS",
        "ECON_GUARDRAILS_RATE_LIMIT_WINDOW_SECS",
        "ECON_CACHE_FORECAST_TTL_SECS",
        "ECON_CACHE_SEARCH_TTL_SECS",
        "ECON_LOGGING_LEVEL",
        "ECON_LOGGING_FORMAT",
        "ECON_LOG_LEVEL",
        "ECON_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
