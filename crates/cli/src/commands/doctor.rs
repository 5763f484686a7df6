use std::time::Duration;

use serde::Serialize;

use econ_agent::guardrails::Guardrails;
use econ_core::config::{AppConfig, LlmProvider, LoadOptions};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub async fn run(json_output: bool) -> String {
    let report = build_report().await;

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

async fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_guardrail_patterns(&config));
            checks.push(check_backend_connectivity(&config).await);
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "guardrail_patterns",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "backend_connectivity",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let all_ok = checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if all_ok { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_ok {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_guardrail_patterns(config: &AppConfig) -> DoctorCheck {
    match Guardrails::new(config.guardrails.clone()) {
        Ok(_) => DoctorCheck {
            name: "guardrail_patterns",
            status: CheckStatus::Pass,
            details: "content and PII patterns compiled".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "guardrail_patterns",
            status: CheckStatus::Fail,
            details: format!("pattern compilation failed: {error}"),
        },
    }
}

async fn check_backend_connectivity(config: &AppConfig) -> DoctorCheck {
    let base_url = match (&config.llm.provider, &config.llm.base_url) {
        (LlmProvider::Ollama, Some(base_url)) => base_url.trim_end_matches('/').to_string(),
        (LlmProvider::Ollama, None) => {
            return DoctorCheck {
                name: "backend_connectivity",
                status: CheckStatus::Fail,
                details: "ollama provider configured without base_url".to_string(),
            };
        }
        (LlmProvider::OpenAi, _) => {
            return DoctorCheck {
                name: "backend_connectivity",
                status: CheckStatus::Skipped,
                details: "remote provider, no local endpoint to probe".to_string(),
            };
        }
    };

    let result: Result<(), String> = async {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .map_err(|error| format!("failed to build http client: {error}"))?;
        let response = client
            .get(format!("{base_url}/api/tags"))
            .send()
            .await
            .map_err(|error| format!("backend unreachable: {error}"))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("backend returned {}", response.status()))
        }
    }
    .await;

    match result {
        Ok(()) => DoctorCheck {
            name: "backend_connectivity",
            status: CheckStatus::Pass,
            details: format!("reached `{base_url}`"),
        },
        Err(error) => {
            DoctorCheck { name: "backend_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
