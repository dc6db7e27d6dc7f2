use finagent_agent::runtime::AgentRuntime;
use finagent_core::config::{AppConfig, LlmProvider, LoadOptions};
use serde::Serialize;

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

const DEPENDENT_CHECKS: [&str; 3] = ["llm_endpoint", "card_api_endpoint", "knowledge_retriever"];

pub fn run(json_output: bool) -> String {
    let report = build_report();

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

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_endpoint(&config));
            checks.push(check_card_api(&config));
            checks.push(check_knowledge_retriever(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.extend(DEPENDENT_CHECKS.into_iter().map(|name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            }));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_endpoint(config: &AppConfig) -> DoctorCheck {
    let credential = match (config.llm.provider, config.llm.api_key.is_some()) {
        (_, true) => "api key present",
        (LlmProvider::Ollama, false) => "no api key required",
        (LlmProvider::OpenAi, false) => {
            return DoctorCheck {
                name: "llm_endpoint",
                status: CheckStatus::Fail,
                details: "openai provider configured without an api key".to_string(),
            }
        }
    };

    DoctorCheck {
        name: "llm_endpoint",
        status: CheckStatus::Pass,
        details: format!(
            "{:?} model `{}` at {} ({credential})",
            config.llm.provider,
            config.llm.model,
            config.llm.effective_base_url()
        ),
    }
}

fn check_card_api(config: &AppConfig) -> DoctorCheck {
    DoctorCheck {
        name: "card_api_endpoint",
        status: CheckStatus::Pass,
        details: format!(
            "{} (actions: {})",
            config.card_api.base_url,
            config.card_api.allowed_actions.join(", ")
        ),
    }
}

fn check_knowledge_retriever(config: &AppConfig) -> DoctorCheck {
    match AgentRuntime::from_config(config) {
        Ok(runtime) => DoctorCheck {
            name: "knowledge_retriever",
            status: CheckStatus::Pass,
            details: format!("mode `{}`", runtime.knowledge_responder().retriever_mode()),
        },
        Err(error) => DoctorCheck {
            name: "knowledge_retriever",
            status: CheckStatus::Fail,
            details: format!("agent runtime could not be wired: {error}"),
        },
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
