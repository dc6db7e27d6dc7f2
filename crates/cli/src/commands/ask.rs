use finagent_agent::runtime::AgentRuntime;
use finagent_core::config::{AppConfig, LoadOptions};
use finagent_core::domain::intent::{IntentKind, Request};
use finagent_core::flows::RouterState;
use serde::Serialize;
use uuid::Uuid;

use super::{serialize_payload, CommandResult};

const COMMAND: &str = "ask";

#[derive(Debug, Serialize)]
struct AskOutcome {
    command: &'static str,
    status: &'static str,
    error_class: Option<&'static str>,
    message: String,
    intent: IntentKind,
    error_detail: Option<String>,
    note: Option<String>,
    path: Vec<RouterState>,
    correlation_id: String,
}

/// Runs one routing call against the configured collaborators. Exit code 1 means the
/// router answered but reported an error detail.
pub fn run(query: &str) -> CommandResult {
    let query = query.trim();
    if query.is_empty() {
        return CommandResult::failure(COMMAND, "invalid_input", "query must not be empty", 2);
    }

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2)
        }
    };

    let runtime = match AgentRuntime::from_config(&config) {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(COMMAND, "runtime_wiring", error.to_string(), 3)
        }
    };

    let async_runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(async_runtime) => async_runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "async_runtime",
                format!("failed to initialize async runtime: {error}"),
                4,
            )
        }
    };

    let correlation_id = Uuid::new_v4().to_string();
    let result = async_runtime
        .block_on(runtime.route_with_correlation(&Request::new(query), correlation_id.clone()));

    let failed = result.error_detail.is_some();
    let payload = AskOutcome {
        command: COMMAND,
        status: if failed { "error" } else { "ok" },
        error_class: failed.then_some("routing"),
        message: result.final_message,
        intent: result.intent_kind,
        error_detail: result.error_detail,
        note: result.note,
        path: result.path,
        correlation_id,
    };

    CommandResult { exit_code: u8::from(failed), output: serialize_payload(&payload) }
}
