use std::env;
use std::sync::{Mutex, OnceLock};

use finagent_cli::commands::{ask, config, doctor};
use serde_json::Value;

#[test]
fn ask_rejects_blank_query() {
    with_env(&[], || {
        let result = ask::run("   ");
        assert_eq!(result.exit_code, 2, "expected invalid input code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "invalid_input");
    });
}

#[test]
fn ask_returns_config_failure_for_invalid_card_api_url() {
    with_env(&[("FINAGENT_CARD_API_BASE_URL", "card-api:8080")], || {
        let result = ask::run("Activate card ending in 4444");
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn ask_apologises_when_llm_is_unreachable() {
    with_env(
        &[("FINAGENT_LLM_BASE_URL", "http://127.0.0.1:9"), ("FINAGENT_LLM_TIMEOUT_SECS", "2")],
        || {
            let result = ask::run("What is an HSA?");
            assert_eq!(result.exit_code, 1, "expected routing error code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "routing");
            assert_eq!(payload["intent"], "classification_error");
            let message = payload["message"].as_str().unwrap_or_default();
            assert!(message.starts_with("Sorry, I encountered an error processing your request:"));
            let last_state = payload["path"].as_array().and_then(|path| path.last()).cloned();
            assert_eq!(last_state, Some(Value::from("done")));
        },
    );
}

#[test]
fn doctor_passes_with_default_configuration() {
    with_env(&[], || {
        let payload = parse_payload(&doctor::run(true));
        assert_eq!(payload["overall_status"], "pass");

        let checks = payload["checks"].as_array().expect("checks array");
        assert_eq!(checks.len(), 4);
        let knowledge = checks
            .iter()
            .find(|check| check["name"] == "knowledge_retriever")
            .expect("knowledge check");
        assert_eq!(knowledge["details"], "mode `catalog`");
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[("FINAGENT_LLM_PROVIDER", "openai")], || {
        let payload = parse_payload(&doctor::run(true));
        assert_eq!(payload["overall_status"], "fail");

        let statuses: Vec<&str> = payload["checks"]
            .as_array()
            .expect("checks array")
            .iter()
            .filter_map(|check| check["status"].as_str())
            .collect();
        assert_eq!(statuses, vec!["fail", "skipped", "skipped", "skipped"]);
    });
}

#[test]
fn config_attributes_env_sources_and_redacts_api_key() {
    with_env(
        &[
            ("FINAGENT_LLM_PROVIDER", "openai"),
            ("OPENAI_API_KEY", "sk-very-secret-value"),
            ("FINAGENT_LLM_MODEL", "gpt-4o-mini"),
        ],
        || {
            let output = config::run();

            let expected = [
                "- llm.model = gpt-4o-mini (source: env (FINAGENT_LLM_MODEL))",
                "- llm.api_key = sk-*** (source: env (OPENAI_API_KEY))",
                "- card_api.allowed_actions = activate,deactivate (source: default)",
            ];
            for line in expected {
                assert!(output.contains(line), "missing `{line}` in:\n{output}");
            }
            assert!(!output.contains("very-secret-value"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "FINAGENT_LLM_PROVIDER",
        "FINAGENT_LLM_API_KEY",
        "OPENAI_API_KEY",
        "FINAGENT_LLM_BASE_URL",
        "FINAGENT_LLM_MODEL",
        "FINAGENT_LLM_TIMEOUT_SECS",
        "FINAGENT_KNOWLEDGE_BASE_URL",
        "FINAGENT_KNOWLEDGE_TOP_K",
        "FINAGENT_KNOWLEDGE_TIMEOUT_SECS",
        "FINAGENT_CARD_API_BASE_URL",
        "FINAGENT_CARD_API_TIMEOUT_SECS",
        "FINAGENT_CARD_API_ALLOWED_ACTIONS",
        "FINAGENT_SERVER_BIND_ADDRESS",
        "FINAGENT_SERVER_PORT",
        "FINAGENT_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "FINAGENT_LOGGING_LEVEL",
        "FINAGENT_LOGGING_FORMAT",
        "FINAGENT_LOG_LEVEL",
        "FINAGENT_LOG_FORMAT",
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
