use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use finagent_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

impl Field {
    fn new(key: &'static str, env_keys: &'static [&'static str], value: impl Into<String>) -> Self {
        Self { key, env_keys, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_secret(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    let fields = [
        Field::new(
            "llm.provider",
            &["FINAGENT_LLM_PROVIDER"],
            format!("{:?}", config.llm.provider),
        ),
        Field::new("llm.model", &["FINAGENT_LLM_MODEL"], config.llm.model.clone()),
        Field::new("llm.base_url", &["FINAGENT_LLM_BASE_URL"], config.llm.effective_base_url()),
        Field::new("llm.api_key", &["FINAGENT_LLM_API_KEY", "OPENAI_API_KEY"], api_key),
        Field::new(
            "llm.timeout_secs",
            &["FINAGENT_LLM_TIMEOUT_SECS"],
            config.llm.timeout_secs.to_string(),
        ),
        Field::new(
            "knowledge.base_url",
            &["FINAGENT_KNOWLEDGE_BASE_URL"],
            config.knowledge.base_url.clone().unwrap_or_else(|| "<unset: catalog>".to_string()),
        ),
        Field::new(
            "knowledge.top_k",
            &["FINAGENT_KNOWLEDGE_TOP_K"],
            config.knowledge.top_k.to_string(),
        ),
        Field::new(
            "card_api.base_url",
            &["FINAGENT_CARD_API_BASE_URL"],
            config.card_api.base_url.clone(),
        ),
        Field::new(
            "card_api.timeout_secs",
            &["FINAGENT_CARD_API_TIMEOUT_SECS"],
            config.card_api.timeout_secs.to_string(),
        ),
        Field::new(
            "card_api.allowed_actions",
            &["FINAGENT_CARD_API_ALLOWED_ACTIONS"],
            config.card_api.allowed_actions.join(","),
        ),
        Field::new(
            "server.bind_address",
            &["FINAGENT_SERVER_BIND_ADDRESS"],
            config.server.bind_address.clone(),
        ),
        Field::new("server.port", &["FINAGENT_SERVER_PORT"], config.server.port.to_string()),
        Field::new(
            "logging.level",
            &["FINAGENT_LOGGING_LEVEL", "FINAGENT_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        Field::new(
            "logging.format",
            &["FINAGENT_LOGGING_FORMAT", "FINAGENT_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in &fields {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    ["finagent.toml", "config/finagent.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
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

fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_secret};

    #[test]
    fn secrets_keep_only_their_prefix() {
        assert_eq!(redact_secret("sk-live-abcdef"), "sk-***");
        assert_eq!(redact_secret("opaque"), "<redacted>");
        assert_eq!(redact_secret("  "), "<empty>");
    }

    #[test]
    fn nested_keys_are_found_in_file_document() {
        let doc: Value = "[card_api]\nbase_url = \"http://cards\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "card_api.base_url"));
        assert!(!contains_path(&doc, "card_api.timeout_secs"));
        assert!(!contains_path(&doc, "llm.model"));
    }
}
