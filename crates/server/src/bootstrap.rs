use std::sync::Arc;

use finagent_agent::runtime::AgentRuntime;
use finagent_core::config::{AppConfig, ConfigError};
use finagent_core::errors::ApplicationError;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("agent runtime wiring failed: {0}")]
    Runtime(#[from] ApplicationError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let runtime = AgentRuntime::from_config(&config)?;
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        llm_model = %config.llm.model,
        knowledge_mode = runtime.knowledge_responder().retriever_mode(),
        card_api = %config.card_api.base_url,
        "agent runtime wired"
    );

    Ok(Application { config, runtime: Arc::new(runtime) })
}

#[cfg(test)]
mod tests {
    use finagent_core::config::{AppConfig, ConfigOverrides, LlmProvider, LoadOptions};

    use crate::bootstrap::{bootstrap_with_config, BootstrapError};

    #[test]
    fn default_config_wires_catalog_knowledge() {
        let app = bootstrap_with_config(AppConfig::default()).expect("defaults should bootstrap");

        assert_eq!(app.runtime.knowledge_responder().retriever_mode(), "catalog");
        assert_eq!(
            app.runtime.card_executor().policy().allowed_actions().to_vec(),
            vec!["activate".to_string(), "deactivate".to_string()]
        );
    }

    #[test]
    fn configured_search_url_selects_vector_search() {
        let mut config = AppConfig::default();
        config.knowledge.base_url = Some("http://search.internal:9000".to_string());

        let app = bootstrap_with_config(config).expect("bootstrap");

        assert_eq!(app.runtime.knowledge_responder().retriever_mode(), "vector_search");
    }

    #[test]
    fn bootstrap_fails_fast_on_invalid_config() {
        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                llm_provider: Some(LlmProvider::Ollama),
                card_api_base_url: Some("card-api:8080".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .map_err(BootstrapError::from)
        .and_then(bootstrap_with_config);

        let error = match result {
            Err(error) => error,
            Ok(_) => panic!("invalid card api url should fail"),
        };
        assert!(matches!(error, BootstrapError::Config(_)));
        assert!(error.to_string().contains("card_api.base_url"));
    }
}
