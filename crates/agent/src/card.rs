use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use finagent_core::config::CardApiConfig;
use finagent_core::domain::card::CardLastFour;
use finagent_core::domain::intent::ActionDetails;
use finagent_core::domain::outcome::AgentOutcome;
use finagent_core::errors::RoutingError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::guardrails::{CardActionPolicy, GuardrailDecision};

pub const MISSING_DETAILS_MESSAGE: &str = "Internal error: Missing card action details.";
pub const MISSING_DETAILS_ERROR: &str = "missing action details";

/// Body of a 2xx card-service reply. `success` defaults to true when the service omits it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardApiResult {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(skip)]
    pub data: Option<Value>,
}

fn default_success() -> bool {
    true
}

impl CardApiResult {
    pub fn succeeded(message: Option<&str>) -> Self {
        Self {
            success: true,
            message: message.map(str::to_string),
            card_number: None,
            data: None,
        }
    }

    pub fn rejected(message: &str) -> Self {
        Self {
            success: false,
            message: Some(message.to_string()),
            card_number: None,
            data: None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CardApiError {
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("API error: request timed out: {0}")]
    Timeout(String),
    #[error("API error: {0}")]
    Transport(String),
    #[error("API error: malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for CardApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

#[async_trait]
pub trait CardActionClient: Send + Sync {
    async fn perform(
        &self,
        action: &str,
        card: &CardLastFour,
        parameters: &BTreeMap<String, String>,
    ) -> Result<CardApiResult, CardApiError>;
}

/// Card-management service adapter: `POST {base_url}/{action}` with `{"cardLastFour", ..}`.
#[derive(Clone, Debug)]
pub struct HttpCardActionClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCardActionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CardApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub fn from_config(config: &CardApiConfig) -> Result<Self, CardApiError> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl CardActionClient for HttpCardActionClient {
    async fn perform(
        &self,
        action: &str,
        card: &CardLastFour,
        parameters: &BTreeMap<String, String>,
    ) -> Result<CardApiResult, CardApiError> {
        let mut payload = Map::new();
        for (key, value) in parameters {
            payload.insert(key.clone(), Value::String(value.clone()));
        }
        payload.insert("cardLastFour".to_string(), Value::String(card.as_str().to_string()));

        let response = self
            .client
            .post(format!("{}/{action}", self.base_url))
            .json(&Value::Object(payload))
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&raw)
                .ok()
                .and_then(|body| body.get("message").and_then(Value::as_str).map(str::to_string))
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| format!("Error {}", status.as_u16()));
            return Err(CardApiError::Rejected { status: status.as_u16(), message });
        }

        if raw.trim().is_empty() {
            return Ok(CardApiResult::succeeded(None));
        }

        let body: Value = serde_json::from_str(&raw)
            .map_err(|error| CardApiError::Malformed(error.to_string()))?;
        let mut result: CardApiResult = serde_json::from_value(body.clone())
            .map_err(|error| CardApiError::Malformed(error.to_string()))?;
        result.data = Some(body);
        Ok(result)
    }
}

/// Outcome of one card action plus the raw service reply, when one was received.
#[derive(Clone, Debug, PartialEq)]
pub struct CardExecution {
    pub outcome: AgentOutcome,
    pub response: Option<CardApiResult>,
}

impl CardExecution {
    fn without_response(outcome: AgentOutcome) -> Self {
        Self { outcome, response: None }
    }
}

#[derive(Clone)]
pub struct CardActionExecutor {
    client: Arc<dyn CardActionClient>,
    policy: CardActionPolicy,
}

impl CardActionExecutor {
    pub fn new(client: Arc<dyn CardActionClient>, policy: CardActionPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &CardActionPolicy {
        &self.policy
    }

    pub async fn execute(&self, details: Option<&ActionDetails>) -> AgentOutcome {
        self.execute_detailed(details).await.outcome
    }

    pub async fn execute_detailed(&self, details: Option<&ActionDetails>) -> CardExecution {
        let Some(details) = details.filter(|details| details.is_complete()) else {
            let defect = RoutingError::MissingPrecondition(MISSING_DETAILS_ERROR.to_string());
            tracing::error!(
                event_name = "card_action.missing_precondition",
                error_code = defect.code(),
                error = %defect,
                "card action executor invoked without action details"
            );
            return CardExecution::without_response(AgentOutcome::failure(
                MISSING_DETAILS_MESSAGE,
                defect.to_string(),
            ));
        };

        let display_action = details.action.trim();
        let approved = match self.policy.evaluate(details) {
            GuardrailDecision::Allow(approved) => approved,
            GuardrailDecision::Deny { reason_code, reason } => {
                tracing::warn!(
                    event_name = "card_action.rejected",
                    reason_code,
                    action = display_action,
                    "card action rejected by policy"
                );
                return CardExecution::without_response(failure(display_action, reason));
            }
        };

        tracing::info!(
            event_name = "card_action.dispatched",
            action = %approved.action,
            card = %approved.card.masked(),
            "calling card service"
        );

        match self.client.perform(&approved.action, &approved.card, &approved.parameters).await {
            Ok(result) if result.success => {
                let message = result
                    .message
                    .clone()
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| format!("Card {display_action} processed successfully."));
                tracing::info!(
                    event_name = "card_action.completed",
                    action = %approved.action,
                    card = %approved.card.masked(),
                    "card action succeeded"
                );
                CardExecution { outcome: AgentOutcome::success(message), response: Some(result) }
            }
            Ok(result) => {
                let reason = result
                    .message
                    .clone()
                    .unwrap_or_else(|| "card service reported failure".to_string());
                let outcome = collaborator_failure(display_action, &approved.card, reason);
                CardExecution { outcome, response: Some(result) }
            }
            Err(error) => CardExecution::without_response(collaborator_failure(
                display_action,
                &approved.card,
                error.to_string(),
            )),
        }
    }
}

fn failure(action: &str, reason: String) -> AgentOutcome {
    AgentOutcome::failure(format!("Failed to {action} card. Error: {reason}"), reason)
}

fn collaborator_failure(action: &str, card: &CardLastFour, reason: String) -> AgentOutcome {
    let failure_kind = RoutingError::CardCollaboratorFailure(reason);
    tracing::warn!(
        event_name = "card_action.failed",
        error_code = failure_kind.code(),
        error = %failure_kind,
        card = %card.masked(),
        "card service call failed"
    );
    failure(action, failure_kind.to_string())
}
