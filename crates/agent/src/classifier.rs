use std::collections::BTreeMap;
use std::sync::Arc;

use finagent_core::domain::card::mask_card_identifier;
use finagent_core::domain::intent::{ActionDetails, ClassifiedIntent};
use finagent_core::errors::RoutingError;
use serde_json::{Map, Value};

use crate::llm::{ChatRequest, LlmClient, LlmError};

const SYSTEM_PROMPT: &str = "You are an intent classification expert for financial services.";

const INSTRUCTIONS: &str = r#"Classify the user's intent based on their query. Choose one: 'knowledge', 'card_action', or 'unknown'.
- 'knowledge': User is asking for information (e.g., 'What is an HSA?', 'Tell me about prepaid cards').
- 'card_action': User wants to perform an action on a card (e.g., 'Activate my card', 'Deactivate card ending in 1234').
- 'unknown': The intent is unclear or not related to finance/cards.

If the intent is 'card_action', extract the following information in JSON format:
- "intent": "card_action"
- "action": The action to perform (e.g., "activate", "deactivate")
- "card_identifier": Card number or last 4 digits
- "parameters": A dictionary of additional parameters like:
    - "cvv": Card CVV (if provided)
    - "expiryDate": Card expiry date in format MM/YY (if provided)
    - "reason": Reason for deactivation (if provided)

For example, if the user says "I want to activate my card ending in 4444 with CVV 123 and expiry date 05/26",
you should return:
{"intent": "card_action", "action": "activate", "card_identifier": "4444", "parameters": {"cvv": "123", "expiryDate": "05/26"}}

If the intent is 'knowledge' or 'unknown', format as JSON: {"intent": "..."}"#;

/// Turns free text into a [`ClassifiedIntent`] through a single LLM call.
///
/// Never fails: transport, timeout and parse failures come back as
/// `ClassifiedIntent::ClassificationError` with the failure class as detail prefix.
#[derive(Clone)]
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, query: &str) -> ClassifiedIntent {
        let request =
            ChatRequest::new(SYSTEM_PROMPT, build_prompt(query)).json().with_temperature(0.0);

        let intent = match self.llm.complete(&request).await {
            Ok(content) => parse_classification(&content)
                .unwrap_or_else(|error| classification_failure(&error)),
            Err(error) => classification_failure(&error),
        };

        match &intent {
            ClassifiedIntent::CardAction(details) => tracing::info!(
                event_name = "classifier.intent_resolved",
                intent = %intent.kind(),
                action = %details.action,
                card = %mask_card_identifier(&details.card_identifier),
                parameter_keys = ?details.parameters.keys().collect::<Vec<_>>(),
                "intent classified"
            ),
            ClassifiedIntent::Unknown { note: Some(note) } => {
                let downgrade = RoutingError::ExtractionIncomplete(note.clone());
                tracing::warn!(
                    event_name = "classifier.extraction_incomplete",
                    error_code = downgrade.code(),
                    error = %downgrade,
                    "card action downgraded to unknown"
                );
            }
            _ => tracing::info!(
                event_name = "classifier.intent_resolved",
                intent = %intent.kind(),
                "intent classified"
            ),
        }

        intent
    }
}

fn build_prompt(query: &str) -> String {
    format!("{INSTRUCTIONS}\n\nUser Query: \"{query}\"\n\nJSON Output:")
}

fn classification_failure(error: &LlmError) -> ClassifiedIntent {
    let detail = format!("{}: {error}", error.class());
    let failure = RoutingError::ClassificationFailure(detail.clone());
    tracing::warn!(
        event_name = "classifier.failed",
        error_code = failure.code(),
        error = %failure,
        "intent classification failed"
    );
    ClassifiedIntent::classification_error(detail)
}

/// Parses the oracle's JSON reply. Unrecognised or missing `intent` values mean `unknown`.
pub fn parse_classification(content: &str) -> Result<ClassifiedIntent, LlmError> {
    let value: Value = serde_json::from_str(strip_code_fence(content)).map_err(|error| {
        LlmError::MalformedResponse(format!("classifier output is not JSON: {error}"))
    })?;
    let object = value.as_object().ok_or_else(|| {
        LlmError::MalformedResponse("classifier output is not a JSON object".to_string())
    })?;

    let intent = object
        .get("intent")
        .and_then(Value::as_str)
        .map(|raw| raw.trim().to_ascii_lowercase())
        .unwrap_or_default();

    Ok(match intent.as_str() {
        "knowledge" => ClassifiedIntent::Knowledge,
        "card_action" => ClassifiedIntent::card_action(extract_details(object)),
        _ => ClassifiedIntent::unknown(),
    })
}

fn extract_details(object: &Map<String, Value>) -> ActionDetails {
    let action = object.get("action").and_then(scalar_to_string).unwrap_or_default();
    let card_identifier =
        object.get("card_identifier").and_then(scalar_to_string).unwrap_or_default();

    let mut details = ActionDetails::new(action.trim(), card_identifier.trim());
    details.parameters = object
        .get("parameters")
        .and_then(Value::as_object)
        .map(stringify_parameters)
        .unwrap_or_default();
    details
}

fn stringify_parameters(parameters: &Map<String, Value>) -> BTreeMap<String, String> {
    parameters
        .iter()
        .filter_map(|(key, value)| scalar_to_string(value).map(|value| (key.clone(), value)))
        .collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        nested => Some(nested.to_string()),
    }
}

// Some local models wrap json_object output in a markdown fence.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
