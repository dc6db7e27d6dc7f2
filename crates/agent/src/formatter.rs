use finagent_core::domain::intent::{ClassifiedIntent, IntentKind};
use finagent_core::domain::outcome::AgentOutcome;

pub const CLARIFICATION_MESSAGE: &str =
    "I'm not sure how to handle that request. Can you please rephrase?";
pub const KNOWLEDGE_FALLBACK: &str = "I couldn't retrieve the information.";
pub const CARD_ACTION_FALLBACK: &str = "The card action request could not be completed.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormattedResponse {
    pub message: String,
    pub error_detail: Option<String>,
}

pub fn generic_apology(detail: &str) -> String {
    format!("Sorry, I encountered an error processing your request: {detail}")
}

/// Builds the single user-facing message for a routing call. First matching rule wins:
/// a sub-agent's own message when an error exists, then a generic apology, then the
/// branch message (with fallbacks), then the clarification prompt.
pub fn format_response(
    intent: &ClassifiedIntent,
    knowledge: Option<&AgentOutcome>,
    card: Option<&AgentOutcome>,
) -> FormattedResponse {
    let kind = intent.kind();
    let branch_outcome = match kind {
        IntentKind::Knowledge => knowledge,
        IntentKind::CardAction => card,
        IntentKind::Unknown | IntentKind::ClassificationError => None,
    };
    let branch_message =
        branch_outcome.map(AgentOutcome::message).filter(|message| !message.trim().is_empty());

    let error_detail = intent
        .error_detail()
        .or_else(|| knowledge.and_then(AgentOutcome::error_detail))
        .or_else(|| card.and_then(AgentOutcome::error_detail))
        .map(str::to_string);

    let message = match (&error_detail, branch_message) {
        (Some(_), Some(message)) => message.to_string(),
        (Some(detail), None) => generic_apology(detail),
        (None, _) => match kind {
            IntentKind::Knowledge => branch_message.unwrap_or(KNOWLEDGE_FALLBACK).to_string(),
            IntentKind::CardAction => branch_message.unwrap_or(CARD_ACTION_FALLBACK).to_string(),
            IntentKind::Unknown | IntentKind::ClassificationError => {
                CLARIFICATION_MESSAGE.to_string()
            }
        },
    };

    FormattedResponse { message, error_detail }
}
