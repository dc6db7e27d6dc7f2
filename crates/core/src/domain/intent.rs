use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const EXTRACTION_INCOMPLETE_NOTE: &str = "details missing despite card_action intent";

/// A single inbound user message. Never mutated once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    query: String,
}

impl Request {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into() }
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Knowledge,
    CardAction,
    Unknown,
    ClassificationError,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Knowledge => "knowledge",
            Self::CardAction => "card_action",
            Self::Unknown => "unknown",
            Self::ClassificationError => "classification_error",
        }
    }
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDetails {
    pub action: String,
    pub card_identifier: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl ActionDetails {
    pub fn new(action: impl Into<String>, card_identifier: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            card_identifier: card_identifier.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Both `action` and `card_identifier` carry something other than whitespace.
    pub fn is_complete(&self) -> bool {
        !self.action.trim().is_empty() && !self.card_identifier.trim().is_empty()
    }
}

/// Structured output of the intent classifier.
///
/// Prefer [`ClassifiedIntent::card_action`] over building `CardAction` directly: it
/// downgrades incomplete extractions to `Unknown` so they never reach execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassifiedIntent {
    Knowledge,
    CardAction(ActionDetails),
    Unknown { note: Option<String> },
    ClassificationError { detail: String },
}

impl ClassifiedIntent {
    pub fn card_action(details: ActionDetails) -> Self {
        if details.is_complete() {
            Self::CardAction(details)
        } else {
            Self::Unknown { note: Some(EXTRACTION_INCOMPLETE_NOTE.to_string()) }
        }
    }

    pub fn unknown() -> Self {
        Self::Unknown { note: None }
    }

    pub fn classification_error(detail: impl Into<String>) -> Self {
        Self::ClassificationError { detail: detail.into() }
    }

    pub fn kind(&self) -> IntentKind {
        match self {
            Self::Knowledge => IntentKind::Knowledge,
            Self::CardAction(_) => IntentKind::CardAction,
            Self::Unknown { .. } => IntentKind::Unknown,
            Self::ClassificationError { .. } => IntentKind::ClassificationError,
        }
    }

    pub fn action_details(&self) -> Option<&ActionDetails> {
        match self {
            Self::CardAction(details) => Some(details),
            _ => None,
        }
    }

    pub fn error_detail(&self) -> Option<&str> {
        match self {
            Self::ClassificationError { detail } => Some(detail),
            _ => None,
        }
    }

    pub fn note(&self) -> Option<&str> {
        match self {
            Self::Unknown { note } => note.as_deref(),
            _ => None,
        }
    }
}
