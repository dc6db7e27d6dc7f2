use serde::{Deserialize, Serialize};

use crate::domain::intent::{ClassifiedIntent, IntentKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterState {
    Start,
    Classifying,
    RoutingKnowledge,
    RoutingCardAction,
    Terminating,
    Formatting,
    Done,
}

impl RouterState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouterEvent {
    RequestReceived,
    IntentResolved { kind: IntentKind, details_complete: bool },
    StageCompleted,
    ResponseFormatted,
}

impl RouterEvent {
    pub fn from_intent(intent: &ClassifiedIntent) -> Self {
        Self::IntentResolved {
            kind: intent.kind(),
            details_complete: intent.action_details().is_some_and(|details| details.is_complete()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouterAction {
    ClassifyIntent,
    InvokeKnowledgeResponder,
    InvokeCardActionExecutor,
    SkipSubAgents,
    FormatResponse,
    EmitResult,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: RouterState,
    pub to: RouterState,
    pub event: RouterEvent,
    pub actions: Vec<RouterAction>,
}
