use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::intent::IntentKind;
use crate::flows::states::{RouterAction, RouterEvent, RouterState, TransitionOutcome};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: RouterState, event: RouterEvent },
    #[error("router already reached terminal state {state:?}")]
    AlreadyTerminal { state: RouterState },
}

/// Deterministic transition table for a single routing call.
#[derive(Clone, Debug, Default)]
pub struct FlowEngine;

impl FlowEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn initial_state(&self) -> RouterState {
        RouterState::Start
    }

    pub fn apply(
        &self,
        current: &RouterState,
        event: &RouterEvent,
    ) -> Result<TransitionOutcome, TransitionError> {
        transition(current, event)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &RouterState,
        event: &RouterEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, TransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.correlation_id.clone(),
                        "router.transition_applied",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.correlation_id.clone(),
                        "router.transition_rejected",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

fn transition(
    current: &RouterState,
    event: &RouterEvent,
) -> Result<TransitionOutcome, TransitionError> {
    use RouterAction::{
        ClassifyIntent, EmitResult, FormatResponse, InvokeCardActionExecutor,
        InvokeKnowledgeResponder, SkipSubAgents,
    };
    use RouterEvent::{IntentResolved, RequestReceived, ResponseFormatted, StageCompleted};
    use RouterState::{
        Classifying, Done, Formatting, RoutingCardAction, RoutingKnowledge, Start, Terminating,
    };

    if current.is_terminal() {
        return Err(TransitionError::AlreadyTerminal { state: *current });
    }

    let (to, actions) = match (current, event) {
        (Start, RequestReceived) => (Classifying, vec![ClassifyIntent]),
        (Classifying, IntentResolved { kind, details_complete }) => match kind {
            IntentKind::Knowledge => (RoutingKnowledge, vec![InvokeKnowledgeResponder]),
            IntentKind::CardAction if *details_complete => {
                (RoutingCardAction, vec![InvokeCardActionExecutor])
            }
            IntentKind::CardAction
            | IntentKind::Unknown
            | IntentKind::ClassificationError => (Terminating, vec![SkipSubAgents]),
        },
        (RoutingKnowledge, StageCompleted)
        | (RoutingCardAction, StageCompleted)
        | (Terminating, StageCompleted) => (Formatting, vec![FormatResponse]),
        (Formatting, ResponseFormatted) => (Done, vec![EmitResult]),
        _ => {
            return Err(TransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            })
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}
