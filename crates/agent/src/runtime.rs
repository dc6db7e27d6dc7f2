use std::sync::Arc;

use finagent_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use finagent_core::config::AppConfig;
use finagent_core::domain::card::mask_card_identifier;
use finagent_core::domain::intent::{ClassifiedIntent, IntentKind, Request};
use finagent_core::domain::outcome::{AgentOutcome, RouterResult};
use finagent_core::errors::ApplicationError;
use finagent_core::flows::{
    FlowEngine, RouterAction, RouterEvent, RouterState, TransitionError, TransitionOutcome,
};

use crate::card::{CardActionExecutor, HttpCardActionClient};
use crate::classifier::IntentClassifier;
use crate::formatter::{format_response, generic_apology};
use crate::guardrails::CardActionPolicy;
use crate::knowledge::{retriever_from_config, KnowledgeResponder};
use crate::llm::{LlmClient, OpenAiCompatibleClient};

/// Runs one request through classify, route and format.
///
/// Holds only shared, immutable collaborators, so concurrent calls need no locking.
#[derive(Clone)]
pub struct AgentRuntime {
    engine: FlowEngine,
    classifier: IntentClassifier,
    knowledge: KnowledgeResponder,
    card: CardActionExecutor,
    audit: Arc<dyn AuditSink>,
}

impl AgentRuntime {
    pub fn new(
        classifier: IntentClassifier,
        knowledge: KnowledgeResponder,
        card: CardActionExecutor,
    ) -> Self {
        Self {
            engine: FlowEngine::new(),
            classifier,
            knowledge,
            card,
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Wires the HTTP-backed collaborators described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, ApplicationError> {
        let llm: Arc<dyn LlmClient> = Arc::new(
            OpenAiCompatibleClient::from_config(&config.llm)
                .map_err(|error| ApplicationError::Configuration(error.to_string()))?,
        );
        let retriever = retriever_from_config(&config.knowledge)
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
        let card_client = HttpCardActionClient::from_config(&config.card_api)
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;

        Ok(Self::new(
            IntentClassifier::new(llm.clone()),
            KnowledgeResponder::new(retriever, llm, config.knowledge.top_k),
            CardActionExecutor::new(
                Arc::new(card_client),
                CardActionPolicy::from_config(&config.card_api),
            ),
        ))
    }

    pub fn card_executor(&self) -> &CardActionExecutor {
        &self.card
    }

    pub fn knowledge_responder(&self) -> &KnowledgeResponder {
        &self.knowledge
    }

    pub async fn route(&self, request: &Request) -> RouterResult {
        self.route_with_correlation(request, uuid::Uuid::new_v4().to_string()).await
    }

    pub async fn route_with_correlation(
        &self,
        request: &Request,
        correlation_id: impl Into<String>,
    ) -> RouterResult {
        let audit = AuditContext::new(correlation_id, "router");
        match self.run(request, &audit).await {
            Ok(result) => result,
            Err(error) => {
                tracing::error!(
                    event_name = "router.transition_defect",
                    correlation_id = %audit.correlation_id,
                    error = %error,
                    "routing aborted by an illegal transition"
                );
                let detail = error.to_string();
                RouterResult {
                    final_message: generic_apology(&detail),
                    intent_kind: IntentKind::ClassificationError,
                    error_detail: Some(detail),
                    note: None,
                    path: Vec::new(),
                }
            }
        }
    }

    async fn run(
        &self,
        request: &Request,
        audit: &AuditContext,
    ) -> Result<RouterResult, TransitionError> {
        let query = request.query();
        let mut path = vec![self.engine.initial_state()];

        let step = self.advance(&mut path, RouterEvent::RequestReceived, audit)?;
        let intent = if step.actions.contains(&RouterAction::ClassifyIntent) {
            self.classifier.classify(query).await
        } else {
            ClassifiedIntent::unknown()
        };
        self.audit.emit(
            stage_event(
                audit,
                "router.intent_classified",
                AuditCategory::Classification,
                intent.error_detail().is_none(),
            )
            .with_metadata("intent", intent.kind().as_str()),
        );

        let step = self.advance(&mut path, RouterEvent::from_intent(&intent), audit)?;
        let mut knowledge: Option<AgentOutcome> = None;
        let mut card: Option<AgentOutcome> = None;
        for action in &step.actions {
            match action {
                RouterAction::InvokeKnowledgeResponder => {
                    let outcome = self.knowledge.answer(query).await;
                    self.audit.emit(
                        stage_event(
                            audit,
                            "router.knowledge_answered",
                            AuditCategory::Knowledge,
                            outcome.succeeded(),
                        )
                        .with_metadata("retriever", self.knowledge.retriever_mode()),
                    );
                    knowledge = Some(outcome);
                }
                RouterAction::InvokeCardActionExecutor => {
                    let details = intent.action_details();
                    let outcome = self.card.execute(details).await;
                    let mut event = stage_event(
                        audit,
                        "router.card_action_executed",
                        AuditCategory::CardAction,
                        outcome.succeeded(),
                    );
                    if let Some(details) = details {
                        let card = mask_card_identifier(&details.card_identifier);
                        event = event
                            .with_metadata("action", details.action.trim())
                            .with_metadata("card", card);
                    }
                    self.audit.emit(event);
                    card = Some(outcome);
                }
                RouterAction::SkipSubAgents => tracing::info!(
                    event_name = "router.sub_agents_skipped",
                    correlation_id = %audit.correlation_id,
                    intent = %intent.kind(),
                    "no sub-agent for this intent"
                ),
                _ => {}
            }
        }

        self.advance(&mut path, RouterEvent::StageCompleted, audit)?;
        let response = format_response(&intent, knowledge.as_ref(), card.as_ref());
        self.advance(&mut path, RouterEvent::ResponseFormatted, audit)?;

        tracing::info!(
            event_name = "router.completed",
            correlation_id = %audit.correlation_id,
            intent = %intent.kind(),
            failed = response.error_detail.is_some(),
            "routing call finished"
        );

        Ok(RouterResult {
            final_message: response.message,
            intent_kind: intent.kind(),
            error_detail: response.error_detail,
            note: intent.note().map(str::to_string),
            path,
        })
    }

    fn advance(
        &self,
        path: &mut Vec<RouterState>,
        event: RouterEvent,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, TransitionError> {
        let current = path.last().copied().unwrap_or_else(|| self.engine.initial_state());
        let outcome =
            self.engine.apply_with_audit(&current, &event, self.audit.as_ref(), audit)?;
        tracing::debug!(
            event_name = "router.state_entered",
            correlation_id = %audit.correlation_id,
            from = ?outcome.from,
            to = ?outcome.to,
            "router transition"
        );
        path.push(outcome.to);
        Ok(outcome)
    }
}

fn stage_event(
    audit: &AuditContext,
    event_type: &str,
    category: AuditCategory,
    succeeded: bool,
) -> AuditEvent {
    let outcome = if succeeded { AuditOutcome::Success } else { AuditOutcome::Failed };
    AuditEvent::new(&audit.correlation_id, event_type, category, &audit.actor, outcome)
}
